//! Edit/regenerate path
//!
//! Re-runs exactly one field generator for one slide of an already rendered
//! document and patches that field in place.

use deckforge_protocol::{Modality, ProgressEvent, SlideField};
use tracing::info;

use super::coordinator::GenerationCoordinator;
use super::error::{PipelineError, Result};
use super::generators::{ContentSynthesizer, FieldOutcome, ImageSynthesizer, title};
use super::job::{ModelSelection, SlideImage};
use super::renderer::{DocumentHandle, FieldValue};
use crate::model::ReferenceImage;

/// Caller-supplied input for a single-field regeneration.
#[derive(Debug, Clone)]
pub enum RegenerateInput {
  /// New title seed
  Title(String),
  /// New content prompt within the deck's topic
  Content { prompt: String, topic: String },
  /// New image prompt
  ImagePrompt(String),
  /// Image bytes supplied by the caller, used as is
  ImageBytes(Vec<u8>),
}

impl RegenerateInput {
  pub fn field(&self) -> SlideField {
    match self {
      RegenerateInput::Title(_) => SlideField::Title,
      RegenerateInput::Content { .. } => SlideField::Content,
      RegenerateInput::ImagePrompt(_) | RegenerateInput::ImageBytes(_) => SlideField::Image,
    }
  }
}

impl GenerationCoordinator {
  /// Regenerate one field of one slide and patch the document.
  ///
  /// A generator fallback is reported as an error and nothing is patched, so
  /// an edit never replaces existing content with a placeholder.
  pub async fn regenerate_field(
    &self,
    document: &DocumentHandle,
    index: usize,
    field: SlideField,
    input: RegenerateInput,
    models: &ModelSelection,
    reference: Option<ReferenceImage>,
  ) -> Result<FieldValue> {
    if input.field() != field {
      return Err(PipelineError::InvalidRegenerateInput {
        field,
        message: format!("got {} input", input.field()),
      });
    }

    let len = self.renderer.slide_count(document).await?;
    if index >= len {
      return Err(PipelineError::SlideOutOfRange { index, len });
    }

    let value = match input {
      RegenerateInput::Title(seed) => {
        let refined = title::refine(&seed);
        if refined.trim().is_empty() {
          return Err(PipelineError::InvalidRegenerateInput {
            field,
            message: "title is empty".to_string(),
          });
        }
        FieldValue::Title(refined)
      }
      RegenerateInput::Content { prompt, topic } => {
        let model = self.registry.resolve(&models.text, Modality::Text).await?;
        let synthesizer = ContentSynthesizer::new(model, self.locale.clone());
        FieldValue::Content(accept(field, synthesizer.synthesize(&prompt, &topic).await)?)
      }
      RegenerateInput::ImagePrompt(prompt) => {
        let model = self.registry.resolve(&models.image, Modality::Image).await?;
        if model.entry.requires_reference_image() && reference.is_none() {
          return Err(PipelineError::ReferenceImageRequired(model.entry.id));
        }
        let synthesizer =
          ImageSynthesizer::new(model, self.translator.clone(), self.locale.clone(), reference);
        FieldValue::Image(accept(field, synthesizer.synthesize(&prompt).await)?)
      }
      RegenerateInput::ImageBytes(bytes) => {
        let decoded = image::load_from_memory(&bytes).map_err(|e| {
          PipelineError::InvalidRegenerateInput {
            field,
            message: e.to_string(),
          }
        })?;
        FieldValue::Image(SlideImage::generated(decoded))
      }
    };

    self.renderer.patch(document, index, &value).await?;
    info!(document = %document.id, slide = index, %field, "field regenerated");
    self
      .emit(ProgressEvent::FieldRegenerated {
        document_id: document.id.clone(),
        index,
        field,
      })
      .await;
    Ok(value)
  }
}

fn accept<T>(field: SlideField, outcome: FieldOutcome<T>) -> Result<T> {
  match outcome {
    FieldOutcome::Generated(value) => Ok(value),
    FieldOutcome::Fallback { cause, .. } => Err(PipelineError::RegenerateFellBack { field, cause }),
  }
}
