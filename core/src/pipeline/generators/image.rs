//! Image synthesizer

use std::sync::Arc;

use tracing::{debug, warn};

use super::FieldOutcome;
use crate::model::{ProviderError, ReferenceImage, ResolvedModel};
use crate::pipeline::context::LocaleContext;
use crate::pipeline::job::SlideImage;
use crate::translate::Translator;

/// Produces one slide image: translate, call the image model, download, decode.
#[derive(Clone)]
pub struct ImageSynthesizer {
  model: ResolvedModel,
  translator: Arc<dyn Translator>,
  locale: LocaleContext,
  reference: Option<ReferenceImage>,
}

impl ImageSynthesizer {
  pub fn new(
    model: ResolvedModel,
    translator: Arc<dyn Translator>,
    locale: LocaleContext,
    reference: Option<ReferenceImage>,
  ) -> Self {
    Self {
      model,
      translator,
      locale,
      reference,
    }
  }

  pub async fn synthesize(&self, image_prompt: &str) -> FieldOutcome<SlideImage> {
    match self.try_synthesize(image_prompt).await {
      Ok(image) => FieldOutcome::Generated(image),
      Err(err) => {
        warn!(model = %self.model.entry.id, error = %err, "image generation failed, using placeholder");
        FieldOutcome::Fallback {
          value: SlideImage::placeholder(),
          cause: err.kind(),
        }
      }
    }
  }

  /// Best effort: the original text is kept if translation fails.
  pub async fn prepare_prompt(&self, image_prompt: &str) -> String {
    if !self.locale.translate_image_prompts {
      return image_prompt.to_string();
    }
    match self
      .translator
      .translate(image_prompt, &self.locale.image_prompt_language)
      .await
    {
      Ok(translated) => translated,
      Err(err) => {
        debug!(error = %err, "image prompt translation failed, keeping original");
        image_prompt.to_string()
      }
    }
  }

  async fn try_synthesize(&self, image_prompt: &str) -> Result<SlideImage, ProviderError> {
    let prompt = self.prepare_prompt(image_prompt).await;
    let request = self
      .model
      .entry
      .image_request(&prompt, self.reference.as_ref())?;

    let source = self.model.adapter.invoke(request).await?.into_image()?;
    let bytes = self.model.adapter.fetch_image(source).await?;

    let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
      .await
      .map_err(|e| ProviderError::InvalidResponse(format!("image decode task failed: {e}")))??;
    Ok(SlideImage::generated(decoded))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{
    ImageSource, InvokeOutput, InvokeRequest, ModelEntry, ModelRegistry, ProviderAdapter,
  };
  use crate::translate::{NoopTranslator, TranslateError};
  use async_trait::async_trait;
  use deckforge_protocol::{ErrorKind, Modality};
  use image::{ImageFormat, Rgb, RgbImage};
  use pretty_assertions::assert_eq;
  use std::io::Cursor;
  use std::sync::Mutex;

  struct Painter {
    prompts: Mutex<Vec<String>>,
    bytes: Vec<u8>,
  }

  #[async_trait]
  impl ProviderAdapter for Painter {
    fn provider_id(&self) -> &'static str {
      "painter"
    }

    fn provider_name(&self) -> &'static str {
      "Painter"
    }

    fn modalities(&self) -> Vec<Modality> {
      vec![Modality::Image]
    }

    async fn invoke(&self, request: InvokeRequest) -> crate::model::Result<InvokeOutput> {
      if let Ok(mut prompts) = self.prompts.lock() {
        prompts.push(request.prompt);
      }
      Ok(InvokeOutput::Image(ImageSource::Bytes(self.bytes.clone())))
    }

    async fn fetch_image(&self, source: ImageSource) -> crate::model::Result<Vec<u8>> {
      match source {
        ImageSource::Bytes(bytes) => Ok(bytes),
        ImageSource::Url(_) => Ok(Vec::new()),
      }
    }
  }

  struct Broken;

  #[async_trait]
  impl Translator for Broken {
    async fn translate(&self, _text: &str, _target: &str) -> crate::translate::Result<String> {
      Err(TranslateError::Status(503))
    }
  }

  fn png() -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]))
      .write_to(&mut buffer, ImageFormat::Png)
      .expect("encode png");
    buffer.into_inner()
  }

  async fn resolve(bytes: Vec<u8>, entry: ModelEntry) -> (ResolvedModel, Arc<Painter>) {
    let painter = Arc::new(Painter {
      prompts: Mutex::new(Vec::new()),
      bytes,
    });
    let registry = ModelRegistry::new();
    registry.register_shared_adapter(painter.clone()).await;
    let id = entry.id.clone();
    registry.register_model(entry).await;
    let model = registry.resolve(&id, Modality::Image).await.expect("resolve");
    (model, painter)
  }

  #[tokio::test]
  async fn decodes_generated_image() {
    let entry = ModelEntry::image("paint", "Paint", "painter", "vendor/paint");
    let (model, painter) = resolve(png(), entry).await;
    let synth = ImageSynthesizer::new(model, Arc::new(NoopTranslator), LocaleContext::default(), None);

    let outcome = synth.synthesize("a forum").await;
    assert_eq!(outcome.fallback_cause(), None);
    assert!(!outcome.value().is_placeholder());

    let prompts = painter.prompts.lock().expect("prompts").clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("a forum"));
  }

  #[tokio::test]
  async fn undecodable_bytes_give_placeholder() {
    let entry = ModelEntry::image("paint", "Paint", "painter", "vendor/paint");
    let (model, _) = resolve(vec![0, 1, 2, 3], entry).await;
    let synth = ImageSynthesizer::new(model, Arc::new(NoopTranslator), LocaleContext::default(), None);

    let outcome = synth.synthesize("a forum").await;
    assert_eq!(outcome.fallback_cause(), Some(ErrorKind::ProviderUpstreamError));
    assert!(outcome.value().is_placeholder());
  }

  #[tokio::test]
  async fn translation_failure_keeps_original_prompt() {
    let entry = ModelEntry::image("paint", "Paint", "painter", "vendor/paint");
    let (model, _) = resolve(png(), entry).await;
    let synth = ImageSynthesizer::new(model, Arc::new(Broken), LocaleContext::default(), None);

    assert_eq!(synth.prepare_prompt("un acueducto").await, "un acueducto");
  }
}
