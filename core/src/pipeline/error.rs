//! Whole-pipeline errors

use deckforge_protocol::{ErrorKind, Modality, SlideField};
use thiserror::Error;

use super::renderer::RenderError;
use crate::model::ProviderError;

/// Errors that stop a job or a regenerate call.
///
/// Per-field provider failures never show up here; they are absorbed into
/// fallbacks.
#[derive(Error, Debug)]
pub enum PipelineError {
  /// No usable model for a modality, even after substitution
  #[error("No available {modality} model (selected {selected}, default {default:?})")]
  NoModelAvailable {
    modality: Modality,
    selected: String,
    default: Option<String>,
  },

  /// Face-conditioned image model chosen without a reference image
  #[error("Image model {0} requires a reference image")]
  ReferenceImageRequired(String),

  #[error("Slide count must be at least 1")]
  EmptyDeck,

  #[error("Slide index {index} out of range for a {len}-slide deck")]
  SlideOutOfRange { index: usize, len: usize },

  #[error("Invalid input for {field} regeneration: {message}")]
  InvalidRegenerateInput { field: SlideField, message: String },

  /// A regenerate call could not reach its model
  #[error("Regeneration failed: {0}")]
  Provider(#[from] ProviderError),

  /// The regenerated field would only have been a fallback value
  #[error("Regenerating {field} fell back ({cause:?}); document left unchanged")]
  RegenerateFellBack { field: SlideField, cause: ErrorKind },

  #[error("Document renderer rejected the batch: {0}")]
  Render(#[from] RenderError),

  #[error("Pipeline cancelled")]
  Cancelled,
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Cancelled => ErrorKind::Cancelled,
      _ => ErrorKind::PipelineAborted,
    }
  }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
