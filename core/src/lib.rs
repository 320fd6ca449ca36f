// Deckforge Core Library

pub mod model;
pub mod pipeline;
pub mod translate;

pub use pipeline::{
  GenerationCoordinator, GenerationJob, GenerationReport, ModelSelection, PipelineError,
};
