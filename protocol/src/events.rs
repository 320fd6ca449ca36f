use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::{Modality, SlideField};

/// Discrete events emitted by the generation coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
  /// A probe resolved for one modality.
  ProbeResult {
    modality: Modality,
    model_id: String,
    available: bool,
  },
  /// An unavailable selection was replaced with the configured default.
  ModelSubstituted {
    modality: Modality,
    from: String,
    to: String,
  },
  /// The structure planner returned `num_slides` specs.
  PlanReady { num_slides: usize, degraded: bool },
  /// One (slide, field) cell was written.
  SlideFieldDone {
    index: usize,
    field: SlideField,
    fallback: Option<ErrorKind>,
  },
  /// Every cell joined.
  PipelineAssembled { num_slides: usize },
  /// The renderer accepted the batch.
  PipelineHandedOff { document_id: String },
  /// A single field was regenerated and patched in place.
  FieldRegenerated {
    document_id: String,
    index: usize,
    field: SlideField,
  },
  /// Whole-job failure.
  PipelineFailed { reason: String },
  /// The job was cancelled before hand-off.
  PipelineCancelled,
}

impl ProgressEvent {
  /// Short tag used in log lines.
  pub fn name(&self) -> &'static str {
    match self {
      ProgressEvent::ProbeResult { .. } => "probe_result",
      ProgressEvent::ModelSubstituted { .. } => "model_substituted",
      ProgressEvent::PlanReady { .. } => "plan_ready",
      ProgressEvent::SlideFieldDone { .. } => "slide_field_done",
      ProgressEvent::PipelineAssembled { .. } => "pipeline_assembled",
      ProgressEvent::PipelineHandedOff { .. } => "pipeline_handed_off",
      ProgressEvent::FieldRegenerated { .. } => "field_regenerated",
      ProgressEvent::PipelineFailed { .. } => "pipeline_failed",
      ProgressEvent::PipelineCancelled => "pipeline_cancelled",
    }
  }
}
