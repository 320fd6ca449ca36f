use serde::{Deserialize, Serialize};

/// Failure classes observed by the pipeline.
///
/// Only [`ErrorKind::PipelineAborted`] and [`ErrorKind::Cancelled`] ever reach
/// the caller as a hard failure; every other kind is absorbed and reported
/// through progress events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// No credential was configured for the provider.
  CredentialMissing,
  /// The availability probe failed.
  ProviderUnavailable,
  /// Timeout or rate limit during generation.
  ProviderTransientError,
  /// Vendor-side 4xx/5xx or malformed response during generation.
  ProviderUpstreamError,
  /// The structure planner synthesized backfill specs.
  PlanningDegraded,
  /// A generator returned a placeholder instead of real content.
  FieldFallbackUsed,
  /// Whole-job failure.
  PipelineAborted,
  /// Cooperative cancellation.
  Cancelled,
}

impl ErrorKind {
  /// Whether this kind is resolved locally without failing the job.
  pub fn is_recoverable(&self) -> bool {
    !matches!(self, ErrorKind::PipelineAborted | ErrorKind::Cancelled)
  }
}
