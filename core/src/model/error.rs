//! Provider layer error types

use deckforge_protocol::ErrorKind;
use thiserror::Error;

/// Provider adapter errors
#[derive(Error, Debug)]
pub enum ProviderError {
  /// No credential configured for the provider
  #[error("Credential missing for provider: {0}")]
  CredentialMissing(String),

  /// Authentication failed
  #[error("Authentication failed: {0}")]
  Auth(String),

  /// Rate limited
  #[error("Rate limited: {0}")]
  RateLimited(String),

  /// Timeout
  #[error("Request timeout: {0}")]
  Timeout(String),

  /// Vendor returned a non-success status
  #[error("Upstream error (HTTP {status}): {message}")]
  Upstream { status: u16, message: String },

  /// Vendor accepted the request but the prediction did not succeed
  #[error("Prediction {status}: {message}")]
  PredictionFailed { status: String, message: String },

  /// Network error
  #[error("Network error: {0}")]
  Network(#[source] reqwest::Error),

  /// Invalid response from provider
  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  /// JSON parse error
  #[error("JSON parse error: {0}")]
  Json(#[from] serde_json::Error),

  /// Downloaded bytes are not a decodable image
  #[error("Image decode error: {0}")]
  Decode(#[from] image::ImageError),

  /// Adapter does not serve the requested modality
  #[error("Provider {provider} does not support {modality} generation")]
  UnsupportedModality { provider: String, modality: String },

  /// Face-conditioned model called without a reference image
  #[error("Model {0} requires a reference image")]
  ReferenceImageRequired(String),

  /// Model id not in the registry
  #[error("Model not found: {0}")]
  ModelNotFound(String),

  /// Provider not registered
  #[error("Provider not found: {0}")]
  ProviderNotFound(String),
}

impl From<reqwest::Error> for ProviderError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      ProviderError::Timeout(err.to_string())
    } else {
      ProviderError::Network(err)
    }
  }
}

impl ProviderError {
  /// Map an HTTP status and body to the matching error.
  pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
    match status.as_u16() {
      401 | 403 => ProviderError::Auth(format!("HTTP {status}: {body}")),
      408 | 504 => ProviderError::Timeout(format!("HTTP {status}: {body}")),
      429 => ProviderError::RateLimited(body),
      code => ProviderError::Upstream {
        status: code,
        message: body,
      },
    }
  }

  /// Position of this error in the pipeline taxonomy.
  pub fn kind(&self) -> ErrorKind {
    match self {
      ProviderError::CredentialMissing(_) => ErrorKind::CredentialMissing,
      ProviderError::Auth(_)
      | ProviderError::ModelNotFound(_)
      | ProviderError::ProviderNotFound(_)
      | ProviderError::ReferenceImageRequired(_)
      | ProviderError::UnsupportedModality { .. } => ErrorKind::ProviderUnavailable,
      ProviderError::RateLimited(_) | ProviderError::Timeout(_) | ProviderError::Network(_) => {
        ErrorKind::ProviderTransientError
      }
      ProviderError::Upstream { .. }
      | ProviderError::PredictionFailed { .. }
      | ProviderError::InvalidResponse(_)
      | ProviderError::Json(_)
      | ProviderError::Decode(_) => ErrorKind::ProviderUpstreamError,
    }
  }

  /// Whether retrying later could succeed.
  pub fn is_transient(&self) -> bool {
    self.kind() == ErrorKind::ProviderTransientError
  }
}

/// Alias for Result<T, ProviderError>
pub type Result<T> = std::result::Result<T, ProviderError>;
