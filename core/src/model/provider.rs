//! Provider Adapter trait
//!
//! This module defines the [ProviderAdapter] trait every vendor integration implements.

use async_trait::async_trait;
use deckforge_protocol::Modality;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{ProviderError, Result};
use super::types::{ImageSource, InvokeOutput, InvokeRequest};

/// Provider Adapter trait
///
/// One adapter serves every model of one vendor. It hides auth headers,
/// request shape and streaming: text output is returned fully concatenated,
/// never chunk by chunk.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
  /// Returns the unique identifier for this provider
  fn provider_id(&self) -> &'static str;

  /// Returns the display name for this provider
  fn provider_name(&self) -> &'static str;

  /// Credential store key this adapter authenticates with
  fn credential_name(&self) -> &'static str {
    self.provider_id()
  }

  /// Environment variables the credential may be read from
  fn required_env_vars(&self) -> Vec<&'static str> {
    Vec::new()
  }

  /// Modalities this adapter can serve
  fn modalities(&self) -> Vec<Modality>;

  /// Runs one generation call to completion
  async fn invoke(&self, request: InvokeRequest) -> Result<InvokeOutput>;

  /// Reads the bytes behind an image result
  async fn fetch_image(&self, source: ImageSource) -> Result<Vec<u8>>;
}

/// Information about a registered provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderInfo {
  /// Unique identifier
  pub id: String,

  /// Display name
  pub name: String,

  /// Environment variables the credential is read from
  pub env_vars: Vec<String>,

  /// Whether a credential is configured
  pub authenticated: bool,

  /// Modalities served
  pub modalities: Vec<Modality>,
}

// =============================================================================
// Helper functions for adapter implementations
// =============================================================================

/// Return the body of a successful response or the mapped error
pub async fn handle_response(response: reqwest::Response) -> Result<String> {
  let status = response.status();
  if status.is_success() {
    Ok(response.text().await?)
  } else {
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, body))
  }
}

/// Parse JSON from response
pub async fn parse_response<T: serde::de::DeserializeOwned>(
  response: reqwest::Response,
) -> Result<T> {
  let body = handle_response(response).await?;
  Ok(serde_json::from_str(&body)?)
}

/// Resolve an image source to raw bytes, downloading URLs
pub async fn fetch_image_source(client: &Client, source: ImageSource) -> Result<Vec<u8>> {
  match source {
    ImageSource::Bytes(bytes) => Ok(bytes),
    ImageSource::Url(url) => {
      let response = client.get(&url).send().await?;
      let status = response.status();
      if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status, body));
      }
      Ok(response.bytes().await?.to_vec())
    }
  }
}
