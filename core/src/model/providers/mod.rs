//! Provider adapter implementations
//!
//! One adapter per vendor; the model catalog decides which adapter serves
//! which model id.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use reqwest::Client;

use super::auth::CredentialStore;
use super::error::{ProviderError, Result};
use super::registry::ModelRegistry;
use super::streaming::{StreamingConfig, StreamingProcessor};

pub mod google;
pub mod replicate;
pub mod xai;

pub use google::GoogleAdapter;
pub use replicate::ReplicateAdapter;
pub use xai::XaiAdapter;

/// Register the vendor adapters and the built-in model catalog
pub async fn register_all_providers(
  registry: &ModelRegistry,
  config: &deckforge_config::Config,
  credentials: Arc<dyn CredentialStore>,
) {
  let replicate = config.provider(replicate::PROVIDER_ID);
  registry
    .register_adapter(ReplicateAdapter::new(
      credentials.clone(),
      replicate.base_url,
      replicate.timeout_secs,
    ))
    .await;

  let xai = config.provider(xai::PROVIDER_ID);
  registry
    .register_adapter(XaiAdapter::new(
      credentials.clone(),
      xai.base_url,
      xai.timeout_secs,
    ))
    .await;

  let google = config.provider(google::PROVIDER_ID);
  registry
    .register_adapter(GoogleAdapter::new(
      credentials,
      google.base_url,
      google.timeout_secs,
    ))
    .await;

  for entry in super::catalog::builtin_models() {
    registry.register_model(entry).await;
  }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Create a default HTTP client for providers
pub fn create_client(timeout: Option<u64>) -> Client {
  let timeout = std::time::Duration::from_secs(timeout.unwrap_or(120));

  Client::builder()
    .timeout(timeout)
    .build()
    .unwrap_or_else(|_| Client::new())
}

/// Fetch a required credential or fail without touching the network
pub fn require_credential(
  credentials: &dyn CredentialStore,
  provider_id: &'static str,
) -> Result<String> {
  credentials
    .get_credential(provider_id)
    .ok_or_else(|| ProviderError::CredentialMissing(provider_id.to_string()))
}

/// Stream of text deltas decoded from an SSE response
pub fn sse_text_stream(
  response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<String>> + Send>> {
  Box::pin(async_stream::stream! {
      let status = response.status();
      if !status.is_success() {
          let body = response.text().await.unwrap_or_default();
          yield Err(ProviderError::from_status(status, body));
          return;
      }

      let mut stream = response.bytes_stream();
      let mut processor = StreamingProcessor::new(StreamingConfig::default());

      while let Some(item) = stream.next().await {
          match item {
              Ok(bytes) => {
                  for event in processor.push_bytes(&bytes) {
                      if let Some(message) = event.error {
                          yield Err(ProviderError::InvalidResponse(message));
                          return;
                      }
                      if let Some(text) = event.text {
                          yield Ok(text);
                      }
                      if event.done {
                          return;
                      }
                  }
              }
              Err(e) => {
                  yield Err(ProviderError::from(e));
                  return;
              }
          }
      }

      for event in processor.finish() {
          if let Some(message) = event.error {
              yield Err(ProviderError::InvalidResponse(message));
              return;
          }
          if let Some(text) = event.text {
              yield Ok(text);
          }
      }
  })
}

/// Drain an SSE response into one string
pub async fn buffer_sse_text(response: reqwest::Response) -> Result<String> {
  let mut stream = sse_text_stream(response);
  let mut text = String::new();
  while let Some(delta) = stream.next().await {
    text.push_str(&delta?);
  }
  Ok(text)
}

/// Join a base URL and a path
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
  format!(
    "{}/{}",
    base_url.trim_end_matches('/'),
    path.trim_start_matches('/')
  )
}
