//! Replicate Provider
//!
//! Runs official models (`owner/name`) and version-pinned community models
//! (`owner/name:version`) through the predictions API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deckforge_protocol::Modality;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::super::auth::CredentialStore;
use super::super::error::{ProviderError, Result};
use super::super::provider::{ProviderAdapter, fetch_image_source, parse_response};
use super::super::types::{ImageSource, InvokeOutput, InvokeRequest};
use super::{create_client, endpoint, require_credential};

pub const PROVIDER_ID: &str = "replicate";
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Replicate provider
pub struct ReplicateAdapter {
  client: Client,
  credentials: Arc<dyn CredentialStore>,
  base_url: String,
  poll_interval: Duration,
  max_polls: usize,
}

#[derive(Debug, Deserialize)]
struct Prediction {
  #[serde(default)]
  id: String,
  status: String,
  #[serde(default)]
  output: Value,
  #[serde(default)]
  error: Option<Value>,
  #[serde(default)]
  urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
  get: Option<String>,
}

impl ReplicateAdapter {
  /// Create a new Replicate adapter
  pub fn new(
    credentials: Arc<dyn CredentialStore>,
    base_url: Option<String>,
    timeout: Option<u64>,
  ) -> Self {
    Self {
      client: create_client(timeout),
      credentials,
      base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
      poll_interval: Duration::from_secs(1),
      max_polls: 600,
    }
  }

  /// Override the status polling cadence
  pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
    self.poll_interval = interval;
    self.max_polls = max_polls;
    self
  }

  /// URL and body for a new prediction
  fn prediction_request(&self, model: &str, input: Value) -> (String, Value) {
    match model.split_once(':') {
      Some((_, version)) => (
        endpoint(&self.base_url, "predictions"),
        json!({ "version": version, "input": input }),
      ),
      None => (
        endpoint(&self.base_url, &format!("models/{model}/predictions")),
        json!({ "input": input }),
      ),
    }
  }

  fn build_input(request: &InvokeRequest) -> Value {
    let params = &request.params;
    let mut input = params.input.clone();
    input.insert("prompt".to_string(), json!(request.prompt));

    if let Some(system) = &params.system_prompt {
      input
        .entry("system_prompt")
        .or_insert_with(|| json!(system));
    }
    if let Some(max_tokens) = params.max_tokens {
      if !input.contains_key("max_new_tokens") {
        input.insert("max_tokens".to_string(), json!(max_tokens));
      }
    }
    if let Some(temperature) = params.temperature {
      input.insert("temperature".to_string(), json!(temperature));
    }
    Value::Object(input)
  }

  /// Create a prediction and wait until it reaches a terminal status
  async fn run_prediction(&self, token: &str, model: &str, input: Value) -> Result<Value> {
    let (url, body) = self.prediction_request(model, input);
    let response = self
      .client
      .post(&url)
      .bearer_auth(token)
      .header("Prefer", "wait")
      .json(&body)
      .send()
      .await?;
    let mut prediction: Prediction = parse_response(response).await?;

    let mut polls = 0;
    loop {
      let status = prediction.status.clone();
      match status.as_str() {
        "succeeded" => return Ok(prediction.output),
        "failed" | "canceled" => {
          let message = prediction
            .error
            .map(|err| match err {
              Value::String(s) => s,
              other => other.to_string(),
            })
            .unwrap_or_default();
          return Err(ProviderError::PredictionFailed {
            status: prediction.status,
            message,
          });
        }
        status => {
          if polls >= self.max_polls {
            return Err(ProviderError::Timeout(format!(
              "prediction {} still {status} after {polls} polls",
              prediction.id
            )));
          }
          polls += 1;
          debug!(prediction = %prediction.id, status, "waiting on replicate prediction");
          tokio::time::sleep(self.poll_interval).await;

          let poll_url = prediction
            .urls
            .as_ref()
            .and_then(|urls| urls.get.clone())
            .unwrap_or_else(|| endpoint(&self.base_url, &format!("predictions/{}", prediction.id)));
          let response = self.client.get(&poll_url).bearer_auth(token).send().await?;
          prediction = parse_response(response).await?;
        }
      }
    }
  }
}

/// Token arrays are concatenated, plain strings returned as is
fn text_from_output(output: Value) -> Result<String> {
  match output {
    Value::String(text) => Ok(text),
    Value::Array(items) => Ok(
      items
        .into_iter()
        .map(|item| match item {
          Value::String(token) => token,
          other => other.to_string(),
        })
        .collect(),
    ),
    other => Err(ProviderError::InvalidResponse(format!(
      "unexpected text output: {other}"
    ))),
  }
}

/// Image models answer with a URL or a list of URLs
fn image_from_output(output: Value) -> Result<ImageSource> {
  let url = match output {
    Value::String(url) => Some(url),
    Value::Array(items) => items
      .into_iter()
      .find_map(|item| item.as_str().map(str::to_string)),
    _ => None,
  };
  url
    .map(ImageSource::Url)
    .ok_or_else(|| ProviderError::InvalidResponse("prediction returned no image URL".to_string()))
}

#[async_trait]
impl ProviderAdapter for ReplicateAdapter {
  fn provider_id(&self) -> &'static str {
    PROVIDER_ID
  }

  fn provider_name(&self) -> &'static str {
    "Replicate"
  }

  fn required_env_vars(&self) -> Vec<&'static str> {
    vec!["REPLICATE_API_TOKEN"]
  }

  fn modalities(&self) -> Vec<Modality> {
    vec![Modality::Text, Modality::Image]
  }

  async fn invoke(&self, request: InvokeRequest) -> Result<InvokeOutput> {
    let token = require_credential(self.credentials.as_ref(), PROVIDER_ID)?;
    let input = Self::build_input(&request);
    let output = self.run_prediction(&token, &request.model, input).await?;

    match request.modality {
      Modality::Text => text_from_output(output).map(InvokeOutput::Text),
      Modality::Image => image_from_output(output).map(InvokeOutput::Image),
    }
  }

  async fn fetch_image(&self, source: ImageSource) -> Result<Vec<u8>> {
    fetch_image_source(&self.client, source).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::auth::MemoryCredentialStore;
  use crate::model::types::InvokeParams;
  use pretty_assertions::assert_eq;

  fn adapter() -> ReplicateAdapter {
    ReplicateAdapter::new(Arc::new(MemoryCredentialStore::new()), None, None)
  }

  #[test]
  fn versioned_models_use_generic_endpoint() {
    let (url, body) = adapter().prediction_request("mikeei/dolphin:abc123", json!({}));
    assert_eq!(url, "https://api.replicate.com/v1/predictions");
    assert_eq!(body["version"], "abc123");

    let (url, body) = adapter().prediction_request("black-forest-labs/flux-schnell", json!({}));
    assert_eq!(
      url,
      "https://api.replicate.com/v1/models/black-forest-labs/flux-schnell/predictions"
    );
    assert!(body.get("version").is_none());
  }

  #[test]
  fn input_keeps_model_specific_token_key() {
    let mut params = InvokeParams {
      system_prompt: Some("Respond briefly.".to_string()),
      max_tokens: Some(10),
      ..Default::default()
    };
    params.input.insert("max_new_tokens".to_string(), json!(10));
    let request = InvokeRequest::text("mikeei/dolphin:abc", "hi").with_params(params);

    let input = ReplicateAdapter::build_input(&request);
    assert_eq!(input["prompt"], "hi");
    assert_eq!(input["system_prompt"], "Respond briefly.");
    assert_eq!(input["max_new_tokens"], 10);
    assert!(input.get("max_tokens").is_none());
  }

  #[test]
  fn token_arrays_concatenate() {
    let text = text_from_output(json!(["Hel", "lo", " world"])).expect("text output");
    assert_eq!(text, "Hello world");
    assert!(text_from_output(Value::Null).is_err());
  }

  #[test]
  fn first_url_wins_for_images() {
    let source = image_from_output(json!(["https://a/1.webp", "https://a/2.webp"])).expect("url");
    assert_eq!(source, ImageSource::Url("https://a/1.webp".to_string()));
  }

  #[tokio::test]
  async fn missing_token_fails_before_any_request() {
    let err = adapter()
      .invoke(InvokeRequest::text("meta/meta-llama-3.1-405b-instruct", "hi"))
      .await
      .expect_err("no credential");
    assert!(matches!(err, ProviderError::CredentialMissing(_)));
  }
}
