//! xAI Provider
//!
//! OpenAI-compatible chat completions (streamed and buffered here) and the
//! image generation endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use deckforge_protocol::Modality;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use super::super::auth::CredentialStore;
use super::super::error::{ProviderError, Result};
use super::super::provider::{ProviderAdapter, fetch_image_source, parse_response};
use super::super::types::{ImageSource, InvokeOutput, InvokeRequest};
use super::{buffer_sse_text, create_client, endpoint, require_credential};

pub const PROVIDER_ID: &str = "xai";
pub const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";

/// xAI provider
pub struct XaiAdapter {
  client: Client,
  credentials: Arc<dyn CredentialStore>,
  base_url: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
  data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
  url: Option<String>,
  b64_json: Option<String>,
}

impl XaiAdapter {
  /// Create a new xAI adapter
  pub fn new(
    credentials: Arc<dyn CredentialStore>,
    base_url: Option<String>,
    timeout: Option<u64>,
  ) -> Self {
    Self {
      client: create_client(timeout),
      credentials,
      base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    }
  }

  fn chat_body(request: &InvokeRequest) -> Value {
    let params = &request.params;
    let mut messages = Vec::new();
    if let Some(system) = &params.system_prompt {
      messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));

    let mut body = json!({
      "model": request.model,
      "messages": messages,
      "stream": true,
      "temperature": params.temperature.unwrap_or(0.6),
    });
    if let Some(max_tokens) = params.max_tokens {
      body["max_tokens"] = json!(max_tokens);
    }
    body
  }

  async fn chat(&self, key: &str, request: &InvokeRequest) -> Result<String> {
    let response = self
      .client
      .post(endpoint(&self.base_url, "chat/completions"))
      .bearer_auth(key)
      .json(&Self::chat_body(request))
      .send()
      .await?;
    buffer_sse_text(response).await
  }

  async fn generate_image(&self, key: &str, request: &InvokeRequest) -> Result<ImageSource> {
    let body = json!({
      "model": request.model,
      "prompt": request.prompt,
      "n": 1,
      "response_format": "url",
    });
    let response = self
      .client
      .post(endpoint(&self.base_url, "images/generations"))
      .bearer_auth(key)
      .json(&body)
      .send()
      .await?;
    let images: ImagesResponse = parse_response(response).await?;

    let first = images
      .data
      .into_iter()
      .next()
      .ok_or_else(|| ProviderError::InvalidResponse("xAI returned no images".to_string()))?;
    match (first.url, first.b64_json) {
      (Some(url), _) => Ok(ImageSource::Url(url)),
      (None, Some(encoded)) => {
        use base64::Engine as _;
        let bytes = base64::engine::general_purpose::STANDARD
          .decode(encoded)
          .map_err(|e| ProviderError::InvalidResponse(format!("invalid base64 image: {e}")))?;
        Ok(ImageSource::Bytes(bytes))
      }
      (None, None) => Err(ProviderError::InvalidResponse(
        "xAI image entry has neither url nor b64_json".to_string(),
      )),
    }
  }
}

#[async_trait]
impl ProviderAdapter for XaiAdapter {
  fn provider_id(&self) -> &'static str {
    PROVIDER_ID
  }

  fn provider_name(&self) -> &'static str {
    "xAI"
  }

  fn required_env_vars(&self) -> Vec<&'static str> {
    vec!["XAI_API_KEY", "GROK_API_KEY"]
  }

  fn modalities(&self) -> Vec<Modality> {
    vec![Modality::Text, Modality::Image]
  }

  async fn invoke(&self, request: InvokeRequest) -> Result<InvokeOutput> {
    let key = require_credential(self.credentials.as_ref(), PROVIDER_ID)?;
    match request.modality {
      Modality::Text => self.chat(&key, &request).await.map(InvokeOutput::Text),
      Modality::Image => self
        .generate_image(&key, &request)
        .await
        .map(InvokeOutput::Image),
    }
  }

  async fn fetch_image(&self, source: ImageSource) -> Result<Vec<u8>> {
    fetch_image_source(&self.client, source).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::types::InvokeParams;
  use pretty_assertions::assert_eq;

  #[test]
  fn chat_body_streams_with_system_prompt() {
    let request = InvokeRequest::text("grok-2-1212", "Generate one word.").with_params(InvokeParams {
      system_prompt: Some("Respond briefly.".to_string()),
      max_tokens: Some(10),
      ..Default::default()
    });

    let body = XaiAdapter::chat_body(&request);
    assert_eq!(body["stream"], true);
    assert_eq!(body["max_tokens"], 10);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Generate one word.");
  }
}
