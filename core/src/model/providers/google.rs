//! Google Gemini Provider
//!
//! Native Gemini REST API integration. Text streams over
//! `streamGenerateContent?alt=sse`; images come back as inline base64 parts of
//! a blocking `generateContent` call.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use deckforge_protocol::Modality;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use super::super::auth::CredentialStore;
use super::super::error::{ProviderError, Result};
use super::super::provider::{ProviderAdapter, fetch_image_source, parse_response};
use super::super::types::{ImageSource, InvokeOutput, InvokeRequest};
use super::{buffer_sse_text, create_client, require_credential};

pub const PROVIDER_ID: &str = "google";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini provider.
pub struct GoogleAdapter {
  client: Client,
  credentials: Arc<dyn CredentialStore>,
  base_url: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
  #[serde(default)]
  candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
  content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
  #[serde(default)]
  parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
  #[serde(alias = "inline_data")]
  inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
struct GeminiInlineData {
  data: String,
}

impl GoogleAdapter {
  /// Creates a new Gemini adapter.
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

  fn model_endpoint(&self, model: &str, stream: bool, key: &str) -> String {
    let method = if stream {
      "streamGenerateContent?alt=sse"
    } else {
      "generateContent"
    };
    let query_sep = if stream { "&" } else { "?" };
    format!(
      "{}/models/{}:{}{}key={}",
      self.base_url.trim_end_matches('/'),
      model,
      method,
      query_sep,
      key
    )
  }

  fn text_body(request: &InvokeRequest) -> Value {
    let params = &request.params;
    let mut generation_config = serde_json::Map::new();
    if let Some(max_tokens) = params.max_tokens {
      generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if let Some(temperature) = params.temperature {
      generation_config.insert("temperature".to_string(), json!(temperature));
    }

    let mut body = json!({
      "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
      "generationConfig": generation_config,
    });
    if let Some(system) = &params.system_prompt {
      body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
  }

  fn image_body(request: &InvokeRequest) -> Value {
    json!({
      "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
      "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
    })
  }

  async fn generate_text(&self, key: &str, request: &InvokeRequest) -> Result<String> {
    let response = self
      .client
      .post(self.model_endpoint(&request.model, true, key))
      .json(&Self::text_body(request))
      .send()
      .await?;
    buffer_sse_text(response).await
  }

  async fn generate_image(&self, key: &str, request: &InvokeRequest) -> Result<ImageSource> {
    let response = self
      .client
      .post(self.model_endpoint(&request.model, false, key))
      .json(&Self::image_body(request))
      .send()
      .await?;
    let gemini: GeminiResponse = parse_response(response).await?;

    let encoded = gemini
      .candidates
      .into_iter()
      .filter_map(|candidate| candidate.content)
      .flat_map(|content| content.parts)
      .find_map(|part| part.inline_data)
      .ok_or_else(|| ProviderError::InvalidResponse("Gemini returned no inline image".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
      .decode(encoded.data)
      .map_err(|e| ProviderError::InvalidResponse(format!("invalid base64 image: {e}")))?;
    Ok(ImageSource::Bytes(bytes))
  }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
  fn provider_id(&self) -> &'static str {
    PROVIDER_ID
  }

  fn provider_name(&self) -> &'static str {
    "Google Gemini"
  }

  fn required_env_vars(&self) -> Vec<&'static str> {
    vec!["GEMINI_API_KEY", "GOOGLE_API_KEY"]
  }

  fn modalities(&self) -> Vec<Modality> {
    vec![Modality::Text, Modality::Image]
  }

  async fn invoke(&self, request: InvokeRequest) -> Result<InvokeOutput> {
    let key = require_credential(self.credentials.as_ref(), PROVIDER_ID)?;
    match request.modality {
      Modality::Text => self
        .generate_text(&key, &request)
        .await
        .map(InvokeOutput::Text),
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
  use crate::model::auth::MemoryCredentialStore;
  use crate::model::types::InvokeParams;
  use pretty_assertions::assert_eq;

  #[test]
  fn streaming_endpoint_appends_key_after_alt() {
    let adapter = GoogleAdapter::new(Arc::new(MemoryCredentialStore::new()), None, None);
    assert_eq!(
      adapter.model_endpoint("gemini-2.0-flash", true, "k"),
      "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse&key=k"
    );
    assert!(
      adapter
        .model_endpoint("gemini-2.0-flash", false, "k")
        .ends_with(":generateContent?key=k")
    );
  }

  #[test]
  fn text_body_carries_system_instruction() {
    let request = InvokeRequest::text("gemini-2.0-flash", "hi").with_params(InvokeParams {
      system_prompt: Some("be brief".to_string()),
      max_tokens: Some(10),
      ..Default::default()
    });
    let body = GoogleAdapter::text_body(&request);
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 10);
  }
}
