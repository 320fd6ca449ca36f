//! Request and response types shared by every adapter

use deckforge_protocol::Modality;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ProviderError, Result};

/// One call into a provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
  /// Capability requested
  pub modality: Modality,
  /// Vendor-side model reference, e.g. `meta/meta-llama-3.1-405b-instruct`
  pub model: String,
  /// User prompt
  pub prompt: String,
  pub params: InvokeParams,
}

impl InvokeRequest {
  pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
    Self {
      modality: Modality::Text,
      model: model.into(),
      prompt: prompt.into(),
      params: InvokeParams::default(),
    }
  }

  pub fn image(model: impl Into<String>, prompt: impl Into<String>) -> Self {
    Self {
      modality: Modality::Image,
      model: model.into(),
      prompt: prompt.into(),
      params: InvokeParams::default(),
    }
  }

  pub fn with_params(mut self, params: InvokeParams) -> Self {
    self.params = params;
    self
  }
}

/// Generation parameters.
///
/// `input` carries vendor-specific fields verbatim; adapters that accept a
/// free-form input object merge it under the prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeParams {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub system_prompt: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_tokens: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub input: Map<String, Value>,
}

/// Where a generated image can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
  Url(String),
  Bytes(Vec<u8>),
}

/// Fully buffered adapter result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutput {
  Text(String),
  Image(ImageSource),
}

impl InvokeOutput {
  pub fn into_text(self) -> Result<String> {
    match self {
      InvokeOutput::Text(text) => Ok(text),
      InvokeOutput::Image(_) => Err(ProviderError::InvalidResponse(
        "expected text output, got an image".to_string(),
      )),
    }
  }

  pub fn into_image(self) -> Result<ImageSource> {
    match self {
      InvokeOutput::Image(source) => Ok(source),
      InvokeOutput::Text(_) => Err(ProviderError::InvalidResponse(
        "expected image output, got text".to_string(),
      )),
    }
  }
}

/// Caller-supplied image used by face-conditioned models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
  pub bytes: Vec<u8>,
  pub mime: String,
}

impl ReferenceImage {
  /// Wrap raw bytes, sniffing the MIME type from the content.
  pub fn from_bytes(bytes: Vec<u8>) -> Self {
    let mime = image::guess_format(&bytes)
      .map(|format| format.to_mime_type().to_string())
      .unwrap_or_else(|_| "image/jpeg".to_string());
    Self { bytes, mime }
  }

  /// Read a reference image from disk.
  pub async fn from_path(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
    let bytes = tokio::fs::read(path).await?;
    Ok(Self::from_bytes(bytes))
  }

  /// `data:` URI accepted by vendors that take inline images.
  pub fn data_uri(&self) -> String {
    use base64::Engine as _;
    format!(
      "data:{};base64,{}",
      self.mime,
      base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    )
  }
}
