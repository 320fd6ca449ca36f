//! Translation service used by the image synthesizer
//!
//! Image models are prompted in English, so non-English image prompts are
//! translated first. Failures are never fatal to the caller.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslateError {
  #[error("Translation request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("Translation service returned HTTP {0}")]
  Status(u16),

  #[error("Unexpected translation response: {0}")]
  Malformed(String),
}

pub type Result<T> = std::result::Result<T, TranslateError>;

/// `translate(text, target_lang) -> text`
#[async_trait]
pub trait Translator: Send + Sync {
  async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

/// Leaves text untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
  async fn translate(&self, text: &str, _target_lang: &str) -> Result<String> {
    Ok(text.to_string())
  }
}

pub const GOOGLE_TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Public Google translate endpoint with source language auto-detection.
pub struct GoogleTranslator {
  client: Client,
  endpoint: String,
}

impl Default for GoogleTranslator {
  fn default() -> Self {
    Self::new(GOOGLE_TRANSLATE_URL)
  }
}

impl GoogleTranslator {
  pub fn new(endpoint: impl Into<String>) -> Self {
    let client = Client::builder()
      .timeout(std::time::Duration::from_secs(15))
      .build()
      .unwrap_or_else(|_| Client::new());
    Self {
      client,
      endpoint: endpoint.into(),
    }
  }
}

#[async_trait]
impl Translator for GoogleTranslator {
  async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
    let response = self
      .client
      .get(&self.endpoint)
      .query(&[
        ("client", "gtx"),
        ("sl", "auto"),
        ("tl", target_lang),
        ("dt", "t"),
        ("q", text),
      ])
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(TranslateError::Status(status.as_u16()));
    }
    let body: Value = response.json().await?;
    join_segments(&body)
  }
}

/// The response is `[[["translated", "source", ...], ...], ...]`.
fn join_segments(body: &Value) -> Result<String> {
  let segments = body
    .get(0)
    .and_then(Value::as_array)
    .ok_or_else(|| TranslateError::Malformed(body.to_string()))?;

  let translated: String = segments
    .iter()
    .filter_map(|segment| segment.get(0).and_then(Value::as_str))
    .collect();

  if translated.trim().is_empty() {
    return Err(TranslateError::Malformed("empty translation".to_string()));
  }
  Ok(translated)
}
