//! Content synthesizer

use tracing::{debug, warn};

use super::{FieldOutcome, clamp_chars};
use crate::model::{ProviderError, ResolvedModel};
use crate::pipeline::context::LocaleContext;

/// Length asked of the model.
pub const CONTENT_TARGET_CHARS: usize = 400;
/// Hard clamp applied to whatever comes back.
pub const CONTENT_MAX_CHARS: usize = 500;
pub const CONTENT_MAX_TOKENS: u32 = 1024;

/// Writes slide body text with one text-model call.
#[derive(Debug, Clone)]
pub struct ContentSynthesizer {
  model: ResolvedModel,
  locale: LocaleContext,
}

impl ContentSynthesizer {
  pub fn new(model: ResolvedModel, locale: LocaleContext) -> Self {
    Self { model, locale }
  }

  pub async fn synthesize(&self, content_prompt: &str, topic: &str) -> FieldOutcome<String> {
    match self.try_synthesize(content_prompt, topic).await {
      Ok(content) => FieldOutcome::Generated(content),
      Err(err) => {
        warn!(model = %self.model.entry.id, error = %err, "content generation failed");
        FieldOutcome::Fallback {
          value: fallback(content_prompt),
          cause: err.kind(),
        }
      }
    }
  }

  async fn try_synthesize(&self, content_prompt: &str, topic: &str) -> Result<String, ProviderError> {
    let prompt = build_prompt(content_prompt, topic, &self.locale);
    let request = self
      .model
      .entry
      .text_request(prompt, None, CONTENT_MAX_TOKENS)?;
    let text = self.model.adapter.invoke(request).await?.into_text()?;

    let text = text.trim();
    if text.is_empty() {
      return Err(ProviderError::InvalidResponse("empty content".to_string()));
    }
    debug!(chars = text.chars().count(), "content generated");
    Ok(clamp_chars(text, CONTENT_MAX_CHARS))
  }
}

pub fn build_prompt(content_prompt: &str, topic: &str, locale: &LocaleContext) -> String {
  let mut prompt = format!(
    "Write a concise, clear text for a PowerPoint slide about the following subject: {content_prompt}. \
     This text is part of a presentation about '{topic}'. \
     The text must be informative, direct and easy to read. \
     Limit the answer to at most {CONTENT_TARGET_CHARS} characters. \
     Do NOT include the slide title, only the content."
  );
  if let Some(instruction) = locale.language_instruction() {
    prompt.push(' ');
    prompt.push_str(&instruction);
  }
  prompt
}

/// Deterministic body text used when generation fails.
pub fn fallback(content_prompt: &str) -> String {
  let head: String = content_prompt.chars().take(50).collect();
  format!("Information about {head}...")
}

/// Body text used when a slide's content task did not join.
pub fn join_fallback(topic: &str, index: usize) -> String {
  format!("Information about {topic} for slide {}", index + 1)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::auth::MemoryCredentialStore;
  use crate::model::providers::ReplicateAdapter;
  use crate::model::{ModelEntry, ModelRegistry};
  use deckforge_protocol::{ErrorKind, Modality};
  use pretty_assertions::assert_eq;
  use std::sync::Arc;

  #[test]
  fn prompt_mentions_topic_and_limit() {
    let prompt = build_prompt("aqueducts", "History of Rome", &LocaleContext::default());
    assert!(prompt.contains("aqueducts"));
    assert!(prompt.contains("'History of Rome'"));
    assert!(prompt.contains("400 characters"));
  }

  #[test]
  fn fallback_uses_first_fifty_chars() {
    let prompt = "a".repeat(80);
    assert_eq!(fallback(&prompt), format!("Information about {}...", "a".repeat(50)));
  }

  #[tokio::test]
  async fn missing_credential_falls_back() {
    let registry = ModelRegistry::new();
    registry
      .register_adapter(ReplicateAdapter::new(
        Arc::new(MemoryCredentialStore::new()),
        Some("http://127.0.0.1:9".to_string()),
        Some(1),
      ))
      .await;
    registry
      .register_model(ModelEntry::text("tiny", "Tiny", "replicate", "vendor/tiny"))
      .await;
    let model = registry.resolve("tiny", Modality::Text).await.expect("resolve");

    let outcome = ContentSynthesizer::new(model, LocaleContext::default())
      .synthesize("roads", "Rome")
      .await;
    assert_eq!(outcome.fallback_cause(), Some(ErrorKind::CredentialMissing));
    assert_eq!(outcome.into_value(), "Information about roads...");
  }
}
