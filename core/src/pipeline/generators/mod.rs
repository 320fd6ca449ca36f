//! Field generators
//!
//! One generator per slide field. Generators never fail: a provider error is
//! turned into a [FieldOutcome::Fallback] carrying the cause.

pub mod content;
pub mod image;
pub mod title;

pub use content::ContentSynthesizer;
pub use image::ImageSynthesizer;
pub use title::refine as refine_title;

use deckforge_protocol::ErrorKind;

/// Result of one generator call.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome<T> {
  Generated(T),
  Fallback { value: T, cause: ErrorKind },
}

impl<T> FieldOutcome<T> {
  pub fn value(&self) -> &T {
    match self {
      FieldOutcome::Generated(value) | FieldOutcome::Fallback { value, .. } => value,
    }
  }

  pub fn into_value(self) -> T {
    match self {
      FieldOutcome::Generated(value) | FieldOutcome::Fallback { value, .. } => value,
    }
  }

  pub fn fallback_cause(&self) -> Option<ErrorKind> {
    match self {
      FieldOutcome::Generated(_) => None,
      FieldOutcome::Fallback { cause, .. } => Some(*cause),
    }
  }
}

/// Keep at most `max` characters, replacing the tail with `...` when cut.
pub(crate) fn clamp_chars(text: &str, max: usize) -> String {
  if text.chars().count() <= max {
    return text.to_string();
  }
  let kept: String = text.chars().take(max.saturating_sub(3)).collect();
  format!("{kept}...")
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn clamp_counts_chars_not_bytes() {
    let text = "é".repeat(60);
    let clamped = clamp_chars(&text, 50);
    assert_eq!(clamped.chars().count(), 50);
    assert!(clamped.ends_with("..."));
    assert_eq!(clamp_chars("short", 50), "short");
  }

  #[test]
  fn outcome_exposes_cause() {
    let outcome = FieldOutcome::Fallback {
      value: 1,
      cause: ErrorKind::ProviderTransientError,
    };
    assert_eq!(outcome.fallback_cause(), Some(ErrorKind::ProviderTransientError));
    assert_eq!(outcome.into_value(), 1);
    assert_eq!(FieldOutcome::Generated("x").fallback_cause(), None);
  }
}
