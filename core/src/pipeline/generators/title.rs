//! Title refiner

use super::clamp_chars;

pub const TITLE_MAX_CHARS: usize = 50;

/// Fit a title seed into the title box. Pure and idempotent.
pub fn refine(seed: &str) -> String {
  clamp_chars(seed, TITLE_MAX_CHARS)
}

/// Title used when a slide's title task did not join.
pub fn fallback(index: usize) -> String {
  format!("Slide {}", index + 1)
}
