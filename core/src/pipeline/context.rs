//! Immutable locale and theme context handed to the coordinator

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Layout id of the opening slide.
pub const TITLE_LAYOUT: usize = 0;
/// Number of content layouts cycled after the title slide (ids `1..=7`).
pub const CONTENT_LAYOUT_COUNT: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleContext {
  /// Language slide text is written in
  pub language: String,
  /// Language image prompts are translated into
  pub image_prompt_language: String,
  pub translate_image_prompts: bool,
}

impl Default for LocaleContext {
  fn default() -> Self {
    Self::from(&deckforge_config::LocaleConfig::default())
  }
}

impl From<&deckforge_config::LocaleConfig> for LocaleContext {
  fn from(locale: &deckforge_config::LocaleConfig) -> Self {
    Self {
      language: locale.language.clone(),
      image_prompt_language: locale.image_prompt_language.clone(),
      translate_image_prompts: locale.translate_image_prompts,
    }
  }
}

impl LocaleContext {
  /// Sentence appended to text prompts when slides are not in English.
  pub fn language_instruction(&self) -> Option<String> {
    let language = self.language.trim();
    if language.is_empty() || language.eq_ignore_ascii_case("en") {
      None
    } else {
      Some(format!("Write the answer in the language with code '{language}'."))
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeContext {
  pub name: String,
  /// Fixed seed makes layout assignment reproducible
  pub layout_seed: Option<u64>,
}

impl Default for ThemeContext {
  fn default() -> Self {
    Self::from(&deckforge_config::ThemeConfig::default())
  }
}

impl From<&deckforge_config::ThemeConfig> for ThemeContext {
  fn from(theme: &deckforge_config::ThemeConfig) -> Self {
    Self {
      name: theme.name.clone(),
      layout_seed: theme.layout_seed,
    }
  }
}

/// Theme plus one layout id per slide, passed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutChoice {
  pub theme: String,
  pub layouts: Vec<usize>,
}

impl LayoutChoice {
  pub fn layout_for(&self, index: usize) -> usize {
    self.layouts.get(index).copied().unwrap_or(TITLE_LAYOUT)
  }
}

impl ThemeContext {
  /// Slide 0 gets the title layout, the rest cycle a shuffled list of `1..=7`.
  pub fn assign_layouts(&self, num_slides: usize) -> LayoutChoice {
    let mut designs: Vec<usize> = (1..=CONTENT_LAYOUT_COUNT).collect();
    let mut rng = match self.layout_seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    designs.shuffle(&mut rng);

    let layouts = (0..num_slides)
      .map(|index| {
        if index == 0 {
          TITLE_LAYOUT
        } else {
          designs[(index - 1) % designs.len()]
        }
      })
      .collect();

    LayoutChoice {
      theme: self.name.clone(),
      layouts,
    }
  }
}
