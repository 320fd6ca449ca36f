// Configuration Types
// All configuration type definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  /// Model selection and documented defaults
  pub models: ModelsConfig,
  /// Fan-out, timeouts and planner behaviour
  pub generation: GenerationConfig,
  /// Per-provider endpoint overrides keyed by provider id
  pub providers: BTreeMap<String, ProviderSettings>,
  /// Credential sources
  pub credentials: CredentialsConfig,
  /// Language settings
  pub locale: LocaleConfig,
  /// Theme and layout settings
  pub theme: ThemeConfig,
  /// Output location for rendered decks
  pub output: OutputConfig,
}

impl Config {
  /// Settings for one provider, falling back to defaults.
  pub fn provider(&self, provider_id: &str) -> ProviderSettings {
    self.providers.get(provider_id).cloned().unwrap_or_default()
  }
}

// ============================================================================
// MODELS CONFIGURATION
// ============================================================================

pub const DEFAULT_TEXT_MODEL: &str = "llama-3.1-405b";
pub const DEFAULT_IMAGE_MODEL: &str = "hyper-flux-16step";

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
  /// Text model requested when the caller does not name one
  pub text: String,
  /// Image model requested when the caller does not name one
  pub image: String,
  /// Substitute used when the text probe fails
  pub fallback_text: Option<String>,
  /// Substitute used when the image probe fails
  pub fallback_image: Option<String>,
}

impl Default for ModelsConfig {
  fn default() -> Self {
    Self {
      text: DEFAULT_TEXT_MODEL.to_string(),
      image: DEFAULT_IMAGE_MODEL.to_string(),
      fallback_text: Some(DEFAULT_TEXT_MODEL.to_string()),
      fallback_image: Some(DEFAULT_IMAGE_MODEL.to_string()),
    }
  }
}

// ============================================================================
// GENERATION CONFIGURATION
// ============================================================================

/// Generation pipeline tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
  /// Upper bound for one generator call, in seconds
  pub field_timeout_secs: u64,
  /// Upper bound for one availability probe, in seconds
  pub probe_timeout_secs: u64,
  /// Workers allotted per slide
  pub workers_per_slide: usize,
  /// Hard cap on concurrent generator calls
  pub max_workers: Option<usize>,
  /// Skip planner specs whose title repeats an accepted one
  pub dedupe_specs: bool,
  /// Slide count used when the caller gives none
  pub default_slide_count: usize,
}

impl Default for GenerationConfig {
  fn default() -> Self {
    Self {
      field_timeout_secs: 180,
      probe_timeout_secs: 30,
      workers_per_slide: 3,
      max_workers: None,
      dedupe_specs: false,
      default_slide_count: 5,
    }
  }
}

impl GenerationConfig {
  /// Worker pool size for a job of `num_slides` slides.
  pub fn worker_count(&self, num_slides: usize) -> usize {
    let wanted = (self.workers_per_slide.max(1) * num_slides).max(1);
    match self.max_workers {
      Some(cap) if cap > 0 => wanted.min(cap),
      _ => wanted,
    }
  }
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Provider endpoint settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
  /// Base URL override
  pub base_url: Option<String>,
  /// HTTP timeout in seconds
  pub timeout_secs: Option<u64>,
}

/// Credential sources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CredentialsConfig {
  /// Read provider keys from the environment
  pub from_env: bool,
  /// JSON credential file, defaults to ~/.deckforge/credentials.json
  pub file: Option<PathBuf>,
}

impl Default for CredentialsConfig {
  fn default() -> Self {
    Self {
      from_env: true,
      file: None,
    }
  }
}

// ============================================================================
// LOCALE / THEME / OUTPUT
// ============================================================================

/// Locale configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocaleConfig {
  /// Language of generated slide text
  pub language: String,
  /// Language image prompts are translated into
  pub image_prompt_language: String,
  /// Translate image prompts before sending them
  pub translate_image_prompts: bool,
}

impl Default for LocaleConfig {
  fn default() -> Self {
    Self {
      language: "en".to_string(),
      image_prompt_language: "en".to_string(),
      translate_image_prompts: true,
    }
  }
}

/// Theme configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThemeConfig {
  /// Theme name handed to the renderer
  pub name: String,
  /// Seed for layout shuffling; random when unset
  pub layout_seed: Option<u64>,
}

impl Default for ThemeConfig {
  fn default() -> Self {
    Self {
      name: "default".to_string(),
      layout_seed: None,
    }
  }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
  /// Directory rendered decks are written under
  pub directory: PathBuf,
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      directory: PathBuf::from("decks"),
    }
  }
}
