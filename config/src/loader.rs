// Configuration Loader
// Layered configuration loading system

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::layered::{ConfigLayer, ConfigLayerSource, LayeredConfig};
use crate::types::Config;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading a config file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid TOML
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Merged layers do not form a valid configuration
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Override key is not recognised
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    /// Override value has the wrong shape
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    /// Override is not in KEY=VALUE form
    #[error("Override must be KEY=VALUE, got: {0}")]
    MalformedOverride(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration loader with layered support
pub struct ConfigLoader {
    /// Global config directory
    global_dir: PathBuf,
    /// Project config directory
    project_dir: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_dir: Self::default_global_dir(),
            project_dir: None,
        }
    }

    /// ~/.deckforge
    pub fn default_global_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".deckforge")
    }

    /// Set global directory
    pub fn with_global_dir(mut self, dir: PathBuf) -> Self {
        self.global_dir = dir;
        self
    }

    /// Set project directory
    pub fn with_project_dir(mut self, dir: PathBuf) -> Self {
        self.project_dir = Some(dir);
        self
    }

    /// Load configuration without overrides
    pub fn load(&self) -> Result<Config> {
        self.load_with_cli_overrides(Vec::new())
    }

    /// Load configuration with CLI overrides
    pub fn load_with_cli_overrides(&self, cli_overrides: Vec<(String, String)>) -> Result<Config> {
        // Load layers in order:
        // 1. Built-in defaults
        // 2. Global config (~/.deckforge/config.toml)
        // 3. Project config (.deckforge/config.toml)
        // 4. CLI overrides
        let mut layered = LayeredConfig::new();
        layered.add_layer(ConfigLayer {
            source: ConfigLayerSource::Default,
            values: toml::Value::try_from(Config::default())
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
        });

        if let Some(values) = self.read_layer(&self.global_dir.join("config.toml"))? {
            layered.add_layer(ConfigLayer {
                source: ConfigLayerSource::GlobalConfig,
                values,
            });
        }

        if let Some(project_dir) = &self.project_dir {
            let path = project_dir.join(".deckforge").join("config.toml");
            if let Some(values) = self.read_layer(&path)? {
                layered.add_layer(ConfigLayer {
                    source: ConfigLayerSource::ProjectConfig,
                    values,
                });
            }
        }

        let mut config: Config = layered
            .merge()
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))?;

        for (key, value) in cli_overrides {
            self.apply_override(&mut config, &key, &value)?;
        }

        Ok(config)
    }

    /// Read one config file; a missing file is not an error
    fn read_layer(&self, path: &Path) -> Result<Option<toml::Value>> {
        if !path.exists() {
            return Ok(None);
        }
        debug!("Loading config layer from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let values = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(values))
    }

    /// Apply a single CLI override
    fn apply_override(&self, config: &mut Config, key: &str, value: &str) -> Result<()> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "models.text" => config.models.text = value.to_string(),
            "models.image" => config.models.image = value.to_string(),
            "models.fallback_text" => config.models.fallback_text = optional_string(value),
            "models.fallback_image" => config.models.fallback_image = optional_string(value),
            "generation.field_timeout_secs" => {
                config.generation.field_timeout_secs = value.parse().map_err(|_| invalid())?;
            }
            "generation.probe_timeout_secs" => {
                config.generation.probe_timeout_secs = value.parse().map_err(|_| invalid())?;
            }
            "generation.workers_per_slide" => {
                config.generation.workers_per_slide = value.parse().map_err(|_| invalid())?;
            }
            "generation.max_workers" => {
                config.generation.max_workers = match optional_string(value) {
                    Some(v) => Some(v.parse().map_err(|_| invalid())?),
                    None => None,
                };
            }
            "generation.dedupe_specs" => {
                config.generation.dedupe_specs = value.parse().map_err(|_| invalid())?;
            }
            "generation.default_slide_count" => {
                config.generation.default_slide_count = value.parse().map_err(|_| invalid())?;
            }
            "credentials.from_env" => {
                config.credentials.from_env = value.parse().map_err(|_| invalid())?;
            }
            "credentials.file" => config.credentials.file = optional_string(value).map(PathBuf::from),
            "locale.language" => config.locale.language = value.to_string(),
            "locale.image_prompt_language" => {
                config.locale.image_prompt_language = value.to_string();
            }
            "locale.translate_image_prompts" => {
                config.locale.translate_image_prompts = value.parse().map_err(|_| invalid())?;
            }
            "theme.name" => config.theme.name = value.to_string(),
            "theme.layout_seed" => {
                config.theme.layout_seed = match optional_string(value) {
                    Some(v) => Some(v.parse().map_err(|_| invalid())?),
                    None => None,
                };
            }
            "output.directory" => config.output.directory = PathBuf::from(value),
            _ => {
                if let Some(rest) = key.strip_prefix("providers.") {
                    return self.apply_provider_override(config, rest, key, value);
                }
                return Err(ConfigError::UnknownKey(key.to_string()));
            }
        }
        Ok(())
    }

    /// providers.<id>.base_url / providers.<id>.timeout_secs
    fn apply_provider_override(
        &self,
        config: &mut Config,
        rest: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let Some((provider_id, field)) = rest.rsplit_once('.') else {
            return Err(ConfigError::UnknownKey(key.to_string()));
        };
        let settings = config.providers.entry(provider_id.to_string()).or_default();
        match field {
            "base_url" => settings.base_url = optional_string(value),
            "timeout_secs" => {
                settings.timeout_secs = Some(value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?);
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a `KEY=VALUE` override
pub fn parse_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::MalformedOverride(raw.to_string())),
    }
}

fn optional_string(value: &str) -> Option<String> {
    match value {
        "" | "none" | "null" => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn loader_in(global: &TempDir, project: &TempDir) -> ConfigLoader {
        ConfigLoader::new()
            .with_global_dir(global.path().to_path_buf())
            .with_project_dir(project.path().to_path_buf())
    }

    #[test]
    fn defaults_when_no_files() {
        let global = TempDir::new().expect("tempdir");
        let project = TempDir::new().expect("tempdir");

        let config = loader_in(&global, &project).load().expect("load config");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn project_layer_overrides_global_layer() {
        let global = TempDir::new().expect("tempdir");
        let project = TempDir::new().expect("tempdir");
        std::fs::write(
            global.path().join("config.toml"),
            "[models]\ntext = \"grok-2\"\nimage = \"flux-schnell\"\n",
        )
        .expect("write global config");
        std::fs::create_dir_all(project.path().join(".deckforge")).expect("mkdir");
        std::fs::write(
            project.path().join(".deckforge").join("config.toml"),
            "[models]\nimage = \"sana\"\n",
        )
        .expect("write project config");

        let config = loader_in(&global, &project).load().expect("load config");
        assert_eq!(config.models.text, "grok-2");
        assert_eq!(config.models.image, "sana");
        assert_eq!(config.generation.field_timeout_secs, 180);
    }

    #[test]
    fn cli_overrides_apply_last() {
        let global = TempDir::new().expect("tempdir");
        let project = TempDir::new().expect("tempdir");

        let config = loader_in(&global, &project)
            .load_with_cli_overrides(vec![
                ("generation.field_timeout_secs".to_string(), "45".to_string()),
                ("providers.replicate.base_url".to_string(), "http://localhost:9".to_string()),
                ("models.fallback_image".to_string(), "none".to_string()),
            ])
            .expect("load config");

        assert_eq!(config.generation.field_timeout_secs, 45);
        assert_eq!(
            config.provider("replicate").base_url.as_deref(),
            Some("http://localhost:9")
        );
        assert_eq!(config.models.fallback_image, None);
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let global = TempDir::new().expect("tempdir");
        let project = TempDir::new().expect("tempdir");

        let err = loader_in(&global, &project)
            .load_with_cli_overrides(vec![("sandbox.mode".to_string(), "strict".to_string())])
            .expect_err("unknown key");
        assert!(matches!(err, ConfigError::UnknownKey(key) if key == "sandbox.mode"));
    }

    #[test]
    fn bad_override_value_is_rejected() {
        let global = TempDir::new().expect("tempdir");
        let project = TempDir::new().expect("tempdir");

        let err = loader_in(&global, &project)
            .load_with_cli_overrides(vec![(
                "generation.probe_timeout_secs".to_string(),
                "soon".to_string(),
            )])
            .expect_err("bad value");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn parse_override_splits_on_first_equals() {
        assert_eq!(
            parse_override("theme.name=dark=blue").expect("parse"),
            ("theme.name".to_string(), "dark=blue".to_string())
        );
        assert!(parse_override("no-equals").is_err());
    }
}
