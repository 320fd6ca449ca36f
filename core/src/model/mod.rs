//! Deckforge Model Provider Layer
//!
//! A uniform "invoke a named model" capability over several vendors.
//!
//! Architecture:
//! - [ProviderAdapter] trait: one implementation per vendor
//! - [ModelRegistry]: binds model ids from the [catalog] to adapters
//! - [auth]: credential sources (environment, file, memory)
//! - Adapter implementations in [providers]

pub mod catalog;
pub mod error;
pub mod provider;
pub mod registry;
pub mod streaming;
pub mod types;

pub mod auth;
pub mod providers;

// Re-exports
pub use catalog::{ModelEntry, ModelProfile, builtin_models};
pub use error::{ProviderError, Result};
pub use provider::{ProviderAdapter, ProviderInfo};
pub use registry::{ModelRegistry, ModelRegistryRef, ResolvedModel};
pub use streaming::{StreamingConfig, StreamingProcessor};
pub use types::*;

use std::sync::Arc;

use auth::{ChainedCredentialStore, CredentialStore, EnvCredentialStore, FileCredentialStore};

/// Initialize the model layer with the given credentials
pub async fn init_model_layer(
  config: &deckforge_config::Config,
  credentials: Arc<dyn CredentialStore>,
) -> ModelRegistryRef {
  let registry = Arc::new(ModelRegistry::new());
  providers::register_all_providers(&registry, config, credentials).await;
  registry
}

/// Credential chain configured by `[credentials]`: environment first, then the
/// credentials file.
pub fn default_credentials(
  config: &deckforge_config::Config,
) -> auth::Result<Arc<dyn CredentialStore>> {
  let mut chain = ChainedCredentialStore::new();
  if config.credentials.from_env {
    chain = chain.push(Arc::new(EnvCredentialStore::new()));
  }

  let path = match &config.credentials.file {
    Some(path) => path.clone(),
    None => FileCredentialStore::default_path()?,
  };
  chain = chain.push(Arc::new(FileCredentialStore::load(path)?));
  Ok(Arc::new(chain))
}
