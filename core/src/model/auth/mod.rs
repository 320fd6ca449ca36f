//! Credential sources for provider adapters
//!
//! Adapters ask a [CredentialStore] for their secret on every call. A provider
//! whose store answers `None` is treated as unavailable without any network
//! traffic.

pub mod resolver;
pub mod storage;

pub use resolver::EnvCredentialStore;
pub use storage::FileCredentialStore;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Credential errors
#[derive(Error, Debug)]
pub enum CredentialError {
  /// Storage error
  #[error("Storage error: {0}")]
  StorageError(String),

  /// IO error
  #[error("IO error: {0}")]
  IoError(#[from] std::io::Error),

  /// JSON parse error
  #[error("JSON error: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// Credential result
pub type Result<T> = std::result::Result<T, CredentialError>;

/// Read-only credential lookup.
pub trait CredentialStore: Send + Sync {
  /// Secret for `provider_id`, if one is configured
  fn get_credential(&self, provider_id: &str) -> Option<String>;

  /// Get the store name
  fn name(&self) -> &'static str;
}

/// In-memory store, mostly for tests and programmatic embedding
#[derive(Default)]
pub struct MemoryCredentialStore {
  credentials: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build from `(provider, secret)` pairs
  pub fn with<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let credentials = pairs
      .into_iter()
      .map(|(k, v)| (k.into(), v.into()))
      .collect();
    Self {
      credentials: RwLock::new(credentials),
    }
  }

  pub fn set(&self, provider_id: impl Into<String>, secret: impl Into<String>) {
    if let Ok(mut credentials) = self.credentials.write() {
      credentials.insert(provider_id.into(), secret.into());
    }
  }

  pub fn remove(&self, provider_id: &str) {
    if let Ok(mut credentials) = self.credentials.write() {
      credentials.remove(provider_id);
    }
  }
}

impl CredentialStore for MemoryCredentialStore {
  fn get_credential(&self, provider_id: &str) -> Option<String> {
    self
      .credentials
      .read()
      .ok()
      .and_then(|credentials| credentials.get(provider_id).cloned())
      .filter(|secret| !secret.is_empty())
  }

  fn name(&self) -> &'static str {
    "memory"
  }
}

/// Asks each store in order and returns the first hit
#[derive(Default)]
pub struct ChainedCredentialStore {
  stores: Vec<Arc<dyn CredentialStore>>,
}

impl ChainedCredentialStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(mut self, store: Arc<dyn CredentialStore>) -> Self {
    self.stores.push(store);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.stores.is_empty()
  }
}

impl CredentialStore for ChainedCredentialStore {
  fn get_credential(&self, provider_id: &str) -> Option<String> {
    self.stores.iter().find_map(|store| {
      let secret = store.get_credential(provider_id)?;
      tracing::debug!("Found credentials for {} in {} store", provider_id, store.name());
      Some(secret)
    })
  }

  fn name(&self) -> &'static str {
    "chain"
  }
}
