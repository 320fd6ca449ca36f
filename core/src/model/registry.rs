//! Model Registry
//!
//! Manages registration and discovery of provider adapters and the models
//! they serve.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use deckforge_protocol::Modality;
use tokio::sync::RwLock;

use super::auth::CredentialStore;
use super::catalog::ModelEntry;
use super::error::{ProviderError, Result};
use super::provider::{ProviderAdapter, ProviderInfo};

/// A model id bound to the adapter that serves it.
#[derive(Clone)]
pub struct ResolvedModel {
  pub entry: ModelEntry,
  pub adapter: Arc<dyn ProviderAdapter>,
}

impl std::fmt::Debug for ResolvedModel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResolvedModel")
      .field("entry", &self.entry)
      .field("adapter", &self.adapter.provider_id())
      .finish()
  }
}

/// Model Registry
///
/// Adapters are keyed by provider id; models by their user-facing id.
pub struct ModelRegistry {
  adapters: RwLock<HashMap<String, Arc<dyn ProviderAdapter>>>,
  models: RwLock<BTreeMap<String, ModelEntry>>,
}

impl Default for ModelRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl ModelRegistry {
  /// Create a new registry
  pub fn new() -> Self {
    Self {
      adapters: RwLock::new(HashMap::new()),
      models: RwLock::new(BTreeMap::new()),
    }
  }

  /// Register an adapter, replacing any previous one with the same id
  pub async fn register_adapter<A: ProviderAdapter + 'static>(&self, adapter: A) {
    self.register_shared_adapter(Arc::new(adapter)).await;
  }

  /// Register an adapter that is already shared
  pub async fn register_shared_adapter(&self, adapter: Arc<dyn ProviderAdapter>) {
    let provider_id = adapter.provider_id().to_string();
    self.adapters.write().await.insert(provider_id, adapter);
  }

  /// Register a model entry
  pub async fn register_model(&self, entry: ModelEntry) {
    self.models.write().await.insert(entry.id.clone(), entry);
  }

  /// Get an adapter by provider id
  pub async fn get_adapter(&self, provider_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
    self.adapters.read().await.get(provider_id).cloned()
  }

  /// Get a model entry by id
  pub async fn get_model(&self, model_id: &str) -> Option<ModelEntry> {
    self.models.read().await.get(model_id).cloned()
  }

  /// Check if a model exists
  pub async fn has_model(&self, model_id: &str) -> bool {
    self.models.read().await.contains_key(model_id)
  }

  /// Bind a model id to its adapter, checking the requested modality.
  pub async fn resolve(&self, model_id: &str, modality: Modality) -> Result<ResolvedModel> {
    let entry = self
      .get_model(model_id)
      .await
      .ok_or_else(|| ProviderError::ModelNotFound(model_id.to_string()))?;

    if entry.modality() != modality {
      return Err(ProviderError::UnsupportedModality {
        provider: entry.id.clone(),
        modality: modality.to_string(),
      });
    }

    let adapter = self
      .get_adapter(&entry.provider_id)
      .await
      .ok_or_else(|| ProviderError::ProviderNotFound(entry.provider_id.clone()))?;

    if !adapter.modalities().contains(&modality) {
      return Err(ProviderError::UnsupportedModality {
        provider: entry.provider_id.clone(),
        modality: modality.to_string(),
      });
    }

    Ok(ResolvedModel { entry, adapter })
  }

  /// List models, optionally restricted to one modality, sorted by id
  pub async fn list_models(&self, modality: Option<Modality>) -> Vec<ModelEntry> {
    self
      .models
      .read()
      .await
      .values()
      .filter(|entry| modality.is_none_or(|m| entry.modality() == m))
      .cloned()
      .collect()
  }

  /// List all registered adapters with their credential status
  pub async fn list_providers(&self, credentials: &dyn CredentialStore) -> Vec<ProviderInfo> {
    let adapters = self.adapters.read().await;
    let mut providers: Vec<ProviderInfo> = adapters
      .values()
      .map(|adapter| ProviderInfo {
        id: adapter.provider_id().to_string(),
        name: adapter.provider_name().to_string(),
        env_vars: adapter
          .required_env_vars()
          .into_iter()
          .map(str::to_string)
          .collect(),
        authenticated: credentials
          .get_credential(adapter.credential_name())
          .is_some(),
        modalities: adapter.modalities(),
      })
      .collect();
    providers.sort_by(|a, b| a.id.cmp(&b.id));
    providers
  }
}

/// Thread-safe reference to the registry
pub type ModelRegistryRef = Arc<ModelRegistry>;
