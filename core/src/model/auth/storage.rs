//! Credential storage
//!
//! Handles persistent storage of provider keys in a JSON file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CredentialError, CredentialStore, Result};

/// On-disk layout of the credential file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialFile {
  #[serde(default)]
  credentials: BTreeMap<String, StoredCredential>,
}

/// One stored provider key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
  pub key: String,
  pub stored_at: DateTime<Utc>,
}

/// File-based credential storage
pub struct FileCredentialStore {
  /// Path to the storage file
  storage_path: PathBuf,
  cache: RwLock<CredentialFile>,
}

impl FileCredentialStore {
  /// Get the default Deckforge credential path
  pub fn default_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
      .ok_or_else(|| CredentialError::StorageError("No home directory found".to_string()))?;

    Ok(home.join(".deckforge").join("credentials.json"))
  }

  /// Open the store, reading the file if it exists
  pub fn load(storage_path: impl AsRef<Path>) -> Result<Self> {
    let storage_path = storage_path.as_ref().to_path_buf();
    let file = if storage_path.exists() {
      let content = std::fs::read_to_string(&storage_path)
        .map_err(|e| CredentialError::StorageError(format!("Failed to read credential file: {e}")))?;
      serde_json::from_str(&content)?
    } else {
      CredentialFile::default()
    };

    Ok(Self {
      storage_path,
      cache: RwLock::new(file),
    })
  }

  /// Path of the backing file
  pub fn path(&self) -> &Path {
    &self.storage_path
  }

  /// Save or replace the key for a provider
  pub fn store(&self, provider_id: &str, key: &str) -> Result<()> {
    let mut file = self.snapshot()?;
    file.credentials.insert(
      provider_id.to_string(),
      StoredCredential {
        key: key.to_string(),
        stored_at: Utc::now(),
      },
    );
    self.persist(file)
  }

  /// Delete the key for a provider; returns whether one existed
  pub fn remove(&self, provider_id: &str) -> Result<bool> {
    let mut file = self.snapshot()?;
    let removed = file.credentials.remove(provider_id).is_some();
    if removed {
      self.persist(file)?;
    }
    Ok(removed)
  }

  /// Stored provider ids with their timestamps
  pub fn entries(&self) -> Vec<(String, DateTime<Utc>)> {
    self
      .snapshot()
      .map(|file| {
        file
          .credentials
          .into_iter()
          .map(|(id, stored)| (id, stored.stored_at))
          .collect()
      })
      .unwrap_or_default()
  }

  fn snapshot(&self) -> Result<CredentialFile> {
    self
      .cache
      .read()
      .map(|file| file.clone())
      .map_err(|_| CredentialError::StorageError("credential cache poisoned".to_string()))
  }

  fn persist(&self, file: CredentialFile) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = self.storage_path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        CredentialError::StorageError(format!("Failed to create credential directory: {e}"))
      })?;
    }

    let content = serde_json::to_string_pretty(&file)?;
    std::fs::write(&self.storage_path, content)
      .map_err(|e| CredentialError::StorageError(format!("Failed to write credential file: {e}")))?;

    let mut cache = self
      .cache
      .write()
      .map_err(|_| CredentialError::StorageError("credential cache poisoned".to_string()))?;
    *cache = file;
    Ok(())
  }
}

impl CredentialStore for FileCredentialStore {
  fn get_credential(&self, provider_id: &str) -> Option<String> {
    self
      .cache
      .read()
      .ok()
      .and_then(|file| file.credentials.get(provider_id).map(|c| c.key.clone()))
      .filter(|key| !key.is_empty())
  }

  fn name(&self) -> &'static str {
    "file"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  #[test]
  fn missing_file_is_empty_store() {
    let dir = TempDir::new().expect("tempdir");
    let store = FileCredentialStore::load(dir.path().join("credentials.json")).expect("load");
    assert_eq!(store.get_credential("replicate"), None);
    assert!(store.entries().is_empty());
  }

  #[test]
  fn stored_keys_survive_reload() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("nested").join("credentials.json");

    let store = FileCredentialStore::load(&path).expect("load");
    store.store("replicate", "r8_abc").expect("store key");
    store.store("xai", "xai-def").expect("store key");
    assert!(store.remove("xai").expect("remove key"));

    let reloaded = FileCredentialStore::load(&path).expect("reload");
    assert_eq!(reloaded.get_credential("replicate").as_deref(), Some("r8_abc"));
    assert_eq!(reloaded.get_credential("xai"), None);
  }
}
