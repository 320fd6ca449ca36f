//! Environment variable credentials

use std::collections::HashMap;

use super::CredentialStore;

/// Environment variable store
///
/// Checks well-known variables for each provider, then `{PROVIDER}_API_KEY`.
pub struct EnvCredentialStore {
  snapshot: Option<HashMap<String, String>>,
}

impl EnvCredentialStore {
  /// Reads the process environment on every lookup
  pub fn new() -> Self {
    Self { snapshot: None }
  }

  /// Reads from a fixed set of variables instead of the process environment
  pub fn from_vars<I, K, V>(vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    Self {
      snapshot: Some(
        vars
          .into_iter()
          .map(|(k, v)| (k.into(), v.into()))
          .collect(),
      ),
    }
  }

  /// Get environment variable names for a provider, most specific first
  pub fn env_vars_for_provider(provider_id: &str) -> Vec<String> {
    let known: &[&str] = match provider_id {
      "replicate" => &["REPLICATE_API_TOKEN", "REPLICATE_API_KEY"],
      "xai" => &["XAI_API_KEY", "GROK_API_KEY"],
      "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
      _ => &[],
    };
    let mut vars: Vec<String> = known.iter().map(|v| v.to_string()).collect();

    let generic = format!("{}_API_KEY", provider_id.to_uppercase().replace('-', "_"));
    if !vars.contains(&generic) {
      vars.push(generic);
    }
    vars
  }

  fn lookup(&self, var: &str) -> Option<String> {
    match &self.snapshot {
      Some(vars) => vars.get(var).cloned(),
      None => std::env::var(var).ok(),
    }
  }
}

impl Default for EnvCredentialStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CredentialStore for EnvCredentialStore {
  fn get_credential(&self, provider_id: &str) -> Option<String> {
    for var in Self::env_vars_for_provider(provider_id) {
      if let Some(key) = self.lookup(&var) {
        if !key.is_empty() {
          tracing::debug!("Found credentials for {} in env var {}", provider_id, var);
          return Some(key);
        }
      }
    }
    None
  }

  fn name(&self) -> &'static str {
    "env"
  }
}
