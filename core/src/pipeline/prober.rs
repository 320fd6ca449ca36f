//! Availability prober
//!
//! Issues the cheapest real call a model accepts to decide whether it can be
//! used for a job. Probing never fails; every error becomes
//! [Availability::Unavailable].

use std::time::Duration;

use deckforge_protocol::{ErrorKind, Modality};
use tracing::debug;

use super::job::ModelSelection;
use crate::model::{ModelRegistryRef, ProviderError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
  Available,
  Unavailable { kind: ErrorKind, detail: String },
}

impl Availability {
  pub fn is_available(&self) -> bool {
    matches!(self, Availability::Available)
  }

  fn from_error(err: &ProviderError) -> Self {
    let kind = match err.kind() {
      ErrorKind::CredentialMissing => ErrorKind::CredentialMissing,
      _ => ErrorKind::ProviderUnavailable,
    };
    Availability::Unavailable {
      kind,
      detail: err.to_string(),
    }
  }
}

/// Probe outcome for both modalities of a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionProbe {
  pub text: Availability,
  pub image: Availability,
}

pub struct AvailabilityProber {
  registry: ModelRegistryRef,
  timeout: Duration,
}

impl AvailabilityProber {
  pub fn new(registry: ModelRegistryRef, timeout: Duration) -> Self {
    Self { registry, timeout }
  }

  /// Probe one model. A missing credential is reported without network I/O
  /// because adapters check the credential store before building a request.
  pub async fn probe(&self, modality: Modality, model_id: &str) -> Availability {
    let resolved = match self.registry.resolve(model_id, modality).await {
      Ok(resolved) => resolved,
      Err(err) => return Availability::from_error(&err),
    };

    let request = match resolved.entry.probe_request() {
      Ok(request) => request,
      Err(err) => return Availability::from_error(&err),
    };

    debug!(%modality, model = %model_id, "probing model");
    match tokio::time::timeout(self.timeout, resolved.adapter.invoke(request)).await {
      Ok(Ok(_)) => Availability::Available,
      Ok(Err(err)) => Availability::from_error(&err),
      Err(_) => Availability::Unavailable {
        kind: ErrorKind::ProviderUnavailable,
        detail: format!("probe timed out after {:?}", self.timeout),
      },
    }
  }

  /// Probe the text and image selections concurrently.
  pub async fn probe_selection(&self, selection: &ModelSelection) -> SelectionProbe {
    let (text, image) = tokio::join!(
      self.probe(Modality::Text, &selection.text),
      self.probe(Modality::Image, &selection.image),
    );
    SelectionProbe { text, image }
  }
}
