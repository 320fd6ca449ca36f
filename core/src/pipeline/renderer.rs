//! Document renderer collaborator
//!
//! The coordinator hands the ordered slide records to a [DocumentRenderer]
//! and never looks inside the persisted document.

use std::collections::HashMap;

use async_trait::async_trait;
use deckforge_protocol::SlideField;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::context::LayoutChoice;
use super::job::{DocumentTarget, SlideImage, SlideRecord};

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("Document not found: {0}")]
  NotFound(String),

  #[error("Slide {index} out of range for a {len}-slide document")]
  SlideOutOfRange { index: usize, len: usize },

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Manifest error: {0}")]
  Manifest(#[from] serde_json::Error),

  #[error("Image encode error: {0}")]
  Image(#[from] image::ImageError),

  #[error("Batch rejected: {0}")]
  Rejected(String),
}

/// Opaque reference to a persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentHandle {
  pub id: String,
  /// Renderer-specific location, e.g. a directory
  pub location: String,
}

/// New value for one field of one slide.
#[derive(Debug, Clone)]
pub enum FieldValue {
  Title(String),
  Content(String),
  Image(SlideImage),
}

impl FieldValue {
  pub fn field(&self) -> SlideField {
    match self {
      FieldValue::Title(_) => SlideField::Title,
      FieldValue::Content(_) => SlideField::Content,
      FieldValue::Image(_) => SlideField::Image,
    }
  }
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
  /// Persist a complete, ordered batch.
  async fn render(
    &self,
    target: &DocumentTarget,
    records: &[SlideRecord],
    layout: &LayoutChoice,
  ) -> Result<DocumentHandle, RenderError>;

  /// Replace one field of one slide, leaving everything else untouched.
  async fn patch(
    &self,
    handle: &DocumentHandle,
    index: usize,
    value: &FieldValue,
  ) -> Result<(), RenderError>;

  /// Number of slides in a persisted document.
  async fn slide_count(&self, handle: &DocumentHandle) -> Result<usize, RenderError>;
}

/// A rendered document held in memory.
#[derive(Debug, Clone)]
pub struct StoredDocument {
  pub records: Vec<SlideRecord>,
  pub layout: LayoutChoice,
}

/// Keeps documents in memory; used for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryRenderer {
  documents: RwLock<HashMap<String, StoredDocument>>,
}

impl InMemoryRenderer {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn document(&self, handle: &DocumentHandle) -> Option<StoredDocument> {
    self.documents.read().await.get(&handle.id).cloned()
  }

  pub async fn len(&self) -> usize {
    self.documents.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.documents.read().await.is_empty()
  }
}

#[async_trait]
impl DocumentRenderer for InMemoryRenderer {
  async fn render(
    &self,
    target: &DocumentTarget,
    records: &[SlideRecord],
    layout: &LayoutChoice,
  ) -> Result<DocumentHandle, RenderError> {
    let handle = DocumentHandle {
      id: target.name.clone(),
      location: format!("memory://{}", target.name),
    };
    self.documents.write().await.insert(
      handle.id.clone(),
      StoredDocument {
        records: records.to_vec(),
        layout: layout.clone(),
      },
    );
    Ok(handle)
  }

  async fn patch(
    &self,
    handle: &DocumentHandle,
    index: usize,
    value: &FieldValue,
  ) -> Result<(), RenderError> {
    let mut documents = self.documents.write().await;
    let document = documents
      .get_mut(&handle.id)
      .ok_or_else(|| RenderError::NotFound(handle.id.clone()))?;
    let len = document.records.len();
    let record = document
      .records
      .get_mut(index)
      .ok_or(RenderError::SlideOutOfRange { index, len })?;

    match value {
      FieldValue::Title(title) => record.title = title.clone(),
      FieldValue::Content(content) => record.content = content.clone(),
      FieldValue::Image(image) => record.image = image.clone(),
    }
    Ok(())
  }

  async fn slide_count(&self, handle: &DocumentHandle) -> Result<usize, RenderError> {
    self
      .documents
      .read()
      .await
      .get(&handle.id)
      .map(|document| document.records.len())
      .ok_or_else(|| RenderError::NotFound(handle.id.clone()))
  }
}
