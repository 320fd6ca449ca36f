//! Job, plan and slide record types

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use deckforge_protocol::{ErrorKind, SlideField};
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ReferenceImage;

/// Placeholder image size.
pub const PLACEHOLDER_WIDTH: u32 = 800;
pub const PLACEHOLDER_HEIGHT: u32 = 600;
/// Placeholder fill colour.
pub const PLACEHOLDER_RGB: [u8; 3] = [240, 240, 240];

/// The (text, image) model pair chosen for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
  pub text: String,
  pub image: String,
}

impl ModelSelection {
  pub fn new(text: impl Into<String>, image: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      image: image.into(),
    }
  }
}

impl From<&deckforge_config::ModelsConfig> for ModelSelection {
  fn from(models: &deckforge_config::ModelsConfig) -> Self {
    Self::new(models.text.clone(), models.image.clone())
  }
}

/// Name under which the renderer persists the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTarget {
  pub name: String,
}

impl DocumentTarget {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

/// One pipeline invocation. Not reused across runs.
#[derive(Debug, Clone)]
pub struct GenerationJob {
  pub id: Uuid,
  pub created_at: DateTime<Utc>,
  pub topic: String,
  pub slide_count: usize,
  pub models: ModelSelection,
  pub reference_image: Option<ReferenceImage>,
  pub target: DocumentTarget,
}

impl GenerationJob {
  pub fn new(topic: impl Into<String>, slide_count: usize, models: ModelSelection) -> Self {
    let id = Uuid::new_v4();
    Self {
      id,
      created_at: Utc::now(),
      topic: topic.into(),
      slide_count,
      models,
      reference_image: None,
      target: DocumentTarget::new(id.to_string()),
    }
  }

  pub fn with_reference_image(mut self, reference: ReferenceImage) -> Self {
    self.reference_image = Some(reference);
    self
  }

  pub fn with_target(mut self, target: DocumentTarget) -> Self {
    self.target = target;
    self
  }
}

/// Per-slide generation spec produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideSpec {
  pub index: usize,
  pub title_seed: String,
  pub content_prompt: String,
  pub image_prompt: String,
}

impl SlideSpec {
  /// Generic spec used when the model gave nothing usable for a slide.
  pub fn synthetic(index: usize, topic: &str) -> Self {
    let ordinal = index + 1;
    Self {
      index,
      title_seed: format!("Slide {ordinal} about {topic}"),
      content_prompt: format!("Detailed information about {topic} for slide {ordinal}"),
      image_prompt: format!("Visual image about {topic} for slide {ordinal}"),
    }
  }
}

/// Image cell of a slide record.
#[derive(Debug, Clone)]
pub enum SlideImage {
  Generated(Arc<DynamicImage>),
  /// Shared flat placeholder
  Placeholder(Arc<DynamicImage>),
}

impl SlideImage {
  pub fn generated(image: DynamicImage) -> Self {
    SlideImage::Generated(Arc::new(image))
  }

  /// The process-wide placeholder; every fallback shares one allocation.
  pub fn placeholder() -> Self {
    static PLACEHOLDER: OnceLock<Arc<DynamicImage>> = OnceLock::new();
    let image = PLACEHOLDER.get_or_init(|| {
      Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        PLACEHOLDER_WIDTH,
        PLACEHOLDER_HEIGHT,
        Rgb(PLACEHOLDER_RGB),
      )))
    });
    SlideImage::Placeholder(Arc::clone(image))
  }

  pub fn is_placeholder(&self) -> bool {
    matches!(self, SlideImage::Placeholder(_))
  }

  pub fn image(&self) -> &DynamicImage {
    match self {
      SlideImage::Generated(image) | SlideImage::Placeholder(image) => image,
    }
  }
}

/// Joined output for one slide.
#[derive(Debug, Clone)]
pub struct SlideRecord {
  pub index: usize,
  pub title: String,
  pub content: String,
  pub image: SlideImage,
}

/// A field that fell back instead of being generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFallback {
  pub index: usize,
  pub field: SlideField,
  pub cause: ErrorKind,
}
