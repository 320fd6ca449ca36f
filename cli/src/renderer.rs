// Directory Renderer
// Writes a deck as deck.json plus one PNG per slide

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deckforge_core::pipeline::{
    DocumentHandle, DocumentRenderer, DocumentTarget, FieldValue, LayoutChoice, RenderError,
    SlideImage, SlideRecord,
};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "deck.json";

/// On-disk description of a rendered deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckManifest {
    pub id: String,
    pub theme: String,
    pub slides: Vec<ManifestSlide>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSlide {
    pub index: usize,
    pub layout: usize,
    pub title: String,
    pub content: String,
    /// PNG file name relative to the deck directory
    pub image: String,
    pub placeholder: bool,
}

/// Renders each document into `<root>/<slug>/`.
///
/// A deck is assembled in a hidden sibling directory and only moved to
/// `<root>/<slug>/` once `deck.json` is written, so a failed render leaves
/// any earlier deck of the same name untouched.
pub struct DirectoryRenderer {
    root: PathBuf,
}

impl DirectoryRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Handle for a deck directory written by an earlier run
    pub fn handle_for(dir: impl AsRef<Path>) -> DocumentHandle {
        let dir = dir.as_ref();
        let id = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        DocumentHandle {
            id,
            location: dir.display().to_string(),
        }
    }

    pub async fn read_manifest(handle: &DocumentHandle) -> Result<DeckManifest, RenderError> {
        let path = Path::new(&handle.location).join(MANIFEST_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderError::NotFound(handle.id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_manifest(dir: &Path, manifest: &DeckManifest) -> Result<(), RenderError> {
        let json = serde_json::to_string_pretty(manifest)?;
        tokio::fs::write(dir.join(MANIFEST_FILE), json).await?;
        Ok(())
    }

    fn sibling(&self, slug: &str, suffix: &str) -> PathBuf {
        self.root.join(format!(".{slug}.{}.{suffix}", Uuid::new_v4()))
    }
}

async fn write_deck(
    dir: &Path,
    id: String,
    records: &[SlideRecord],
    layout: &LayoutChoice,
) -> Result<(), RenderError> {
    let mut slides = Vec::with_capacity(records.len());
    for record in records {
        let file_name = image_file_name(record.index);
        write_image(dir.join(&file_name), &record.image).await?;
        slides.push(ManifestSlide {
            index: record.index,
            layout: layout.layout_for(record.index),
            title: record.title.clone(),
            content: record.content.clone(),
            image: file_name,
            placeholder: record.image.is_placeholder(),
        });
    }

    let manifest = DeckManifest {
        id,
        theme: layout.theme.clone(),
        slides,
    };
    DirectoryRenderer::write_manifest(dir, &manifest).await
}

async fn discard(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!(dir = %dir.display(), "failed to remove directory: {e}");
    }
}

fn image_file_name(index: usize) -> String {
    format!("slide-{:02}.png", index + 1)
}

/// Lowercase, dash-separated directory name for a document
pub fn create_slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c.is_whitespace() || c == '-' || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(50)
        .collect();

    if slug.is_empty() {
        "deck".to_string()
    } else {
        slug
    }
}

async fn write_image(path: PathBuf, image: &SlideImage) -> Result<(), RenderError> {
    let image = image.clone();
    tokio::task::spawn_blocking(move || image.image().save_with_format(&path, ImageFormat::Png))
        .await
        .map_err(|e| RenderError::Rejected(format!("image writer failed: {e}")))??;
    Ok(())
}

#[async_trait]
impl DocumentRenderer for DirectoryRenderer {
    async fn render(
        &self,
        target: &DocumentTarget,
        records: &[SlideRecord],
        layout: &LayoutChoice,
    ) -> Result<DocumentHandle, RenderError> {
        let slug = create_slug(&target.name);
        let dir = self.root.join(&slug);
        let handle = Self::handle_for(&dir);

        tokio::fs::create_dir_all(&self.root).await?;
        let staging = self.sibling(&slug, "partial");
        tokio::fs::create_dir(&staging).await?;
        if let Err(e) = write_deck(&staging, handle.id.clone(), records, layout).await {
            discard(&staging).await;
            return Err(e);
        }

        let exists = match tokio::fs::try_exists(&dir).await {
            Ok(exists) => exists,
            Err(e) => {
                discard(&staging).await;
                return Err(e.into());
            }
        };
        let previous = if exists {
            let old = self.sibling(&slug, "old");
            if let Err(e) = tokio::fs::rename(&dir, &old).await {
                discard(&staging).await;
                return Err(e.into());
            }
            Some(old)
        } else {
            None
        };

        if let Err(e) = tokio::fs::rename(&staging, &dir).await {
            if let Some(old) = &previous
                && let Err(restore) = tokio::fs::rename(old, &dir).await
            {
                warn!(dir = %dir.display(), "failed to restore previous deck: {restore}");
            }
            discard(&staging).await;
            return Err(e.into());
        }
        if let Some(old) = previous {
            discard(&old).await;
        }

        debug!(dir = %dir.display(), slides = records.len(), "deck written");
        Ok(handle)
    }

    async fn patch(
        &self,
        handle: &DocumentHandle,
        index: usize,
        value: &FieldValue,
    ) -> Result<(), RenderError> {
        let dir = PathBuf::from(&handle.location);
        let mut manifest = Self::read_manifest(handle).await?;
        let len = manifest.slides.len();
        let slide = manifest
            .slides
            .get_mut(index)
            .ok_or(RenderError::SlideOutOfRange { index, len })?;

        match value {
            FieldValue::Title(title) => slide.title = title.clone(),
            FieldValue::Content(content) => slide.content = content.clone(),
            FieldValue::Image(image) => {
                write_image(dir.join(&slide.image), image).await?;
                slide.placeholder = image.is_placeholder();
            }
        }
        Self::write_manifest(&dir, &manifest).await
    }

    async fn slide_count(&self, handle: &DocumentHandle) -> Result<usize, RenderError> {
        Ok(Self::read_manifest(handle).await?.slides.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    fn record(index: usize) -> SlideRecord {
        SlideRecord {
            index,
            title: format!("Title {index}"),
            content: format!("Content {index}"),
            image: SlideImage::placeholder(),
        }
    }

    fn layout() -> LayoutChoice {
        LayoutChoice {
            theme: "default".to_string(),
            layouts: vec![0, 4, 2],
        }
    }

    #[test]
    fn slug_keeps_words() {
        assert_eq!(create_slug("History of Rome!"), "history-of-rome");
        assert_eq!(create_slug("???"), "deck");
    }

    #[tokio::test]
    async fn render_writes_manifest_and_images() {
        let root = tempfile::tempdir().expect("tempdir");
        let renderer = DirectoryRenderer::new(root.path());
        let records: Vec<SlideRecord> = (0..3).map(record).collect();

        let handle = renderer
            .render(&DocumentTarget::new("History of Rome"), &records, &layout())
            .await
            .expect("render");

        assert_eq!(handle.id, "history-of-rome");
        let manifest = DirectoryRenderer::read_manifest(&handle)
            .await
            .expect("manifest");
        let layouts: Vec<usize> = manifest.slides.iter().map(|s| s.layout).collect();
        assert_eq!(layouts, vec![0, 4, 2]);
        assert!(manifest.slides.iter().all(|s| s.placeholder));
        for slide in &manifest.slides {
            let path = Path::new(&handle.location).join(&slide.image);
            let decoded = image::open(&path).expect("png written");
            assert_eq!((decoded.width(), decoded.height()), (800, 600));
        }
        assert_eq!(renderer.slide_count(&handle).await.expect("count"), 3);
    }

    #[tokio::test]
    async fn patch_changes_one_field_only() {
        let root = tempfile::tempdir().expect("tempdir");
        let renderer = DirectoryRenderer::new(root.path());
        let records: Vec<SlideRecord> = (0..3).map(record).collect();
        let handle = renderer
            .render(&DocumentTarget::new("deck"), &records, &layout())
            .await
            .expect("render");
        let before = DirectoryRenderer::read_manifest(&handle)
            .await
            .expect("manifest");

        let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])));
        renderer
            .patch(&handle, 1, &FieldValue::Image(SlideImage::generated(red)))
            .await
            .expect("patch");

        let after = DirectoryRenderer::read_manifest(&handle)
            .await
            .expect("manifest");
        assert_eq!(before.slides[0], after.slides[0]);
        assert_eq!(before.slides[2], after.slides[2]);
        assert_eq!(before.slides[1].title, after.slides[1].title);
        assert_eq!(before.slides[1].content, after.slides[1].content);
        assert_eq!(before.slides[1].layout, after.slides[1].layout);
        assert!(!after.slides[1].placeholder);

        let patched = image::open(Path::new(&handle.location).join(&after.slides[1].image))
            .expect("patched png");
        assert_eq!(patched.width(), 2);
    }

    #[tokio::test]
    async fn failed_render_keeps_previous_deck_intact() {
        let root = tempfile::tempdir().expect("tempdir");
        let renderer = DirectoryRenderer::new(root.path());
        let records: Vec<SlideRecord> = (0..3).map(record).collect();
        let handle = renderer
            .render(&DocumentTarget::new("deck"), &records, &layout())
            .await
            .expect("first render");
        let before = DirectoryRenderer::read_manifest(&handle)
            .await
            .expect("manifest");

        // A zero-sized image cannot be encoded as PNG, so the third write fails
        let red = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])));
        let mut second: Vec<SlideRecord> = (0..3).map(record).collect();
        second[0].title = "Replaced".to_string();
        second[0].image = SlideImage::generated(red);
        second[2].image = SlideImage::generated(DynamicImage::new_rgb8(0, 0));

        let result = renderer
            .render(&DocumentTarget::new("deck"), &second, &layout())
            .await;
        assert!(result.is_err());

        let after = DirectoryRenderer::read_manifest(&handle)
            .await
            .expect("manifest");
        assert_eq!(before, after);
        let first = image::open(Path::new(&handle.location).join(&after.slides[0].image))
            .expect("png");
        assert_eq!((first.width(), first.height()), (800, 600));

        let entries: Vec<String> = std::fs::read_dir(root.path())
            .expect("read root")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["deck".to_string()]);
    }

    #[tokio::test]
    async fn rerender_replaces_previous_deck() {
        let root = tempfile::tempdir().expect("tempdir");
        let renderer = DirectoryRenderer::new(root.path());
        let target = DocumentTarget::new("deck");
        renderer
            .render(&target, &(0..3).map(record).collect::<Vec<_>>(), &layout())
            .await
            .expect("first render");

        let handle = renderer
            .render(&target, &[record(0)], &layout())
            .await
            .expect("second render");

        assert_eq!(renderer.slide_count(&handle).await.expect("count"), 1);
        assert!(!Path::new(&handle.location).join("slide-02.png").exists());
    }

    #[tokio::test]
    async fn missing_deck_and_bad_index_are_errors() {
        let root = tempfile::tempdir().expect("tempdir");
        let renderer = DirectoryRenderer::new(root.path());

        let missing = DirectoryRenderer::handle_for(root.path().join("nothing"));
        assert!(matches!(
            renderer.slide_count(&missing).await,
            Err(RenderError::NotFound(_))
        ));

        let handle = renderer
            .render(&DocumentTarget::new("deck"), &[record(0)], &layout())
            .await
            .expect("render");
        let err = renderer
            .patch(&handle, 5, &FieldValue::Title("x".to_string()))
            .await
            .expect_err("out of range");
        assert!(matches!(err, RenderError::SlideOutOfRange { index: 5, len: 1 }));
    }
}
