//! Generation coordinator
//!
//! Drives one job through `Idle -> Probing -> Planning -> Generating ->
//! Assembled -> HandedOff`. Every slide field is generated by its own task on
//! a bounded pool; results are written into a pre-sized slot array by index,
//! so completion order never affects the assembled deck.

use std::sync::Arc;
use std::time::Duration;

use deckforge_config::{Config, GenerationConfig};
use deckforge_protocol::{ErrorKind, Modality, PipelineState, ProgressEvent, SlideField};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::{LayoutChoice, LocaleContext, ThemeContext};
use super::error::{PipelineError, Result};
use super::events::{EventSink, TracingSink};
use super::generators::{ContentSynthesizer, FieldOutcome, ImageSynthesizer, content, title};
use super::job::{FieldFallback, GenerationJob, ModelSelection, SlideImage, SlideRecord, SlideSpec};
use super::planner::StructurePlanner;
use super::prober::{Availability, AvailabilityProber};
use super::renderer::{DocumentHandle, DocumentRenderer};
use crate::model::{ModelRegistryRef, ResolvedModel};
use crate::translate::{NoopTranslator, Translator};

/// Tunables read from `[generation]` and `[models]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
  pub generation: GenerationConfig,
  /// Substituted when the selected text model is unavailable
  pub default_text_model: Option<String>,
  /// Substituted when the selected image model is unavailable
  pub default_image_model: Option<String>,
}

impl Default for CoordinatorSettings {
  fn default() -> Self {
    Self::from(&Config::default())
  }
}

impl From<&Config> for CoordinatorSettings {
  fn from(config: &Config) -> Self {
    Self {
      generation: config.generation.clone(),
      default_text_model: config.models.fallback_text.clone(),
      default_image_model: config.models.fallback_image.clone(),
    }
  }
}

impl CoordinatorSettings {
  fn field_timeout(&self) -> Duration {
    Duration::from_secs(self.generation.field_timeout_secs.max(1))
  }

  fn probe_timeout(&self) -> Duration {
    Duration::from_secs(self.generation.probe_timeout_secs.max(1))
  }

  fn default_for(&self, modality: Modality) -> Option<&str> {
    match modality {
      Modality::Text => self.default_text_model.as_deref(),
      Modality::Image => self.default_image_model.as_deref(),
    }
  }
}

/// An unavailable selection replaced before generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSubstitution {
  pub modality: Modality,
  pub from: String,
  pub to: String,
  pub cause: ErrorKind,
}

/// What a finished job looked like.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
  pub job_id: Uuid,
  pub document: DocumentHandle,
  /// Models actually used
  pub models: ModelSelection,
  pub substitutions: Vec<ModelSubstitution>,
  pub planning_degraded: bool,
  pub synthesized_specs: usize,
  pub fallbacks: Vec<FieldFallback>,
  pub layout: LayoutChoice,
  pub num_slides: usize,
}

/// Output of one field task.
#[derive(Debug)]
enum GeneratedField {
  Title(FieldOutcome<String>),
  Content(FieldOutcome<String>),
  Image(FieldOutcome<SlideImage>),
}

impl GeneratedField {
  /// Last-resort value for a task that timed out or never joined.
  fn join_fallback(field: SlideField, index: usize, topic: &str, cause: ErrorKind) -> Self {
    match field {
      SlideField::Title => GeneratedField::Title(FieldOutcome::Fallback {
        value: title::fallback(index),
        cause,
      }),
      SlideField::Content => GeneratedField::Content(FieldOutcome::Fallback {
        value: content::join_fallback(topic, index),
        cause,
      }),
      SlideField::Image => GeneratedField::Image(FieldOutcome::Fallback {
        value: SlideImage::placeholder(),
        cause,
      }),
    }
  }

  fn field(&self) -> SlideField {
    match self {
      GeneratedField::Title(_) => SlideField::Title,
      GeneratedField::Content(_) => SlideField::Content,
      GeneratedField::Image(_) => SlideField::Image,
    }
  }

  fn fallback_cause(&self) -> Option<ErrorKind> {
    match self {
      GeneratedField::Title(outcome) | GeneratedField::Content(outcome) => outcome.fallback_cause(),
      GeneratedField::Image(outcome) => outcome.fallback_cause(),
    }
  }
}

/// One slot per slide; each cell has exactly one writer.
#[derive(Default)]
struct SlideSlot {
  title: Option<String>,
  content: Option<String>,
  image: Option<SlideImage>,
}

impl SlideSlot {
  fn write(&mut self, generated: GeneratedField) {
    match generated {
      GeneratedField::Title(outcome) => self.title = Some(outcome.into_value()),
      GeneratedField::Content(outcome) => self.content = Some(outcome.into_value()),
      GeneratedField::Image(outcome) => self.image = Some(outcome.into_value()),
    }
  }

  fn missing(&self) -> Vec<SlideField> {
    let mut missing = Vec::new();
    if self.title.is_none() {
      missing.push(SlideField::Title);
    }
    if self.content.is_none() {
      missing.push(SlideField::Content);
    }
    if self.image.is_none() {
      missing.push(SlideField::Image);
    }
    missing
  }
}

/// Resolved generators shared by every field task of one job.
struct FieldGenerators {
  topic: Arc<str>,
  content: ContentSynthesizer,
  image: ImageSynthesizer,
}

impl FieldGenerators {
  async fn generate(&self, spec: &SlideSpec, field: SlideField) -> GeneratedField {
    match field {
      SlideField::Title => {
        let refined = title::refine(&spec.title_seed);
        if refined.trim().is_empty() {
          GeneratedField::Title(FieldOutcome::Fallback {
            value: title::fallback(spec.index),
            cause: ErrorKind::FieldFallbackUsed,
          })
        } else {
          GeneratedField::Title(FieldOutcome::Generated(refined))
        }
      }
      SlideField::Content => GeneratedField::Content(
        self
          .content
          .synthesize(&spec.content_prompt, &self.topic)
          .await,
      ),
      SlideField::Image => GeneratedField::Image(self.image.synthesize(&spec.image_prompt).await),
    }
  }
}

pub struct GenerationCoordinator {
  pub(super) registry: ModelRegistryRef,
  pub(super) renderer: Arc<dyn DocumentRenderer>,
  pub(super) translator: Arc<dyn Translator>,
  pub(super) events: Arc<dyn EventSink>,
  pub(super) locale: LocaleContext,
  theme: ThemeContext,
  settings: CoordinatorSettings,
  state: watch::Sender<PipelineState>,
}

impl GenerationCoordinator {
  pub fn new(registry: ModelRegistryRef, renderer: Arc<dyn DocumentRenderer>) -> Self {
    let (state, _) = watch::channel(PipelineState::Idle);
    Self {
      registry,
      renderer,
      translator: Arc::new(NoopTranslator),
      events: Arc::new(TracingSink),
      locale: LocaleContext::default(),
      theme: ThemeContext::default(),
      settings: CoordinatorSettings::default(),
      state,
    }
  }

  /// Coordinator configured from a loaded [Config].
  pub fn from_config(
    config: &Config,
    registry: ModelRegistryRef,
    renderer: Arc<dyn DocumentRenderer>,
  ) -> Self {
    Self::new(registry, renderer)
      .with_locale(LocaleContext::from(&config.locale))
      .with_theme(ThemeContext::from(&config.theme))
      .with_settings(CoordinatorSettings::from(config))
  }

  pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
    self.translator = translator;
    self
  }

  pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
    self.events = events;
    self
  }

  pub fn with_locale(mut self, locale: LocaleContext) -> Self {
    self.locale = locale;
    self
  }

  pub fn with_theme(mut self, theme: ThemeContext) -> Self {
    self.theme = theme;
    self
  }

  pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
    self.settings = settings;
    self
  }

  /// State of the most recent job.
  pub fn state(&self) -> PipelineState {
    *self.state.borrow()
  }

  pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
    self.state.subscribe()
  }

  fn transition(&self, next: PipelineState) {
    self.state.send_modify(|state| {
      if state.can_transition_to(next) {
        debug!(from = ?state, to = ?next, "pipeline transition");
        *state = next;
      } else {
        warn!(from = ?state, to = ?next, "ignoring illegal pipeline transition");
      }
    });
  }

  pub(super) async fn emit(&self, event: ProgressEvent) {
    self.events.emit(event).await;
  }

  /// Run one job to completion. Only whole-job failures and cancellation are
  /// returned as errors; per-field failures show up in the report.
  pub async fn generate(
    &self,
    job: GenerationJob,
    cancel: CancellationToken,
  ) -> Result<GenerationReport> {
    self.state.send_replace(PipelineState::Idle);
    info!(job = %job.id, topic = %job.topic, slides = job.slide_count, "generation started");

    let result = self.run(job, &cancel).await;
    match &result {
      Ok(report) => info!(document = %report.document.id, "generation finished"),
      Err(PipelineError::Cancelled) => {
        self.transition(PipelineState::Cancelled);
        self.emit(ProgressEvent::PipelineCancelled).await;
      }
      Err(err) => {
        self.transition(PipelineState::Failed);
        self
          .emit(ProgressEvent::PipelineFailed {
            reason: err.to_string(),
          })
          .await;
      }
    }
    result
  }

  async fn run(&self, job: GenerationJob, cancel: &CancellationToken) -> Result<GenerationReport> {
    if job.slide_count == 0 {
      return Err(PipelineError::EmptyDeck);
    }
    self.check_reference(&job, &job.models.image).await?;

    // Probing
    self.transition(PipelineState::Probing);
    let prober = AvailabilityProber::new(self.registry.clone(), self.settings.probe_timeout());
    let probe = tokio::select! {
      _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
      probe = prober.probe_selection(&job.models) => probe,
    };

    let mut substitutions = Vec::new();
    let text_model = self
      .settle(Modality::Text, &job.models.text, probe.text, &mut substitutions)
      .await?;
    let image_model = self
      .settle(Modality::Image, &job.models.image, probe.image, &mut substitutions)
      .await?;
    let models = ModelSelection::new(text_model.entry.id.clone(), image_model.entry.id.clone());
    if models.image != job.models.image {
      self.check_reference(&job, &models.image).await?;
    }

    // Planning
    self.transition(PipelineState::Planning);
    let planner = StructurePlanner::new(self.locale.clone())
      .with_dedupe(self.settings.generation.dedupe_specs);
    let plan = tokio::select! {
      _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
      plan = planner.plan(&job.topic, job.slide_count, &text_model) => plan,
    };
    let planning_degraded = plan.is_degraded();
    let synthesized_specs = plan.synthesized;
    self
      .emit(ProgressEvent::PlanReady {
        num_slides: plan.len(),
        degraded: planning_degraded,
      })
      .await;

    // Generating
    self.transition(PipelineState::Generating);
    let generators = Arc::new(FieldGenerators {
      topic: Arc::from(job.topic.as_str()),
      content: ContentSynthesizer::new(text_model, self.locale.clone()),
      image: ImageSynthesizer::new(
        image_model,
        self.translator.clone(),
        self.locale.clone(),
        job.reference_image.clone(),
      ),
    });
    let (records, fallbacks) = self.fan_out(plan.specs, generators, cancel).await?;

    // Assembled
    self.transition(PipelineState::Assembled);
    let num_slides = records.len();
    self.emit(ProgressEvent::PipelineAssembled { num_slides }).await;

    if cancel.is_cancelled() {
      return Err(PipelineError::Cancelled);
    }
    let layout = self.theme.assign_layouts(num_slides);
    let document = self.renderer.render(&job.target, &records, &layout).await?;

    self.transition(PipelineState::HandedOff);
    self
      .emit(ProgressEvent::PipelineHandedOff {
        document_id: document.id.clone(),
      })
      .await;

    Ok(GenerationReport {
      job_id: job.id,
      document,
      models,
      substitutions,
      planning_degraded,
      synthesized_specs,
      fallbacks,
      layout,
      num_slides,
    })
  }

  /// A face-conditioned image model without a reference image is a caller
  /// error, raised before any work is scheduled.
  async fn check_reference(&self, job: &GenerationJob, image_model: &str) -> Result<()> {
    let needs_reference = self
      .registry
      .get_model(image_model)
      .await
      .is_some_and(|entry| entry.requires_reference_image());
    if needs_reference && job.reference_image.is_none() {
      return Err(PipelineError::ReferenceImageRequired(image_model.to_string()));
    }
    Ok(())
  }

  /// Keep an available selection or swap in the configured default.
  async fn settle(
    &self,
    modality: Modality,
    selected: &str,
    availability: Availability,
    substitutions: &mut Vec<ModelSubstitution>,
  ) -> Result<ResolvedModel> {
    let available = availability.is_available();
    self
      .emit(ProgressEvent::ProbeResult {
        modality,
        model_id: selected.to_string(),
        available,
      })
      .await;

    let no_model = |default: Option<&str>| PipelineError::NoModelAvailable {
      modality,
      selected: selected.to_string(),
      default: default.map(str::to_string),
    };

    let chosen = match availability {
      Availability::Available => selected.to_string(),
      Availability::Unavailable { kind, detail } => {
        let default = self.settings.default_for(modality);
        let Some(default) = default else {
          return Err(no_model(None));
        };
        if default != selected {
          warn!(%modality, from = %selected, to = %default, reason = %detail, "substituting model");
          self
            .emit(ProgressEvent::ModelSubstituted {
              modality,
              from: selected.to_string(),
              to: default.to_string(),
            })
            .await;
          substitutions.push(ModelSubstitution {
            modality,
            from: selected.to_string(),
            to: default.to_string(),
            cause: kind,
          });
        }
        default.to_string()
      }
    };

    self
      .registry
      .resolve(&chosen, modality)
      .await
      .map_err(|_| no_model(self.settings.default_for(modality)))
  }

  /// Submit all `3 x N` field tasks at once and join them into records.
  async fn fan_out(
    &self,
    specs: Vec<SlideSpec>,
    generators: Arc<FieldGenerators>,
    cancel: &CancellationToken,
  ) -> Result<(Vec<SlideRecord>, Vec<FieldFallback>)> {
    let num_slides = specs.len();
    let workers = self.settings.generation.worker_count(num_slides);
    let semaphore = Arc::new(Semaphore::new(workers));
    let field_timeout = self.settings.field_timeout();
    debug!(num_slides, workers, "fanning out field generation");

    let mut slots: Vec<SlideSlot> = (0..num_slides).map(|_| SlideSlot::default()).collect();
    let mut fallbacks = Vec::new();
    let mut tasks = JoinSet::new();

    for spec in specs {
      let spec = Arc::new(spec);
      for field in SlideField::ALL {
        let spec = Arc::clone(&spec);
        let generators = Arc::clone(&generators);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
          let index = spec.index;
          let Ok(_permit) = semaphore.acquire_owned().await else {
            let generated =
              GeneratedField::join_fallback(field, index, &generators.topic, ErrorKind::Cancelled);
            return (index, generated);
          };
          let generated =
            match tokio::time::timeout(field_timeout, generators.generate(&spec, field)).await {
              Ok(generated) => generated,
              Err(_) => {
                warn!(slide = index, %field, "field generation timed out");
                GeneratedField::join_fallback(
                  field,
                  index,
                  &generators.topic,
                  ErrorKind::ProviderTransientError,
                )
              }
            };
          (index, generated)
        });
      }
    }

    loop {
      let joined = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          tasks.abort_all();
          info!("generation cancelled, abandoning in-flight calls");
          return Err(PipelineError::Cancelled);
        }
        joined = tasks.join_next() => joined,
      };

      match joined {
        None => break,
        Some(Ok((index, generated))) => {
          let field = generated.field();
          let cause = generated.fallback_cause();
          if let Some(cause) = cause {
            fallbacks.push(FieldFallback {
              index,
              field,
              cause,
            });
          }
          if let Some(slot) = slots.get_mut(index) {
            slot.write(generated);
          }
          self
            .emit(ProgressEvent::SlideFieldDone {
              index,
              field,
              fallback: cause,
            })
            .await;
        }
        Some(Err(err)) => {
          if err.is_cancelled() {
            return Err(PipelineError::Cancelled);
          }
          warn!(error = %err, "field task panicked");
        }
      }
    }

    // Cells whose task died keep no value; fill them now.
    let mut records = Vec::with_capacity(num_slides);
    for (index, mut slot) in slots.into_iter().enumerate() {
      for field in slot.missing() {
        let cause = ErrorKind::FieldFallbackUsed;
        slot.write(GeneratedField::join_fallback(
          field,
          index,
          &generators.topic,
          cause,
        ));
        fallbacks.push(FieldFallback {
          index,
          field,
          cause,
        });
        self
          .emit(ProgressEvent::SlideFieldDone {
            index,
            field,
            fallback: Some(cause),
          })
          .await;
      }
      records.push(SlideRecord {
        index,
        title: slot.title.unwrap_or_else(|| title::fallback(index)),
        content: slot
          .content
          .unwrap_or_else(|| content::join_fallback(&generators.topic, index)),
        image: slot.image.unwrap_or_else(SlideImage::placeholder),
      });
    }

    fallbacks.sort_by_key(|fallback| (fallback.index, fallback.field.as_str()));
    Ok((records, fallbacks))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn join_fallbacks_match_field() {
    let title = GeneratedField::join_fallback(SlideField::Title, 1, "Rome", ErrorKind::FieldFallbackUsed);
    assert!(matches!(&title, GeneratedField::Title(outcome) if outcome.value() == "Slide 2"));

    let content =
      GeneratedField::join_fallback(SlideField::Content, 0, "Rome", ErrorKind::ProviderTransientError);
    assert_eq!(content.field(), SlideField::Content);
    assert_eq!(content.fallback_cause(), Some(ErrorKind::ProviderTransientError));

    let image = GeneratedField::join_fallback(SlideField::Image, 0, "Rome", ErrorKind::Cancelled);
    assert!(matches!(&image, GeneratedField::Image(outcome) if outcome.value().is_placeholder()));
  }

  #[test]
  fn slot_reports_missing_cells() {
    let mut slot = SlideSlot::default();
    slot.write(GeneratedField::Title(FieldOutcome::Generated("T".to_string())));
    assert_eq!(slot.missing(), vec![SlideField::Content, SlideField::Image]);
  }

  #[test]
  fn settings_follow_config() {
    let mut config = Config::default();
    config.generation.field_timeout_secs = 0;
    config.models.fallback_image = None;

    let settings = CoordinatorSettings::from(&config);
    assert_eq!(settings.field_timeout(), Duration::from_secs(1));
    assert_eq!(settings.default_for(Modality::Image), None);
    assert_eq!(settings.default_for(Modality::Text), Some("llama-3.1-405b"));
  }
}
