// Pipeline integration tests
// Scripted adapters stand in for the vendors; the in-memory renderer stands in
// for the document backend.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use deckforge_core::model::catalog::TEXT_PROBE_PROMPT;
use deckforge_core::model::{
  ImageSource, InvokeOutput, InvokeRequest, ModelEntry, ModelRegistry, ProviderAdapter,
  ProviderError, Result as ProviderResult,
};
use deckforge_core::pipeline::planner::PLANNER_SYSTEM_PROMPT;
use deckforge_core::pipeline::{
  ChannelSink, CoordinatorSettings, FieldValue, GenerationCoordinator, GenerationJob,
  InMemoryRenderer, ModelSelection, PipelineError, RegenerateInput,
};
use deckforge_protocol::{ErrorKind, Modality, PipelineState, ProgressEvent, SlideField};

const TOPIC: &str = "History of Rome";

#[derive(Debug, Clone, PartialEq)]
struct Call {
  model: String,
  prompt: String,
}

/// How a scripted adapter answers generation calls. Probes always succeed
/// unless `down` is set.
#[derive(Default)]
struct Script {
  /// Every call fails, probes included
  down: bool,
  /// Generation calls fail, probes succeed
  fail_generation: bool,
  /// Planner reply
  plan: String,
  /// Image prompts containing this marker fail
  image_failure_marker: Option<&'static str>,
  /// Delay applied to content and image calls
  delay: Option<Duration>,
}

struct ScriptedAdapter {
  id: &'static str,
  script: Script,
  calls: Mutex<Vec<Call>>,
}

impl ScriptedAdapter {
  fn new(id: &'static str, script: Script) -> Arc<Self> {
    Arc::new(Self {
      id,
      script,
      calls: Mutex::new(Vec::new()),
    })
  }

  fn calls(&self) -> Vec<Call> {
    self.calls.lock().expect("call log").clone()
  }

  fn upstream(message: &str) -> ProviderError {
    ProviderError::Upstream {
      status: 503,
      message: message.to_string(),
    }
  }
}

fn png_bytes() -> Vec<u8> {
  let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([200, 10, 10])));
  let mut bytes = Cursor::new(Vec::new());
  image
    .write_to(&mut bytes, ImageFormat::Png)
    .expect("encode png");
  bytes.into_inner()
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
  fn provider_id(&self) -> &'static str {
    self.id
  }

  fn provider_name(&self) -> &'static str {
    "Scripted"
  }

  fn modalities(&self) -> Vec<Modality> {
    vec![Modality::Text, Modality::Image]
  }

  async fn invoke(&self, request: InvokeRequest) -> ProviderResult<InvokeOutput> {
    self.calls.lock().expect("call log").push(Call {
      model: request.model.clone(),
      prompt: request.prompt.clone(),
    });

    if self.script.down {
      return Err(Self::upstream("service down"));
    }

    let is_probe = request.prompt == TEXT_PROBE_PROMPT
      || request.prompt.contains(deckforge_core::model::catalog::IMAGE_PROBE_PROMPT);
    if is_probe {
      return Ok(match request.modality {
        Modality::Text => InvokeOutput::Text("ok".to_string()),
        Modality::Image => InvokeOutput::Image(ImageSource::Bytes(png_bytes())),
      });
    }
    if self.script.fail_generation {
      return Err(Self::upstream("generation failed"));
    }

    let is_plan = request.params.system_prompt.as_deref() == Some(PLANNER_SYSTEM_PROMPT);
    if is_plan {
      return Ok(InvokeOutput::Text(self.script.plan.clone()));
    }

    if let Some(delay) = self.script.delay {
      tokio::time::sleep(delay).await;
    }

    match request.modality {
      Modality::Text if request.prompt.contains("a fresh angle") => {
        Ok(InvokeOutput::Text("  Regenerated body.  ".to_string()))
      }
      Modality::Text => Ok(InvokeOutput::Text("Generated body.".to_string())),
      Modality::Image => match self.script.image_failure_marker {
        Some(marker) if request.prompt.contains(marker) => Err(ProviderError::RateLimited(
          "too many images".to_string(),
        )),
        _ => Ok(InvokeOutput::Image(ImageSource::Bytes(png_bytes()))),
      },
    }
  }

  async fn fetch_image(&self, source: ImageSource) -> ProviderResult<Vec<u8>> {
    match source {
      ImageSource::Bytes(bytes) => Ok(bytes),
      ImageSource::Url(url) => Err(ProviderError::InvalidResponse(format!(
        "unexpected url {url}"
      ))),
    }
  }
}

fn plan_json(count: usize) -> String {
  (1..=count)
    .map(|i| {
      let parity = if (i - 1) % 2 == 0 { "even" } else { "odd" };
      format!(
        r#"{{"slide": {i}, "title": "Chapter {i}", "content_prompt": "Era {i}", "image_prompt": "{parity} scene {i}"}}"#
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

struct Harness {
  coordinator: GenerationCoordinator,
  renderer: Arc<InMemoryRenderer>,
}

async fn harness(
  adapters: Vec<Arc<ScriptedAdapter>>,
  models: Vec<ModelEntry>,
  settings: CoordinatorSettings,
) -> Harness {
  let registry = Arc::new(ModelRegistry::new());
  for adapter in adapters {
    registry.register_shared_adapter(adapter).await;
  }
  for model in models {
    registry.register_model(model).await;
  }
  let renderer = Arc::new(InMemoryRenderer::new());
  let coordinator =
    GenerationCoordinator::new(registry, renderer.clone()).with_settings(settings);
  Harness {
    coordinator,
    renderer,
  }
}

fn mock_models(provider: &str) -> Vec<ModelEntry> {
  vec![
    ModelEntry::text(
      &format!("{provider}-text"),
      "Text",
      provider,
      &format!("{provider}/text"),
    ),
    ModelEntry::image(
      &format!("{provider}-image"),
      "Image",
      provider,
      &format!("{provider}/image"),
    ),
  ]
}

fn selection(provider: &str) -> ModelSelection {
  ModelSelection::new(format!("{provider}-text"), format!("{provider}-image"))
}

#[tokio::test]
async fn deck_length_always_matches_request() {
  for (objects, requested) in [(0, 3), (1, 3), (2, 3), (3, 3), (7, 3), (2, 5)] {
    let adapter = ScriptedAdapter::new(
      "mock",
      Script {
        plan: plan_json(objects),
        ..Default::default()
      },
    );
    let h = harness(vec![adapter], mock_models("mock"), CoordinatorSettings::default()).await;

    let report = h
      .coordinator
      .generate(
        GenerationJob::new(TOPIC, requested, selection("mock")),
        CancellationToken::new(),
      )
      .await
      .expect("generation succeeds");

    assert_eq!(report.num_slides, requested, "{objects} objects");
    let document = h
      .renderer
      .document(&report.document)
      .await
      .expect("document rendered");
    let indices: Vec<usize> = document.records.iter().map(|r| r.index).collect();
    assert_eq!(indices, (0..requested).collect::<Vec<_>>());
    assert_eq!(document.layout.layouts.len(), requested);
    assert_eq!(h.coordinator.state(), PipelineState::HandedOff);
  }
}

#[tokio::test]
async fn short_plan_is_backfilled() {
  let adapter = ScriptedAdapter::new(
    "mock",
    Script {
      plan: plan_json(2),
      ..Default::default()
    },
  );
  let h = harness(vec![adapter], mock_models("mock"), CoordinatorSettings::default()).await;

  let report = h
    .coordinator
    .generate(
      GenerationJob::new(TOPIC, 3, selection("mock")),
      CancellationToken::new(),
    )
    .await
    .expect("generation succeeds");

  assert!(report.planning_degraded);
  assert_eq!(report.synthesized_specs, 1);
  let document = h.renderer.document(&report.document).await.expect("document");
  let titles: Vec<&str> = document.records.iter().map(|r| r.title.as_str()).collect();
  assert_eq!(
    titles,
    vec!["Chapter 1", "Chapter 2", "Slide 3 about History of Rome"]
  );
  assert!(document.records.iter().all(|r| !r.image.is_placeholder()));
  assert!(report.fallbacks.is_empty());
}

#[tokio::test]
async fn every_call_failing_still_hands_off_a_full_deck() {
  let adapter = ScriptedAdapter::new(
    "mock",
    Script {
      fail_generation: true,
      ..Default::default()
    },
  );
  let h = harness(vec![adapter], mock_models("mock"), CoordinatorSettings::default()).await;

  let report = h
    .coordinator
    .generate(
      GenerationJob::new(TOPIC, 4, selection("mock")),
      CancellationToken::new(),
    )
    .await
    .expect("fallbacks never abort the job");

  assert_eq!(report.num_slides, 4);
  assert!(report.planning_degraded);
  assert_eq!(report.synthesized_specs, 4);
  assert_eq!(report.fallbacks.len(), 8);
  assert!(
    report
      .fallbacks
      .iter()
      .all(|f| f.cause == ErrorKind::ProviderUpstreamError && f.field != SlideField::Title)
  );

  let document = h.renderer.document(&report.document).await.expect("document");
  for record in &document.records {
    assert!(record.image.is_placeholder());
    assert!(record.content.starts_with("Information about Detailed information about"));
  }
}

#[tokio::test]
async fn one_failing_field_leaves_its_siblings_alone() {
  let adapter = ScriptedAdapter::new(
    "mock",
    Script {
      plan: plan_json(4),
      image_failure_marker: Some("even scene"),
      ..Default::default()
    },
  );
  let h = harness(vec![adapter], mock_models("mock"), CoordinatorSettings::default()).await;

  let report = h
    .coordinator
    .generate(
      GenerationJob::new(TOPIC, 4, selection("mock")),
      CancellationToken::new(),
    )
    .await
    .expect("generation succeeds");

  let failed: Vec<(usize, SlideField, ErrorKind)> = report
    .fallbacks
    .iter()
    .map(|f| (f.index, f.field, f.cause))
    .collect();
  assert_eq!(
    failed,
    vec![
      (0, SlideField::Image, ErrorKind::ProviderTransientError),
      (2, SlideField::Image, ErrorKind::ProviderTransientError),
    ]
  );

  let document = h.renderer.document(&report.document).await.expect("document");
  for record in &document.records {
    assert_eq!(record.title, format!("Chapter {}", record.index + 1));
    assert_eq!(record.content, "Generated body.");
    assert_eq!(record.image.is_placeholder(), record.index % 2 == 0);
  }
}

#[tokio::test]
async fn slow_fields_time_out_into_fallbacks() {
  let adapter = ScriptedAdapter::new(
    "mock",
    Script {
      plan: plan_json(2),
      delay: Some(Duration::from_secs(60)),
      ..Default::default()
    },
  );
  let mut settings = CoordinatorSettings::default();
  settings.generation.field_timeout_secs = 1;
  let h = harness(vec![adapter], mock_models("mock"), settings).await;

  let started = std::time::Instant::now();
  let report = h
    .coordinator
    .generate(
      GenerationJob::new(TOPIC, 2, selection("mock")),
      CancellationToken::new(),
    )
    .await
    .expect("timeouts never abort the job");
  assert!(started.elapsed() < Duration::from_secs(30));

  let mut failed: Vec<(usize, SlideField, ErrorKind)> = report
    .fallbacks
    .iter()
    .map(|f| (f.index, f.field, f.cause))
    .collect();
  failed.sort_by_key(|(index, field, _)| (*index, field.to_string()));
  assert_eq!(
    failed,
    vec![
      (0, SlideField::Content, ErrorKind::ProviderTransientError),
      (0, SlideField::Image, ErrorKind::ProviderTransientError),
      (1, SlideField::Content, ErrorKind::ProviderTransientError),
      (1, SlideField::Image, ErrorKind::ProviderTransientError),
    ]
  );
  assert_eq!(h.coordinator.state(), PipelineState::HandedOff);

  let document = h.renderer.document(&report.document).await.expect("document");
  assert_eq!(document.records.len(), 2);
  for record in &document.records {
    assert_eq!(record.title, format!("Chapter {}", record.index + 1));
    assert_ne!(record.content, "Generated body.");
    assert!(record.image.is_placeholder());
  }
}

#[tokio::test]
async fn unavailable_selection_is_replaced_before_generation() {
  let down = ScriptedAdapter::new(
    "down",
    Script {
      down: true,
      ..Default::default()
    },
  );
  let healthy = ScriptedAdapter::new(
    "mock",
    Script {
      plan: plan_json(2),
      ..Default::default()
    },
  );
  let mut models = mock_models("mock");
  models.extend(mock_models("down"));
  let settings = CoordinatorSettings {
    default_text_model: Some("mock-text".to_string()),
    default_image_model: Some("mock-image".to_string()),
    ..Default::default()
  };
  let h = harness(vec![down.clone(), healthy.clone()], models, settings).await;

  let (tx_event, mut rx_event) = mpsc::channel(64);
  let coordinator = h
    .coordinator
    .with_events(Arc::new(ChannelSink::new(tx_event)));

  let report = coordinator
    .generate(
      GenerationJob::new(TOPIC, 2, ModelSelection::new("down-text", "mock-image")),
      CancellationToken::new(),
    )
    .await
    .expect("generation succeeds");

  assert_eq!(report.models, ModelSelection::new("mock-text", "mock-image"));
  assert_eq!(report.substitutions.len(), 1);
  assert_eq!(report.substitutions[0].from, "down-text");
  assert_eq!(report.substitutions[0].cause, ErrorKind::ProviderUnavailable);

  // Only the probe ever reached the unavailable model.
  let down_calls = down.calls();
  assert_eq!(down_calls.len(), 1);
  assert_eq!(down_calls[0].prompt, TEXT_PROBE_PROMPT);
  assert!(healthy.calls().iter().any(|c| c.model == "mock/text"));

  drop(coordinator);
  let mut events = Vec::new();
  while let Some(event) = rx_event.recv().await {
    events.push(event);
  }
  let substituted = events
    .iter()
    .position(|e| matches!(e, ProgressEvent::ModelSubstituted { .. }))
    .expect("substitution event");
  let first_field = events
    .iter()
    .position(|e| matches!(e, ProgressEvent::SlideFieldDone { .. }))
    .expect("field event");
  assert!(substituted < first_field);
  assert!(matches!(
    events.last(),
    Some(ProgressEvent::PipelineHandedOff { .. })
  ));
}

#[tokio::test]
async fn unavailable_selection_without_default_aborts() {
  let down = ScriptedAdapter::new(
    "down",
    Script {
      down: true,
      ..Default::default()
    },
  );
  let settings = CoordinatorSettings {
    default_text_model: None,
    default_image_model: None,
    ..Default::default()
  };
  let h = harness(vec![down], mock_models("down"), settings).await;

  let err = h
    .coordinator
    .generate(
      GenerationJob::new(TOPIC, 2, selection("down")),
      CancellationToken::new(),
    )
    .await
    .expect_err("no model available");

  assert!(matches!(
    err,
    PipelineError::NoModelAvailable {
      modality: Modality::Text,
      ..
    }
  ));
  assert_eq!(err.kind(), ErrorKind::PipelineAborted);
  assert!(h.renderer.is_empty().await);
  assert_eq!(h.coordinator.state(), PipelineState::Failed);
}

#[tokio::test]
async fn face_model_without_reference_fails_before_any_call() {
  let adapter = ScriptedAdapter::new("mock", Script::default());
  let mut models = mock_models("mock");
  models.push(ModelEntry::image("mock-face", "Face", "mock", "mock/face").with_reference_image("input_image"));
  let h = harness(vec![adapter.clone()], models, CoordinatorSettings::default()).await;

  let err = h
    .coordinator
    .generate(
      GenerationJob::new(TOPIC, 3, ModelSelection::new("mock-text", "mock-face")),
      CancellationToken::new(),
    )
    .await
    .expect_err("reference required");

  assert!(matches!(err, PipelineError::ReferenceImageRequired(ref id) if id == "mock-face"));
  assert!(adapter.calls().is_empty());
  assert!(h.renderer.is_empty().await);
}

#[tokio::test]
async fn cancellation_hands_off_nothing() {
  let adapter = ScriptedAdapter::new(
    "mock",
    Script {
      plan: plan_json(3),
      delay: Some(Duration::from_secs(30)),
      ..Default::default()
    },
  );
  let h = harness(vec![adapter], mock_models("mock"), CoordinatorSettings::default()).await;
  let mut state = h.coordinator.subscribe_state();

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    while state.changed().await.is_ok() {
      if *state.borrow() == PipelineState::Generating {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
        break;
      }
    }
  });

  let err = tokio::time::timeout(
    Duration::from_secs(10),
    h.coordinator
      .generate(GenerationJob::new(TOPIC, 3, selection("mock")), cancel),
  )
  .await
  .expect("cancellation is prompt")
  .expect_err("job cancelled");

  assert!(matches!(err, PipelineError::Cancelled));
  assert_eq!(err.kind(), ErrorKind::Cancelled);
  assert!(h.renderer.is_empty().await);
  assert_eq!(h.coordinator.state(), PipelineState::Cancelled);
}

#[tokio::test]
async fn regenerate_patches_exactly_one_field() {
  let adapter = ScriptedAdapter::new(
    "mock",
    Script {
      plan: plan_json(3),
      ..Default::default()
    },
  );
  let h = harness(vec![adapter.clone()], mock_models("mock"), CoordinatorSettings::default()).await;

  let report = h
    .coordinator
    .generate(
      GenerationJob::new(TOPIC, 3, selection("mock")),
      CancellationToken::new(),
    )
    .await
    .expect("generation succeeds");
  let before = h.renderer.document(&report.document).await.expect("document");
  let calls_before = adapter.calls().len();

  let value = h
    .coordinator
    .regenerate_field(
      &report.document,
      1,
      SlideField::Content,
      RegenerateInput::Content {
        prompt: "Era 2 from a fresh angle".to_string(),
        topic: TOPIC.to_string(),
      },
      &report.models,
      None,
    )
    .await
    .expect("regenerate succeeds");
  assert!(matches!(value, FieldValue::Content(ref text) if text == "Regenerated body."));
  assert_eq!(adapter.calls().len(), calls_before + 1);

  let after = h.renderer.document(&report.document).await.expect("document");
  for (old, new) in before.records.iter().zip(&after.records) {
    assert_eq!(old.title, new.title);
    assert_eq!(old.image.image(), new.image.image());
    if old.index == 1 {
      assert_eq!(new.content, "Regenerated body.");
    } else {
      assert_eq!(old.content, new.content);
    }
  }
  assert_eq!(before.layout, after.layout);
}

#[tokio::test]
async fn regenerate_rejects_bad_requests_without_patching() {
  let adapter = ScriptedAdapter::new(
    "mock",
    Script {
      plan: plan_json(2),
      image_failure_marker: Some("broken"),
      ..Default::default()
    },
  );
  let h = harness(vec![adapter], mock_models("mock"), CoordinatorSettings::default()).await;
  let report = h
    .coordinator
    .generate(
      GenerationJob::new(TOPIC, 2, selection("mock")),
      CancellationToken::new(),
    )
    .await
    .expect("generation succeeds");
  let before = h.renderer.document(&report.document).await.expect("document");

  let out_of_range = h
    .coordinator
    .regenerate_field(
      &report.document,
      2,
      SlideField::Title,
      RegenerateInput::Title("New".to_string()),
      &report.models,
      None,
    )
    .await
    .expect_err("index out of range");
  assert!(matches!(
    out_of_range,
    PipelineError::SlideOutOfRange { index: 2, len: 2 }
  ));

  let mismatched = h
    .coordinator
    .regenerate_field(
      &report.document,
      0,
      SlideField::Content,
      RegenerateInput::Title("New".to_string()),
      &report.models,
      None,
    )
    .await
    .expect_err("field and input disagree");
  assert!(matches!(
    mismatched,
    PipelineError::InvalidRegenerateInput {
      field: SlideField::Content,
      ..
    }
  ));

  let fell_back = h
    .coordinator
    .regenerate_field(
      &report.document,
      0,
      SlideField::Image,
      RegenerateInput::ImagePrompt("broken statue".to_string()),
      &report.models,
      None,
    )
    .await
    .expect_err("fallback is not patched");
  assert!(matches!(
    fell_back,
    PipelineError::RegenerateFellBack {
      field: SlideField::Image,
      cause: ErrorKind::ProviderTransientError,
    }
  ));

  let after = h.renderer.document(&report.document).await.expect("document");
  for (old, new) in before.records.iter().zip(&after.records) {
    assert_eq!(old.title, new.title);
    assert_eq!(old.content, new.content);
    assert!(!new.image.is_placeholder());
  }
}
