//! Structure planner
//!
//! One text-model call turns a topic into `num_slides` [SlideSpec]s. The
//! answer is scanned for brace-delimited JSON objects; whatever is missing is
//! backfilled with synthetic specs so the count always matches.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::LocaleContext;
use super::job::SlideSpec;
use crate::model::{ProviderError, ResolvedModel};

pub const PLANNER_MAX_TOKENS: u32 = 8192;

pub const PLANNER_SYSTEM_PROMPT: &str = "You are an assistant specialised in building PowerPoint presentations. Your goal is to create clear, well organised structures based on the given topic. You must provide exactly the requested number of slides, no more and no fewer.";

static JSON_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)\{.*?\}").ok());

/// Planner output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
  pub specs: Vec<SlideSpec>,
  /// Number of specs that were synthesized rather than parsed
  pub synthesized: usize,
}

impl Plan {
  pub fn is_degraded(&self) -> bool {
    self.synthesized > 0
  }

  pub fn len(&self) -> usize {
    self.specs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.specs.is_empty()
  }
}

#[derive(Debug, Clone, Default)]
pub struct StructurePlanner {
  locale: LocaleContext,
  dedupe: bool,
}

impl StructurePlanner {
  pub fn new(locale: LocaleContext) -> Self {
    Self {
      locale,
      dedupe: false,
    }
  }

  /// Skip parsed specs whose title repeats an accepted one.
  pub fn with_dedupe(mut self, dedupe: bool) -> Self {
    self.dedupe = dedupe;
    self
  }

  pub async fn plan(&self, topic: &str, num_slides: usize, model: &ResolvedModel) -> Plan {
    let raw = match self.request_structure(topic, num_slides, model).await {
      Ok(raw) => raw,
      Err(err) => {
        warn!(model = %model.entry.id, error = %err, "structure request failed, using generic plan");
        String::new()
      }
    };

    let plan = parse_plan(&raw, topic, num_slides, self.dedupe);
    info!(
      slides = plan.len(),
      synthesized = plan.synthesized,
      "structure planned"
    );
    plan
  }

  async fn request_structure(
    &self,
    topic: &str,
    num_slides: usize,
    model: &ResolvedModel,
  ) -> Result<String, ProviderError> {
    let prompt = build_prompt(topic, num_slides, &self.locale);
    let request = model
      .entry
      .text_request(prompt, Some(PLANNER_SYSTEM_PROMPT), PLANNER_MAX_TOKENS)?;
    model.adapter.invoke(request).await?.into_text()
  }
}

pub fn build_prompt(topic: &str, num_slides: usize, locale: &LocaleContext) -> String {
  let mut prompt = format!(
    "Create a structure for a PowerPoint presentation about '{topic}' with {num_slides} slides. \
     For each slide I need: \
     1. A short, concise title (at most 50 characters) \
     2. A prompt to generate the slide content (with specific context) \
     3. A prompt to generate an image related to that slide (very descriptive and visual). \
     Show each slide as a simple JSON object like: \
     {{\"slide\": 1, \"title\": \"Title\", \"content_prompt\": \"prompt for the content\", \"image_prompt\": \"prompt for the image\"}}"
  );
  if let Some(instruction) = locale.language_instruction() {
    prompt.push(' ');
    prompt.push_str(&instruction);
  }
  prompt
}

/// Turn raw model text into exactly `num_slides` specs.
pub fn parse_plan(raw: &str, topic: &str, num_slides: usize, dedupe: bool) -> Plan {
  let mut specs: Vec<SlideSpec> = Vec::with_capacity(num_slides);
  let mut synthesized = 0;
  let mut seen_titles = HashSet::new();

  let matches = JSON_OBJECT
    .as_ref()
    .map(|re| re.find_iter(raw).map(|m| m.as_str()).collect::<Vec<_>>())
    .unwrap_or_default();

  for candidate in matches {
    if specs.len() >= num_slides {
      break;
    }
    let index = specs.len();

    let (spec, synthetic) = match serde_json::from_str::<Value>(candidate) {
      Ok(Value::Object(object)) => (spec_from_object(&object, index, topic), false),
      _ => {
        debug!(slide = index, "unparseable slide object, using generic spec");
        (SlideSpec::synthetic(index, topic), true)
      }
    };

    if dedupe && !seen_titles.insert(normalise(&spec.title_seed)) {
      debug!(title = %spec.title_seed, "skipping duplicate slide spec");
      continue;
    }
    if synthetic {
      synthesized += 1;
    }
    specs.push(spec);
  }

  while specs.len() < num_slides {
    synthesized += 1;
    specs.push(SlideSpec::synthetic(specs.len(), topic));
  }

  Plan { specs, synthesized }
}

fn spec_from_object(object: &serde_json::Map<String, Value>, index: usize, topic: &str) -> SlideSpec {
  let ordinal = index + 1;
  let field = |key: &str| {
    object
      .get(key)
      .and_then(Value::as_str)
      .map(str::trim)
      .filter(|value| !value.is_empty())
      .map(str::to_string)
  };

  SlideSpec {
    index,
    title_seed: field("title").unwrap_or_else(|| format!("Slide {ordinal}")),
    content_prompt: field("content_prompt")
      .unwrap_or_else(|| format!("Information about {topic} for slide {ordinal}")),
    image_prompt: field("image_prompt")
      .unwrap_or_else(|| format!("Visual image about {topic} for slide {ordinal}")),
  }
}

fn normalise(title: &str) -> String {
  title
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}
