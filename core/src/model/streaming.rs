//! Server-sent event buffering.
//!
//! Vendors that stream text are read through [StreamingProcessor] and folded
//! into one string before anything leaves the adapter.

use serde_json::Value;

/// Streaming processor configuration.
pub struct StreamingConfig {
  pub separator: &'static str,
}

impl Default for StreamingConfig {
  fn default() -> Self {
    Self { separator: "\n\n" }
  }
}

/// Parsed stream event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStreamEvent {
  /// Text carried by the event, if any
  pub text: Option<String>,
  /// Vendor-reported error message
  pub error: Option<String>,
  pub done: bool,
}

/// Stateful SSE streaming parser.
pub struct StreamingProcessor {
  config: StreamingConfig,
  buffer: String,
  /// Trailing bytes of an incomplete UTF-8 sequence
  pending: Vec<u8>,
}

impl StreamingProcessor {
  pub fn new(config: StreamingConfig) -> Self {
    Self {
      config,
      buffer: String::new(),
      pending: Vec::new(),
    }
  }

  /// Feeds one text segment and returns complete events.
  pub fn push_text(&mut self, text: &str) -> Vec<ParsedStreamEvent> {
    self.buffer.push_str(&text.replace("\r\n", "\n"));
    self.drain_events()
  }

  /// Feeds raw bytes and returns complete events.
  ///
  /// A multi-byte character cut at the end of `bytes` is held back until the
  /// next push completes it.
  pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<ParsedStreamEvent> {
    self.pending.extend_from_slice(bytes);
    let mut decoded = String::new();
    loop {
      match std::str::from_utf8(&self.pending) {
        Ok(text) => {
          decoded.push_str(text);
          self.pending.clear();
          break;
        }
        Err(err) => {
          let valid = err.valid_up_to();
          decoded.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
          match err.error_len() {
            // Incomplete sequence at the end, wait for more bytes
            None => {
              self.pending.drain(..valid);
              break;
            }
            Some(len) => {
              decoded.push(char::REPLACEMENT_CHARACTER);
              self.pending.drain(..valid + len);
            }
          }
        }
      }
    }
    self.push_text(&decoded)
  }

  /// Flushes the remaining buffer.
  pub fn finish(&mut self) -> Vec<ParsedStreamEvent> {
    if !self.pending.is_empty() {
      let tail = String::from_utf8_lossy(&self.pending).into_owned();
      self.pending.clear();
      self.buffer.push_str(&tail);
    }
    if self.buffer.trim().is_empty() {
      self.buffer.clear();
      return Vec::new();
    }
    let remaining = std::mem::take(&mut self.buffer);
    vec![parse_event(&remaining)]
  }

  fn drain_events(&mut self) -> Vec<ParsedStreamEvent> {
    let mut events = Vec::new();
    while let Some(idx) = self.buffer.find(self.config.separator) {
      let event = self.buffer[..idx].to_string();
      self.buffer.drain(..idx + self.config.separator.len());
      events.push(parse_event(&event));
    }
    events
  }
}

fn parse_event(raw: &str) -> ParsedStreamEvent {
  let mut event = ParsedStreamEvent::default();

  for line in raw.lines() {
    let Some(payload) = line.strip_prefix("data:") else {
      continue;
    };
    let payload = payload.trim();

    if payload == "[DONE]" {
      event.done = true;
      continue;
    }

    let Ok(value) = serde_json::from_str::<Value>(payload) else {
      continue;
    };

    if let Some(err) = value.get("error") {
      let message = err
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
      event.error = Some(message);
      continue;
    }

    let (text, finished) = parse_text_value(&value);
    if let Some(text) = text {
      event.text.get_or_insert_with(String::new).push_str(&text);
    }
    event.done |= finished;
  }

  event
}

/// Extracts text and completion from one decoded payload.
fn parse_text_value(value: &Value) -> (Option<String>, bool) {
  // OpenAI-compatible style
  if let Some(choice) = value
    .get("choices")
    .and_then(Value::as_array)
    .and_then(|choices| choices.first())
  {
    let text = choice
      .get("delta")
      .and_then(|delta| delta.get("content"))
      .and_then(Value::as_str)
      .map(str::to_string);
    let finished = choice
      .get("finish_reason")
      .and_then(Value::as_str)
      .is_some();
    return (text, finished);
  }

  // Gemini style
  if let Some(candidate) = value
    .get("candidates")
    .and_then(Value::as_array)
    .and_then(|candidates| candidates.first())
  {
    let text = candidate
      .get("content")
      .and_then(|content| content.get("parts"))
      .and_then(Value::as_array)
      .map(|parts| {
        parts
          .iter()
          .filter_map(|part| part.get("text").and_then(Value::as_str))
          .collect::<String>()
      })
      .filter(|text| !text.is_empty());
    let finished = candidate
      .get("finishReason")
      .and_then(Value::as_str)
      .is_some_and(|reason| reason != "FINISH_REASON_UNSPECIFIED");
    return (text, finished);
  }

  (None, false)
}
