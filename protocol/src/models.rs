use std::fmt;

use serde::{Deserialize, Serialize};

/// Capability class of a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
  /// Text generation.
  Text,
  /// Image generation.
  Image,
}

impl Modality {
  pub fn as_str(&self) -> &'static str {
    match self {
      Modality::Text => "text",
      Modality::Image => "image",
    }
  }
}

impl fmt::Display for Modality {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One of the three generated fields of a slide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlideField {
  Title,
  Content,
  Image,
}

impl SlideField {
  pub const ALL: [SlideField; 3] = [SlideField::Title, SlideField::Content, SlideField::Image];

  pub fn as_str(&self) -> &'static str {
    match self {
      SlideField::Title => "title",
      SlideField::Content => "content",
      SlideField::Image => "image",
    }
  }
}

impl fmt::Display for SlideField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for SlideField {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "title" => Ok(SlideField::Title),
      "content" | "body" => Ok(SlideField::Content),
      "image" => Ok(SlideField::Image),
      other => Err(format!("unknown slide field: {other}")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn modality_serializes_lowercase() {
    let json = serde_json::to_string(&Modality::Image).expect("serialize modality");
    assert_eq!(json, "\"image\"");
  }

  #[test]
  fn slide_field_parses_body_alias() {
    assert_eq!("Body".parse::<SlideField>(), Ok(SlideField::Content));
    assert!("footer".parse::<SlideField>().is_err());
  }
}
