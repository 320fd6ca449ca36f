// Pipeline State
// Lifecycle of one generation job

use serde::{Deserialize, Serialize};

/// Generation coordinator state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
  Idle,
  Probing,
  Planning,
  Generating,
  Assembled,
  HandedOff,
  Failed,
  Cancelled,
}

impl PipelineState {
  /// Check if state is final (no more transitions)
  pub fn is_final(&self) -> bool {
    matches!(
      self,
      PipelineState::HandedOff | PipelineState::Failed | PipelineState::Cancelled
    )
  }

  /// Whether `next` is a legal transition from this state.
  pub fn can_transition_to(&self, next: PipelineState) -> bool {
    use PipelineState::*;

    match (self, next) {
      (Idle, Probing)
      | (Probing, Planning)
      | (Planning, Generating)
      | (Generating, Assembled)
      | (Assembled, HandedOff) => true,
      (from, Failed) | (from, Cancelled) => !from.is_final(),
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn forward_path_is_legal() {
    let path = [
      PipelineState::Idle,
      PipelineState::Probing,
      PipelineState::Planning,
      PipelineState::Generating,
      PipelineState::Assembled,
      PipelineState::HandedOff,
    ];
    for pair in path.windows(2) {
      assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
    }
  }

  #[test]
  fn terminal_states_do_not_move() {
    assert!(PipelineState::HandedOff.is_final());
    assert!(!PipelineState::HandedOff.can_transition_to(PipelineState::Failed));
    assert!(!PipelineState::Cancelled.can_transition_to(PipelineState::Failed));
    assert!(PipelineState::Generating.can_transition_to(PipelineState::Cancelled));
    assert!(!PipelineState::Generating.can_transition_to(PipelineState::HandedOff));
  }
}
