// Deckforge Protocol
// Types shared by the generation core, its sinks and front ends

pub mod error;
pub mod events;
pub mod models;
pub mod state;

pub use error::ErrorKind;
pub use events::ProgressEvent;
pub use models::{Modality, SlideField};
pub use state::PipelineState;
