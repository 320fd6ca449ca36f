//! Generation pipeline
//!
//! Probe the selected models, plan the deck, generate every slide field
//! concurrently and hand the joined records to a [DocumentRenderer].

pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod generators;
pub mod job;
pub mod planner;
pub mod prober;
pub mod regenerate;
pub mod renderer;

pub use context::{LayoutChoice, LocaleContext, ThemeContext};
pub use coordinator::{CoordinatorSettings, GenerationCoordinator, GenerationReport, ModelSubstitution};
pub use error::PipelineError;
pub use events::{ChannelSink, EventSink, FanoutSink, TracingSink};
pub use generators::{ContentSynthesizer, FieldOutcome, ImageSynthesizer, refine_title};
pub use job::{
  DocumentTarget, FieldFallback, GenerationJob, ModelSelection, SlideImage, SlideRecord, SlideSpec,
};
pub use planner::{Plan, StructurePlanner};
pub use prober::{Availability, AvailabilityProber, SelectionProbe};
pub use regenerate::RegenerateInput;
pub use renderer::{
  DocumentHandle, DocumentRenderer, FieldValue, InMemoryRenderer, RenderError, StoredDocument,
};
