//! Progress/log sinks
//!
//! The coordinator reports progress as [ProgressEvent]s; how they are shown is
//! up to whatever sink is attached.

use std::sync::Arc;

use async_trait::async_trait;
use deckforge_protocol::ProgressEvent;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait EventSink: Send + Sync {
  async fn emit(&self, event: ProgressEvent);
}

/// Writes every event to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
  async fn emit(&self, event: ProgressEvent) {
    match &event {
      ProgressEvent::ProbeResult {
        modality,
        model_id,
        available,
      } => info!(%modality, model = %model_id, available, "probe result"),
      ProgressEvent::ModelSubstituted { modality, from, to } => {
        warn!(%modality, from = %from, to = %to, "model unavailable, substituting default")
      }
      ProgressEvent::PlanReady {
        num_slides,
        degraded,
      } => info!(num_slides, degraded, "plan ready"),
      ProgressEvent::SlideFieldDone {
        index,
        field,
        fallback,
      } => match fallback {
        Some(kind) => warn!(slide = index, %field, ?kind, "slide field fell back"),
        None => debug!(slide = index, %field, "slide field done"),
      },
      ProgressEvent::PipelineAssembled { num_slides } => info!(num_slides, "pipeline assembled"),
      ProgressEvent::PipelineHandedOff { document_id } => {
        info!(document = %document_id, "document handed off")
      }
      ProgressEvent::FieldRegenerated {
        document_id,
        index,
        field,
      } => info!(document = %document_id, slide = index, %field, "field regenerated"),
      ProgressEvent::PipelineFailed { reason } => warn!(reason = %reason, "pipeline failed"),
      ProgressEvent::PipelineCancelled => info!("pipeline cancelled"),
    }
  }
}

/// Forwards events into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
  tx_event: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
  pub fn new(tx_event: mpsc::Sender<ProgressEvent>) -> Self {
    Self { tx_event }
  }
}

#[async_trait]
impl EventSink for ChannelSink {
  async fn emit(&self, event: ProgressEvent) {
    if self.tx_event.send(event).await.is_err() {
      debug!("progress receiver dropped");
    }
  }
}

/// Sends each event to every inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
  sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
    self.sinks.push(sink);
    self
  }
}

#[async_trait]
impl EventSink for FanoutSink {
  async fn emit(&self, event: ProgressEvent) {
    for sink in &self.sinks {
      sink.emit(event.clone()).await;
    }
  }
}
