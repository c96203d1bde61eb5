//! Result Sinks: consumers of load state transitions.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::model::{LoadId, LoadState};

/// Receives every state transition of every load.
///
/// `InProgress` payloads are complete snapshots: replace, never merge.
/// Called synchronously from the controller while it holds the load's state
/// lock, so implementations must return quickly and must not call back into
/// the controller.
pub trait ResultSink: Send + Sync {
    fn publish(&self, load: LoadId, state: &LoadState);
}

/// Logs each transition as a status line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn publish(&self, load: LoadId, state: &LoadState) {
        let status = state.status_line();
        match state {
            LoadState::Failed { cause } => {
                warn!(load_id = %load.short(), repo = ?cause.repo(), "loading status: {status}")
            }
            _ => info!(load_id = %load.short(), state = state.label(), "loading status: {status}"),
        }
    }
}

/// Forwards transitions into an unbounded channel, e.g. towards a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(LoadId, LoadState)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(LoadId, LoadState)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn publish(&self, load: LoadId, state: &LoadState) {
        // receiver gone means nobody is listening any more
        let _ = self.tx.send((load, state.clone()));
    }
}

/// Broadcasts every transition to several sinks, in order.
#[derive(Clone, Default)]
pub struct FanOutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ResultSink for FanOutSink {
    fn publish(&self, load: LoadId, state: &LoadState) {
        for sink in &self.sinks {
            sink.publish(load, state);
        }
    }
}
