//! Event types for streaming pipeline progress
//!
//! Events are sent from the orchestrator (and the execution client, while it
//! waits on a job) to any consumer that wants to follow a run.

use serde::{Deserialize, Serialize};

/// Trait for sending pipeline events
///
/// This abstracts over the transport mechanism (channel, log, test buffer),
/// so the orchestrator can be embedded in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered. Callers ignore
    /// delivery failures; a run never aborts because nobody is listening.
    fn send(&self, event: PipelineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// Run accepted; no stage has started yet
    #[serde(rename_all = "camelCase")]
    PipelineStarted {
        execution_id: String,
        stage_count: usize,
    },

    /// A stage began compiling its graph
    #[serde(rename_all = "camelCase")]
    StageStarted {
        execution_id: String,
        stage: String,
        index: usize,
    },

    /// A stage's graph was accepted by the engine
    #[serde(rename_all = "camelCase")]
    JobQueued {
        execution_id: String,
        stage: String,
        job_id: String,
    },

    /// Progress reported while waiting on a job
    #[serde(rename_all = "camelCase")]
    StageProgress {
        job_id: String,
        progress: f32,
        message: Option<String>,
    },

    /// A stage produced its artifact
    #[serde(rename_all = "camelCase")]
    StageCompleted {
        execution_id: String,
        stage: String,
        artifact_path: String,
    },

    /// A stage failed; no further stages will run
    #[serde(rename_all = "camelCase")]
    StageFailed {
        execution_id: String,
        stage: String,
        error: String,
    },

    /// Every stage succeeded
    #[serde(rename_all = "camelCase")]
    PipelineCompleted {
        execution_id: String,
        artifact_path: String,
        seed: Option<u64>,
    },

    /// The run stopped early
    #[serde(rename_all = "camelCase")]
    PipelineFailed { execution_id: String, error: String },
}

impl PipelineEvent {
    /// Create a job progress event
    pub fn progress(job_id: &str, progress: f32, message: Option<String>) -> Self {
        Self::StageProgress {
            job_id: job_id.to_string(),
            progress,
            message,
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: PipelineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel
///
/// For hosts that consume events on another task. Sending fails with
/// [`EventError::channel_closed`] once the receiver is dropped.
pub struct ChannelEventSink {
    sender: tokio::sync::mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map_err(|_| EventError::channel_closed())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<PipelineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PipelineEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.lock().push(event);
        Ok(())
    }
}
