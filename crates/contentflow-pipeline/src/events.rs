//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, progress displays, tests) can follow a run
//! without coupling to the engine internals.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        graph: String,
        stage_count: usize,
    },
    RunCompleted {
        run_id: Uuid,
        epochs: usize,
        duration_ms: u64,
    },
    RunFailed {
        run_id: Uuid,
        kind: String,
        error: String,
    },
    EpochStarted {
        epoch: usize,
        ready: Vec<String>,
    },
    StageStarted {
        stage: String,
        epoch: usize,
    },
    StageCompleted {
        stage: String,
        epoch: usize,
        routed: Option<String>,
        duration_ms: u64,
    },
    StageFailed {
        stage: String,
        epoch: usize,
        error: String,
    },
    /// A collaborator call failed transiently and is being retried.
    StageRetrying {
        stage: String,
        attempt: usize,
        delay_ms: u64,
    },
    /// The quality gate rejected the artifact and a new one was requested.
    RegenerateRequested {
        stage: String,
        score: u8,
        retry_count: u32,
    },
    /// The retry budget ran out and the last artifact was accepted as is.
    Degraded {
        stage: String,
        score: u8,
        retry_count: u32,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
