//! Stage handler trait, dynamic dispatch wrapper, and per-invocation context.

use async_trait::async_trait;
use uuid::Uuid;

use contentflow_types::{Result, RunWarning, WarningKind};

use crate::events::{EventEmitter, PipelineEvent};

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// What a handler reports back to the engine. Failures are the `Err` side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult<E> {
    Completed,
    /// Router decision. Must be one of the router's declared events.
    Routed(E),
}

// ---------------------------------------------------------------------------
// StageContext
// ---------------------------------------------------------------------------

/// Run metadata lent to a handler for one invocation.
pub struct StageContext {
    run_id: Uuid,
    epoch: usize,
    stage: String,
    emitter: EventEmitter,
    warnings: Vec<RunWarning>,
}

impl StageContext {
    pub fn new(run_id: Uuid, epoch: usize, stage: impl Into<String>, emitter: EventEmitter) -> Self {
        Self {
            run_id,
            epoch,
            stage: stage.into(),
            emitter,
            warnings: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn emit(&self, event: PipelineEvent) {
        self.emitter.emit(event);
    }

    /// Record a non-fatal condition; it ends up in the run report.
    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(stage = %self.stage, epoch = self.epoch, kind = ?kind, "{}", message);
        self.warnings.push(RunWarning {
            stage: self.stage.clone(),
            kind,
            message,
        });
    }

    pub fn warnings(&self) -> &[RunWarning] {
        &self.warnings
    }

    pub(crate) fn into_warnings(self) -> Vec<RunWarning> {
        self.warnings
    }
}

// ---------------------------------------------------------------------------
// StageHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StageHandler<S, E>: Send + Sync {
    /// Run the stage body against the state lent by the engine.
    async fn execute(&self, state: &mut S, ctx: &mut StageContext) -> Result<StageResult<E>>;
}

// ---------------------------------------------------------------------------
// DynHandler: object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynHandler<S, E>(Box<dyn StageHandler<S, E>>);

impl<S, E> DynHandler<S, E> {
    pub fn new(handler: impl StageHandler<S, E> + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub async fn execute(&self, state: &mut S, ctx: &mut StageContext) -> Result<StageResult<E>> {
        self.0.execute(state, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
