//! Pipeline execution engine: the epoch loop.
//!
//! Each epoch runs every ready stage once, in declaration order, then
//! computes the next ready set from the signals those stages produced. A run
//! ends when the terminal stage has run, or fails on the first handler
//! error, an undeclared router event, a stall, the epoch limit,
//! cancellation or the deadline.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use contentflow_types::{ContentflowError, PipelineState, Result, RunWarning, StageRecord};

use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::{RouteEvent, Signal, StageGraph, Trigger};
use crate::handler::{StageContext, StageResult};

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// State a graph can run over.
///
/// When several stages are ready in one epoch each runs on its own copy of
/// the epoch-start state, and the copies are folded back with `merge_writes`.
pub trait RunState: Clone + Send + Sync {
    /// Apply the fields `written` changed relative to `base` onto `self`.
    /// Fails when `self` already changed the same field.
    fn merge_writes(&mut self, base: &Self, written: Self) -> Result<()>;
}

impl RunState for PipelineState {
    fn merge_writes(&mut self, base: &Self, written: Self) -> Result<()> {
        PipelineState::merge_writes(self, base, written)
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Drives one graph run at a time. Cheap to build per run.
pub struct PipelineExecutor {
    max_epochs: usize,
    emitter: EventEmitter,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

/// The result of a run that reached its terminal stage.
#[derive(Debug)]
pub struct RunOutcome<S> {
    pub run_id: Uuid,
    pub state: S,
    pub trace: Vec<StageRecord>,
    pub warnings: Vec<RunWarning>,
    pub epochs: usize,
}

impl<S> RunOutcome<S> {
    pub fn invocations(&self, stage: &str) -> usize {
        self.trace.iter().filter(|r| r.stage == stage).count()
    }
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

/// Stages whose trigger is satisfied by `produced`, in declaration order.
///
/// `pending` carries the signals each `ListenOnAll` stage has collected since
/// it last fired.
fn next_ready<S, E: RouteEvent>(
    graph: &StageGraph<S, E>,
    produced: &HashSet<Signal<E>>,
    pending: &mut [HashSet<Signal<E>>],
) -> Vec<usize> {
    let mut ready = Vec::new();
    for (idx, stage) in graph.stages().iter().enumerate() {
        let fire = match stage.trigger() {
            Trigger::Start => false,
            Trigger::ListenOn(signal) => produced.contains(signal),
            Trigger::ListenOnAny(signals) => signals.iter().any(|s| produced.contains(s)),
            Trigger::ListenOnAll(signals) => {
                let seen = &mut pending[idx];
                seen.extend(signals.iter().filter(|s| produced.contains(*s)).cloned());
                let complete = !signals.is_empty() && signals.iter().all(|s| seen.contains(s));
                if complete {
                    seen.clear();
                }
                complete
            }
        };
        if fire {
            ready.push(idx);
        }
    }
    ready
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

impl PipelineExecutor {
    pub fn new(max_epochs: usize) -> Self {
        Self {
            max_epochs,
            emitter: EventEmitter::default(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Run `graph` from its start stage to its terminal stage.
    pub async fn run<S: RunState, E: RouteEvent>(
        &self,
        graph: &StageGraph<S, E>,
        state: S,
        run_id: Uuid,
    ) -> Result<RunOutcome<S>> {
        let started = Instant::now();
        tracing::info!(run_id = %run_id, graph = %graph.name(), "Run started");
        self.emitter.emit(PipelineEvent::RunStarted {
            run_id,
            graph: graph.name().to_string(),
            stage_count: graph.stages().len(),
        });

        match self.drive(graph, state, run_id).await {
            Ok(outcome) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(run_id = %run_id, epochs = outcome.epochs, duration_ms, "Run completed");
                self.emitter.emit(PipelineEvent::RunCompleted {
                    run_id,
                    epochs: outcome.epochs,
                    duration_ms,
                });
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, kind = e.kind(), error = %e, "Run failed");
                self.emitter.emit(PipelineEvent::RunFailed {
                    run_id,
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn check_interrupt(&self, stage: &str, epoch: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ContentflowError::Cancelled {
                stage: stage.to_string(),
                epoch,
            });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ContentflowError::DeadlineExceeded {
                    stage: stage.to_string(),
                    epoch,
                });
            }
        }
        Ok(())
    }

    async fn drive<S: RunState, E: RouteEvent>(
        &self,
        graph: &StageGraph<S, E>,
        mut state: S,
        run_id: Uuid,
    ) -> Result<RunOutcome<S>> {
        let start = graph.start_index().ok_or_else(|| {
            ContentflowError::ConfigurationError(format!("graph '{}' has no start stage", graph.name()))
        })?;
        let terminal = graph
            .terminal()
            .and_then(|t| graph.position(t))
            .ok_or_else(|| {
                ContentflowError::ConfigurationError(format!(
                    "graph '{}' has no terminal stage",
                    graph.name()
                ))
            })?;

        let mut pending: Vec<HashSet<Signal<E>>> = vec![HashSet::new(); graph.stages().len()];
        let mut trace = Vec::new();
        let mut warnings = Vec::new();
        let mut ready = vec![start];
        let mut epoch = 0usize;

        loop {
            if ready.is_empty() {
                return Err(ContentflowError::Stalled { epoch });
            }
            let names: Vec<String> = ready
                .iter()
                .map(|&i| graph.stages()[i].name().to_string())
                .collect();
            if epoch >= self.max_epochs {
                return Err(ContentflowError::EpochLimitExceeded {
                    limit: self.max_epochs,
                    epoch,
                    ready: names,
                });
            }

            tracing::debug!(epoch, ready = ?names, "Epoch started");
            self.emitter.emit(PipelineEvent::EpochStarted {
                epoch,
                ready: names,
            });

            // Siblings each see the epoch-start state, never each other's writes
            let snapshot = (ready.len() > 1).then(|| state.clone());
            let mut produced: HashSet<Signal<E>> = HashSet::new();
            let mut terminal_ran = false;

            for &idx in &ready {
                let stage = &graph.stages()[idx];
                let name = stage.name();
                self.check_interrupt(name, epoch)?;

                tracing::info!(stage = %name, epoch, "Stage started");
                self.emitter.emit(PipelineEvent::StageStarted {
                    stage: name.to_string(),
                    epoch,
                });
                let stage_start = Instant::now();
                let mut ctx = StageContext::new(run_id, epoch, name, self.emitter.clone());

                let result = match &snapshot {
                    None => stage.handler().execute(&mut state, &mut ctx).await,
                    Some(base) => {
                        let mut scratch = base.clone();
                        match stage.handler().execute(&mut scratch, &mut ctx).await {
                            Ok(r) => state.merge_writes(base, scratch).map(|_| r),
                            Err(e) => Err(e),
                        }
                    }
                };

                // An undeclared router event is a graph bug, reported against the router
                let result = result.and_then(|r| match r {
                    StageResult::Routed(event) if !stage.may_emit(event) => {
                        let declared: Vec<&str> = stage.emits().iter().map(|e| e.name()).collect();
                        Err(ContentflowError::ConfigurationError(format!(
                            "stage '{}' emitted '{}' at epoch {}, outside its declared events [{}]",
                            name,
                            event.name(),
                            epoch,
                            declared.join(", ")
                        )))
                    }
                    other => Ok(other),
                });

                let result = match result {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::error!(stage = %name, epoch, error = %e, "Stage failed");
                        self.emitter.emit(PipelineEvent::StageFailed {
                            stage: name.to_string(),
                            epoch,
                            error: e.to_string(),
                        });
                        return Err(ContentflowError::StageFailed {
                            stage: name.to_string(),
                            epoch,
                            source: Box::new(e),
                        });
                    }
                };
                warnings.extend(ctx.into_warnings());

                let routed = match result {
                    StageResult::Completed => None,
                    StageResult::Routed(event) => {
                        produced.insert(Signal::Event(event));
                        Some(event.name().to_string())
                    }
                };
                produced.insert(Signal::Completed(name.to_string()));

                let duration_ms = stage_start.elapsed().as_millis() as u64;
                tracing::info!(stage = %name, epoch, routed = ?routed, duration_ms, "Stage completed");
                self.emitter.emit(PipelineEvent::StageCompleted {
                    stage: name.to_string(),
                    epoch,
                    routed: routed.clone(),
                    duration_ms,
                });
                trace.push(StageRecord {
                    epoch,
                    stage: name.to_string(),
                    routed,
                    duration_ms,
                });

                if idx == terminal {
                    terminal_ran = true;
                }
            }

            epoch += 1;
            if terminal_ran {
                return Ok(RunOutcome {
                    run_id,
                    state,
                    trace,
                    warnings,
                    epochs: epoch,
                });
            }
            ready = next_ready(graph, &produced, &mut pending);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
