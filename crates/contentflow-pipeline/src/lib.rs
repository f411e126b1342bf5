//! Stage graph, epoch execution engine, validation and the content stages.
//!
//! This crate implements the contentflow runner: a declarative graph of stages
//! wired by completion signals and router events, an epoch-based executor with
//! cancellation and deadlines, the lint rules that guard graph construction,
//! and the research/generate/score/finalize stages of the content pipeline.

pub mod config;
pub mod engine;
pub mod events;
pub mod graph;
pub mod handler;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod validation;

pub use config::PipelineConfig;
pub use engine::{PipelineExecutor, RunOutcome, RunState};
pub use events::{EventEmitter, PipelineEvent};
pub use graph::{
    EdgeDescription, GraphDescription, RouteEvent, Signal, SignalDescription, Stage,
    StageDescription, StageGraph, StageGraphBuilder, Trigger, TriggerKind,
};
pub use handler::{DynHandler, StageContext, StageHandler, StageResult};
pub use handlers::{
    CallSettings, FinalizeStage, GateKind, GenerateStage, InitStage, QualityGateStage,
    ResearchRouter, ResearchStage, ScoreRouter,
};
pub use pipeline::{content_graph, epoch_budget, ContentEvent, ContentPipeline, RunRequest};
pub use retry::{execute_with_retry, BackoffPolicy};
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};
