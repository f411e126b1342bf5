//! Stage graph: named stages, their triggers, and the builder that lints them.
//!
//! A graph is generic over the run state `S` and a closed event enum `E`.
//! Routers declare up front which events they may emit, so every
//! listener/emitter pair can be checked when the graph is built instead of
//! when a run happens to take that branch.

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use contentflow_types::Result;

use crate::handler::{DynHandler, StageHandler};
use crate::validation::validate_or_raise;

// ---------------------------------------------------------------------------
// Events, signals and triggers
// ---------------------------------------------------------------------------

/// The closed set of events a graph's routers can emit.
pub trait RouteEvent: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;
}

/// Something a stage produced during an epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signal<E> {
    /// The named stage ran to completion.
    Completed(String),
    /// A router emitted this event.
    Event(E),
}

impl<E: RouteEvent> Signal<E> {
    pub fn completed(stage: impl Into<String>) -> Self {
        Signal::Completed(stage.into())
    }

    fn describe(&self) -> SignalDescription {
        match self {
            Signal::Completed(stage) => SignalDescription::Completed(stage.clone()),
            Signal::Event(e) => SignalDescription::Event(e.name().to_string()),
        }
    }
}

/// When a stage becomes ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger<E> {
    Start,
    ListenOn(Signal<E>),
    /// OR fan-in: any one of the signals.
    ListenOnAny(Vec<Signal<E>>),
    /// AND fan-in: every signal, accumulated across epochs.
    ListenOnAll(Vec<Signal<E>>),
}

impl<E> Trigger<E> {
    /// Listen for the completion of `stage`.
    pub fn after(stage: impl Into<String>) -> Self {
        Trigger::ListenOn(Signal::Completed(stage.into()))
    }

    /// Listen for a router event.
    pub fn on(event: E) -> Self {
        Trigger::ListenOn(Signal::Event(event))
    }

    pub fn signals(&self) -> &[Signal<E>] {
        match self {
            Trigger::Start => &[],
            Trigger::ListenOn(signal) => std::slice::from_ref(signal),
            Trigger::ListenOnAny(signals) | Trigger::ListenOnAll(signals) => signals,
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Start => TriggerKind::Start,
            Trigger::ListenOn(_) => TriggerKind::ListenOn,
            Trigger::ListenOnAny(_) => TriggerKind::ListenOnAny,
            Trigger::ListenOnAll(_) => TriggerKind::ListenOnAll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Start,
    ListenOn,
    ListenOnAny,
    ListenOnAll,
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

pub struct Stage<S, E> {
    name: String,
    trigger: Trigger<E>,
    /// `Some` for routers: the only events this stage may emit.
    emits: Option<Vec<E>>,
    handler: DynHandler<S, E>,
}

impl<S, E: RouteEvent> Stage<S, E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> &Trigger<E> {
        &self.trigger
    }

    pub fn is_router(&self) -> bool {
        self.emits.is_some()
    }

    pub fn emits(&self) -> &[E] {
        self.emits.as_deref().unwrap_or(&[])
    }

    pub fn may_emit(&self, event: E) -> bool {
        self.emits().contains(&event)
    }

    pub(crate) fn handler(&self) -> &DynHandler<S, E> {
        &self.handler
    }
}

// ---------------------------------------------------------------------------
// StageGraph
// ---------------------------------------------------------------------------

/// An immutable, linted set of stages. Stage order is declaration order,
/// which is also the order ready stages run within an epoch.
pub struct StageGraph<S, E> {
    name: String,
    stages: Vec<Stage<S, E>>,
    terminal: Option<String>,
    loop_guards: Vec<String>,
}

impl<S, E: RouteEvent> StageGraph<S, E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage<S, E>] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage<S, E>> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    pub fn start_index(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| matches!(s.trigger, Trigger::Start))
    }

    pub fn terminal(&self) -> Option<&str> {
        self.terminal.as_deref()
    }

    pub fn loop_guards(&self) -> &[String] {
        &self.loop_guards
    }

    /// Read-only structural view: stages, triggers and derived edges.
    pub fn describe(&self) -> GraphDescription {
        let stages = self
            .stages
            .iter()
            .map(|s| StageDescription {
                name: s.name.clone(),
                trigger: s.trigger.kind(),
                listens: s.trigger.signals().iter().map(Signal::describe).collect(),
                router: s.is_router(),
                emits: s.emits().iter().map(|e| e.name().to_string()).collect(),
            })
            .collect();
        GraphDescription::new(
            self.name.clone(),
            self.terminal.clone(),
            self.loop_guards.clone(),
            stages,
        )
    }

    pub fn to_dot(&self) -> String {
        self.describe().to_dot()
    }
}

// ---------------------------------------------------------------------------
// StageGraphBuilder
// ---------------------------------------------------------------------------

pub struct StageGraphBuilder<S, E> {
    name: String,
    stages: Vec<Stage<S, E>>,
    terminal: Option<String>,
    loop_guards: Vec<String>,
}

impl<S: Send + 'static, E: RouteEvent> StageGraphBuilder<S, E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            terminal: None,
            loop_guards: Vec::new(),
        }
    }

    pub fn stage(
        mut self,
        name: impl Into<String>,
        trigger: Trigger<E>,
        handler: impl StageHandler<S, E> + 'static,
    ) -> Self {
        self.stages.push(Stage {
            name: name.into(),
            trigger,
            emits: None,
            handler: DynHandler::new(handler),
        });
        self
    }

    /// Declare a router: a stage whose result is one of `emits`.
    pub fn router(
        mut self,
        name: impl Into<String>,
        trigger: Trigger<E>,
        emits: impl IntoIterator<Item = E>,
        handler: impl StageHandler<S, E> + 'static,
    ) -> Self {
        let mut events: Vec<E> = Vec::new();
        for e in emits {
            if !events.contains(&e) {
                events.push(e);
            }
        }
        self.stages.push(Stage {
            name: name.into(),
            trigger,
            emits: Some(events),
            handler: DynHandler::new(handler),
        });
        self
    }

    /// Mark `router` as the bound of the cycles passing through it.
    pub fn loop_guard(mut self, router: impl Into<String>) -> Self {
        self.loop_guards.push(router.into());
        self
    }

    pub fn terminal(mut self, name: impl Into<String>) -> Self {
        self.terminal = Some(name.into());
        self
    }

    /// Lint the graph and fail with `ConfigurationError` on any error.
    pub fn build(self) -> Result<StageGraph<S, E>> {
        let graph = self.build_unchecked();
        let diagnostics = validate_or_raise(&graph.describe())?;
        for d in &diagnostics {
            tracing::warn!(graph = %graph.name, rule = %d.rule, "{}", d.message);
        }
        Ok(graph)
    }

    /// Build without linting, for inspecting diagnostics of a draft graph.
    pub fn build_unchecked(self) -> StageGraph<S, E> {
        StageGraph {
            name: self.name,
            stages: self.stages,
            terminal: self.terminal,
            loop_guards: self.loop_guards,
        }
    }
}

// ---------------------------------------------------------------------------
// GraphDescription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum SignalDescription {
    Completed(String),
    Event(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescription {
    pub name: String,
    pub trigger: TriggerKind,
    pub listens: Vec<SignalDescription>,
    pub router: bool,
    pub emits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub from: String,
    pub to: String,
    /// Event name for router edges.
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub name: String,
    pub terminal: Option<String>,
    pub loop_guards: Vec<String>,
    pub stages: Vec<StageDescription>,
    pub edges: Vec<EdgeDescription>,
}

impl GraphDescription {
    /// Assemble a description, deriving edges from the stages' triggers.
    ///
    /// A completion signal yields one edge from the named stage. An event
    /// signal yields one labelled edge from every router that emits it.
    pub fn new(
        name: String,
        terminal: Option<String>,
        loop_guards: Vec<String>,
        stages: Vec<StageDescription>,
    ) -> Self {
        let mut edges = Vec::new();
        for stage in &stages {
            for signal in &stage.listens {
                match signal {
                    SignalDescription::Completed(from) => edges.push(EdgeDescription {
                        from: from.clone(),
                        to: stage.name.clone(),
                        label: None,
                    }),
                    SignalDescription::Event(event) => {
                        for router in stages.iter().filter(|s| s.emits.contains(event)) {
                            edges.push(EdgeDescription {
                                from: router.name.clone(),
                                to: stage.name.clone(),
                                label: Some(event.clone()),
                            });
                        }
                    }
                }
            }
        }
        Self {
            name,
            terminal,
            loop_guards,
            stages,
            edges,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageDescription> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn successors<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.from == stage)
            .map(|e| e.to.as_str())
    }

    /// Render as Graphviz DOT text.
    pub fn to_dot(&self) -> String {
        let mut out = format!("digraph \"{}\" {{\n    rankdir=TB;\n", escape(&self.name));

        for stage in &self.stages {
            let mut attrs = Vec::new();
            let shape = if stage.trigger == TriggerKind::Start {
                "Mdiamond"
            } else if self.terminal.as_deref() == Some(stage.name.as_str()) {
                "Msquare"
            } else if stage.router {
                "diamond"
            } else {
                "box"
            };
            attrs.push(format!("shape={shape}"));
            match stage.trigger {
                TriggerKind::ListenOnAny => {
                    attrs.push(format!("label=\"{}\\n[any]\"", escape(&stage.name)))
                }
                TriggerKind::ListenOnAll => {
                    attrs.push(format!("label=\"{}\\n[all]\"", escape(&stage.name)))
                }
                _ => {}
            }
            if self.loop_guards.contains(&stage.name) {
                attrs.push("peripheries=2".into());
            }
            out.push_str(&format!(
                "    \"{}\" [{}];\n",
                escape(&stage.name),
                attrs.join(", ")
            ));
        }

        for edge in &self.edges {
            match &edge.label {
                Some(label) => out.push_str(&format!(
                    "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                    escape(&edge.from),
                    escape(&edge.to),
                    escape(label)
                )),
                None => out.push_str(&format!(
                    "    \"{}\" -> \"{}\";\n",
                    escape(&edge.from),
                    escape(&edge.to)
                )),
            }
        }

        out.push_str("}\n");
        out
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
