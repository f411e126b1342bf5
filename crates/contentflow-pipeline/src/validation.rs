//! Graph validation: lint rules and diagnostics.
//!
//! Rules run over a [`GraphDescription`], so they see exactly what
//! `describe()` exports. Call [`validate`] for advisory diagnostics or
//! [`validate_or_raise`] to fail on any `Error`-severity issue.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use contentflow_types::{ContentflowError, Result};

use crate::graph::{GraphDescription, SignalDescription, TriggerKind};

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub stage: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic>;
}

fn error(rule: &dyn LintRule, stage: Option<&str>, message: String, fix: &str) -> Diagnostic {
    Diagnostic {
        rule: rule.name().into(),
        severity: Severity::Error,
        message,
        stage: stage.map(String::from),
        fix: Some(fix.into()),
    }
}

fn warning(rule: &dyn LintRule, stage: Option<&str>, message: String, fix: &str) -> Diagnostic {
    Diagnostic {
        severity: Severity::Warning,
        ..error(rule, stage, message, fix)
    }
}

fn listened_events(graph: &GraphDescription) -> HashSet<&str> {
    graph
        .stages
        .iter()
        .flat_map(|s| s.listens.iter())
        .filter_map(|sig| match sig {
            SignalDescription::Event(e) => Some(e.as_str()),
            SignalDescription::Completed(_) => None,
        })
        .collect()
}

fn guard_routers(graph: &GraphDescription) -> HashSet<&str> {
    graph
        .loop_guards
        .iter()
        .filter(|g| graph.stage(g).is_some_and(|s| s.router))
        .map(String::as_str)
        .collect()
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct StartStageRule;
impl LintRule for StartStageRule {
    fn name(&self) -> &str { "start_stage" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        let starts: Vec<_> = graph
            .stages
            .iter()
            .filter(|s| s.trigger == TriggerKind::Start)
            .map(|s| s.name.as_str())
            .collect();
        match starts.len() {
            1 => vec![],
            0 => vec![error(
                self,
                None,
                "Graph has no start stage".into(),
                "Declare exactly one stage with Trigger::Start",
            )],
            n => vec![error(
                self,
                None,
                format!("Graph has {n} start stages: {}; expected exactly one", starts.join(", ")),
                "Keep a single Trigger::Start stage",
            )],
        }
    }
}

struct TerminalStageRule;
impl LintRule for TerminalStageRule {
    fn name(&self) -> &str { "terminal_stage" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        match graph.terminal.as_deref() {
            None => vec![error(
                self,
                None,
                "Graph has no terminal stage".into(),
                "Call terminal(name) on the builder",
            )],
            Some(t) if graph.stage(t).is_none() => vec![error(
                self,
                Some(t),
                format!("Terminal stage '{t}' is not declared"),
                "Point terminal(name) at an existing stage",
            )],
            Some(_) => vec![],
        }
    }
}

struct DuplicateStageRule;
impl LintRule for DuplicateStageRule {
    fn name(&self) -> &str { "duplicate_stage" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        graph
            .stages
            .iter()
            .filter(|s| !seen.insert(s.name.as_str()) && reported.insert(s.name.as_str()))
            .map(|s| {
                error(
                    self,
                    Some(&s.name),
                    format!("Stage '{}' is declared more than once", s.name),
                    "Give every stage a unique name",
                )
            })
            .collect()
    }
}

struct UnknownPredecessorRule;
impl LintRule for UnknownPredecessorRule {
    fn name(&self) -> &str { "unknown_predecessor" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for stage in &graph.stages {
            for sig in &stage.listens {
                if let SignalDescription::Completed(pred) = sig {
                    if graph.stage(pred).is_none() {
                        diags.push(error(
                            self,
                            Some(&stage.name),
                            format!("Stage '{}' listens on unknown stage '{pred}'", stage.name),
                            "Declare the predecessor or fix the trigger",
                        ));
                    }
                }
            }
        }
        diags
    }
}

struct EmptyFanInRule;
impl LintRule for EmptyFanInRule {
    fn name(&self) -> &str { "empty_fan_in" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        graph
            .stages
            .iter()
            .filter(|s| {
                matches!(s.trigger, TriggerKind::ListenOnAny | TriggerKind::ListenOnAll)
                    && s.listens.is_empty()
            })
            .map(|s| {
                error(
                    self,
                    Some(&s.name),
                    format!("Stage '{}' has a fan-in trigger with no signals", s.name),
                    "List at least one signal or use ListenOn",
                )
            })
            .collect()
    }
}

struct RouterEventsRule;
impl LintRule for RouterEventsRule {
    fn name(&self) -> &str { "router_events" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        graph
            .stages
            .iter()
            .filter(|s| s.router && s.emits.is_empty())
            .map(|s| {
                error(
                    self,
                    Some(&s.name),
                    format!("Router '{}' declares no events", s.name),
                    "Declare the events the router may emit",
                )
            })
            .collect()
    }
}

struct UnheardEventRule;
impl LintRule for UnheardEventRule {
    fn name(&self) -> &str { "unheard_event" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        let listened = listened_events(graph);
        let mut diags = Vec::new();
        for stage in graph.stages.iter().filter(|s| s.router) {
            for event in &stage.emits {
                if !listened.contains(event.as_str()) {
                    diags.push(error(
                        self,
                        Some(&stage.name),
                        format!("Router '{}' emits '{event}' but no stage listens for it", stage.name),
                        "Add a listener for the event or drop it from the router",
                    ));
                }
            }
        }
        diags
    }
}

struct UnemittedEventRule;
impl LintRule for UnemittedEventRule {
    fn name(&self) -> &str { "unemitted_event" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        let emitted: HashSet<&str> = graph
            .stages
            .iter()
            .flat_map(|s| s.emits.iter().map(String::as_str))
            .collect();
        let mut diags = Vec::new();
        for stage in &graph.stages {
            for sig in &stage.listens {
                if let SignalDescription::Event(event) = sig {
                    if !emitted.contains(event.as_str()) {
                        diags.push(error(
                            self,
                            Some(&stage.name),
                            format!("Stage '{}' listens for '{event}' but no router emits it", stage.name),
                            "Declare the event on a router or fix the trigger",
                        ));
                    }
                }
            }
        }
        diags
    }
}

struct ReachabilityRule;
impl LintRule for ReachabilityRule {
    fn name(&self) -> &str { "reachability" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        let start = match graph.stages.iter().find(|s| s.trigger == TriggerKind::Start) {
            Some(s) => s.name.as_str(),
            None => return vec![], // StartStageRule will catch this
        };

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            for next in graph.successors(current) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        graph
            .stages
            .iter()
            .filter(|s| !visited.contains(s.name.as_str()))
            .map(|s| {
                warning(
                    self,
                    Some(&s.name),
                    format!("Stage '{}' is not reachable from the start stage", s.name),
                    "Connect the stage or remove it",
                )
            })
            .collect()
    }
}

struct LoopGuardTargetRule;
impl LintRule for LoopGuardTargetRule {
    fn name(&self) -> &str { "loop_guard_target" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        graph
            .loop_guards
            .iter()
            .filter(|g| !graph.stage(g).is_some_and(|s| s.router))
            .map(|g| {
                error(
                    self,
                    Some(g),
                    format!("Loop guard '{g}' is not a router"),
                    "Only routers can bound a cycle",
                )
            })
            .collect()
    }
}

/// Every cycle must pass through a loop-guard router, which is what bounds it.
struct UnguardedCycleRule;
impl LintRule for UnguardedCycleRule {
    fn name(&self) -> &str { "unguarded_cycle" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        let guards = guard_routers(graph);

        // A stage is on an unguarded cycle if it can reach itself while
        // stepping only through non-guard stages.
        let on_cycle: Vec<&str> = graph
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| !guards.contains(name))
            .filter(|name| {
                let mut visited = HashSet::new();
                let mut queue: VecDeque<&str> = graph.successors(name).collect();
                while let Some(current) = queue.pop_front() {
                    if current == *name {
                        return true;
                    }
                    if guards.contains(current) || !visited.insert(current) {
                        continue;
                    }
                    queue.extend(graph.successors(current));
                }
                false
            })
            .collect();

        if on_cycle.is_empty() {
            return vec![];
        }
        vec![error(
            self,
            on_cycle.first().copied(),
            format!(
                "Cycle through {} has no loop-guard router to bound it",
                on_cycle.join(", ")
            ),
            "Route the cycle through a router marked with loop_guard(name)",
        )]
    }
}

struct TerminalNoSuccessorsRule;
impl LintRule for TerminalNoSuccessorsRule {
    fn name(&self) -> &str { "terminal_no_successors" }
    fn apply(&self, graph: &GraphDescription) -> Vec<Diagnostic> {
        let Some(terminal) = graph.terminal.as_deref() else {
            return vec![];
        };
        let listeners: Vec<&str> = graph.successors(terminal).collect();
        if listeners.is_empty() {
            return vec![];
        }
        vec![warning(
            self,
            Some(terminal),
            format!(
                "Terminal stage '{terminal}' has listeners ({}) that will never run",
                listeners.join(", ")
            ),
            "Remove the listeners; a run stops once the terminal stage completes",
        )]
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn validate(graph: &GraphDescription) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(StartStageRule),
        Box::new(TerminalStageRule),
        Box::new(DuplicateStageRule),
        Box::new(UnknownPredecessorRule),
        Box::new(EmptyFanInRule),
        Box::new(RouterEventsRule),
        Box::new(UnheardEventRule),
        Box::new(UnemittedEventRule),
        Box::new(ReachabilityRule),
        Box::new(LoopGuardTargetRule),
        Box::new(UnguardedCycleRule),
        Box::new(TerminalNoSuccessorsRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(graph: &GraphDescription) -> Result<Vec<Diagnostic>> {
    let diagnostics = validate(graph);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.as_str())
        .collect();
    if !errors.is_empty() {
        return Err(ContentflowError::ConfigurationError(format!(
            "graph '{}' is invalid: {}",
            graph.name,
            errors.join("; ")
        )));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StageDescription;

    fn completed(name: &str) -> SignalDescription {
        SignalDescription::Completed(name.into())
    }

    fn event(name: &str) -> SignalDescription {
        SignalDescription::Event(name.into())
    }

    fn stage(name: &str, trigger: TriggerKind, listens: Vec<SignalDescription>) -> StageDescription {
        StageDescription {
            name: name.into(),
            trigger,
            listens,
            router: false,
            emits: vec![],
        }
    }

    fn router(name: &str, listens: Vec<SignalDescription>, emits: &[&str]) -> StageDescription {
        StageDescription {
            router: true,
            emits: emits.iter().map(|e| e.to_string()).collect(),
            ..stage(name, TriggerKind::ListenOn, listens)
        }
    }

    fn graph(stages: Vec<StageDescription>, terminal: Option<&str>, guards: &[&str]) -> GraphDescription {
        GraphDescription::new(
            "test".into(),
            terminal.map(String::from),
            guards.iter().map(|g| g.to_string()).collect(),
            stages,
        )
    }

    /// start -> work -> gate --(retry)--> work, gate --(ok)--> done
    fn looping(guards: &[&str]) -> GraphDescription {
        graph(
            vec![
                stage("start", TriggerKind::Start, vec![]),
                stage("work", TriggerKind::ListenOnAny, vec![completed("start"), event("retry")]),
                router("gate", vec![completed("work")], &["retry", "ok"]),
                stage("done", TriggerKind::ListenOn, vec![event("ok")]),
            ],
            Some("done"),
            guards,
        )
    }

    fn has(diags: &[Diagnostic], rule: &str, severity: Severity) -> bool {
        diags.iter().any(|d| d.rule == rule && d.severity == severity)
    }

    #[test]
    fn guarded_loop_passes() {
        let diags = validate(&looping(&["gate"]));
        assert!(diags.is_empty(), "Expected no diagnostics, got: {diags:?}");
    }

    #[test]
    fn unguarded_loop_is_error() {
        let diags = validate(&looping(&[]));
        let d = diags.iter().find(|d| d.rule == "unguarded_cycle").unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains("work"));
        assert!(d.message.contains("gate"));
    }

    #[test]
    fn guard_on_plain_stage_is_error() {
        let diags = validate(&looping(&["work"]));
        assert!(has(&diags, "loop_guard_target", Severity::Error));
        assert!(has(&diags, "unguarded_cycle", Severity::Error));
    }

    #[test]
    fn missing_or_multiple_start_stage_error() {
        let none = graph(vec![stage("done", TriggerKind::ListenOn, vec![completed("x")])], Some("done"), &[]);
        assert!(has(&validate(&none), "start_stage", Severity::Error));

        let two = graph(
            vec![
                stage("a", TriggerKind::Start, vec![]),
                stage("b", TriggerKind::Start, vec![]),
            ],
            Some("b"),
            &[],
        );
        let diags = validate(&two);
        assert!(diags.iter().any(|d| d.rule == "start_stage" && d.message.contains("a, b")));
    }

    #[test]
    fn missing_or_unknown_terminal_error() {
        let g = graph(vec![stage("start", TriggerKind::Start, vec![])], None, &[]);
        assert!(has(&validate(&g), "terminal_stage", Severity::Error));

        let g = graph(vec![stage("start", TriggerKind::Start, vec![])], Some("nowhere"), &[]);
        assert!(has(&validate(&g), "terminal_stage", Severity::Error));
    }

    #[test]
    fn duplicate_stage_reported_once() {
        let g = graph(
            vec![
                stage("start", TriggerKind::Start, vec![]),
                stage("x", TriggerKind::ListenOn, vec![completed("start")]),
                stage("x", TriggerKind::ListenOn, vec![completed("start")]),
                stage("x", TriggerKind::ListenOn, vec![completed("start")]),
            ],
            Some("x"),
            &[],
        );
        let count = validate(&g).iter().filter(|d| d.rule == "duplicate_stage").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn unknown_predecessor_error() {
        let g = graph(
            vec![
                stage("start", TriggerKind::Start, vec![]),
                stage("done", TriggerKind::ListenOn, vec![completed("ghost")]),
            ],
            Some("done"),
            &[],
        );
        let diags = validate(&g);
        assert!(diags
            .iter()
            .any(|d| d.rule == "unknown_predecessor" && d.message.contains("ghost")));
    }

    #[test]
    fn empty_fan_in_error() {
        let g = graph(
            vec![
                stage("start", TriggerKind::Start, vec![]),
                stage("done", TriggerKind::ListenOnAll, vec![]),
            ],
            Some("done"),
            &[],
        );
        assert!(has(&validate(&g), "empty_fan_in", Severity::Error));
    }

    #[test]
    fn event_pairing_errors() {
        let g = graph(
            vec![
                stage("start", TriggerKind::Start, vec![]),
                router("pick", vec![completed("start")], &["left", "shout"]),
                stage("left", TriggerKind::ListenOn, vec![event("left")]),
                stage("done", TriggerKind::ListenOnAny, vec![completed("left"), event("whisper")]),
            ],
            Some("done"),
            &[],
        );
        let diags = validate(&g);
        assert!(diags
            .iter()
            .any(|d| d.rule == "unheard_event" && d.message.contains("shout")));
        assert!(diags
            .iter()
            .any(|d| d.rule == "unemitted_event" && d.message.contains("whisper")));
    }

    #[test]
    fn router_without_events_error() {
        let g = graph(
            vec![
                stage("start", TriggerKind::Start, vec![]),
                router("done", vec![completed("start")], &[]),
            ],
            Some("done"),
            &[],
        );
        assert!(has(&validate(&g), "router_events", Severity::Error));
    }

    #[test]
    fn unreachable_stage_is_warning() {
        let g = graph(
            vec![
                stage("start", TriggerKind::Start, vec![]),
                stage("done", TriggerKind::ListenOn, vec![completed("start")]),
                stage("orphan", TriggerKind::ListenOn, vec![completed("island")]),
                stage("island", TriggerKind::ListenOn, vec![completed("orphan")]),
            ],
            Some("done"),
            &[],
        );
        let diags = validate(&g);
        assert!(diags.iter().any(|d| d.rule == "reachability"
            && d.severity == Severity::Warning
            && d.stage.as_deref() == Some("orphan")));
        // The island pair also forms a cycle without a guard.
        assert!(has(&diags, "unguarded_cycle", Severity::Error));
    }

    #[test]
    fn terminal_with_listeners_is_warning() {
        let g = graph(
            vec![
                stage("start", TriggerKind::Start, vec![]),
                stage("done", TriggerKind::ListenOn, vec![completed("start")]),
                stage("after", TriggerKind::ListenOn, vec![completed("done")]),
            ],
            Some("done"),
            &[],
        );
        assert!(has(&validate(&g), "terminal_no_successors", Severity::Warning));
    }

    #[test]
    fn validate_or_raise_returns_configuration_error() {
        let err = validate_or_raise(&looping(&[])).unwrap_err();
        match err {
            ContentflowError::ConfigurationError(msg) => {
                assert!(msg.contains("graph 'test' is invalid"));
                assert!(msg.contains("loop-guard"));
            }
            other => panic!("Expected ConfigurationError, got: {other:?}"),
        }
        assert!(validate_or_raise(&looping(&["gate"])).unwrap().is_empty());
    }
}
