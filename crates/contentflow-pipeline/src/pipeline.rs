//! The content graph and the `ContentPipeline` entry point.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use contentflow_llm::GenerationService;
use contentflow_tools::SearchTool;
use contentflow_types::{
    validate_and_initialize, ArticleArtifact, ContentType, ContentflowError, PipelineState,
    ProfessionalPostArtifact, Result, RunReport, ShortPostArtifact,
};

use crate::config::PipelineConfig;
use crate::engine::PipelineExecutor;
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::{RouteEvent, Signal, StageGraph, StageGraphBuilder, Trigger};
use crate::handlers::{
    CallSettings, FinalizeStage, GateKind, GenerateStage, InitStage, QualityGateStage,
    ResearchRouter, ResearchStage, ScoreRouter,
};

// ---------------------------------------------------------------------------
// ContentEvent
// ---------------------------------------------------------------------------

/// Router events of the content graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEvent {
    MakeShortPost,
    MakeArticle,
    MakeProfessionalPost,
    RemakeShortPost,
    RemakeArticle,
    RemakeProfessionalPost,
    Accepted,
}

impl ContentEvent {
    pub fn make(content_type: ContentType) -> Self {
        match content_type {
            ContentType::ShortPost => ContentEvent::MakeShortPost,
            ContentType::Article => ContentEvent::MakeArticle,
            ContentType::ProfessionalPost => ContentEvent::MakeProfessionalPost,
        }
    }

    pub fn remake(content_type: ContentType) -> Self {
        match content_type {
            ContentType::ShortPost => ContentEvent::RemakeShortPost,
            ContentType::Article => ContentEvent::RemakeArticle,
            ContentType::ProfessionalPost => ContentEvent::RemakeProfessionalPost,
        }
    }
}

impl RouteEvent for ContentEvent {
    fn name(&self) -> &'static str {
        match self {
            ContentEvent::MakeShortPost => "make_tweet",
            ContentEvent::MakeArticle => "make_blog",
            ContentEvent::MakeProfessionalPost => "make_linkedin_post",
            ContentEvent::RemakeShortPost => "remake_tweet",
            ContentEvent::RemakeArticle => "remake_blog",
            ContentEvent::RemakeProfessionalPost => "remake_linkedin_post",
            ContentEvent::Accepted => "accepted",
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

pub const TERMINAL_STAGE: &str = "finalize";

/// Epochs a run needs when every regenerate cycle is used.
///
/// init, research, route, generate, score, decide, then three per cycle,
/// then finalize.
pub fn epoch_budget(max_retries: u32) -> usize {
    7 + 3 * max_retries as usize
}

fn generator_trigger(content_type: ContentType) -> Trigger<ContentEvent> {
    Trigger::ListenOnAny(vec![
        Signal::Event(ContentEvent::make(content_type)),
        Signal::Event(ContentEvent::remake(content_type)),
    ])
}

/// Build the validated content graph.
pub fn content_graph(
    service: Arc<dyn GenerationService>,
    search: Arc<dyn SearchTool>,
    config: &PipelineConfig,
) -> Result<StageGraph<PipelineState, ContentEvent>> {
    let settings = CallSettings::from_config(config);
    StageGraphBuilder::new("content_pipeline")
        .stage("init", Trigger::Start, InitStage)
        .stage(
            "conduct_research",
            Trigger::after("init"),
            ResearchStage::new(search, config.research_budget_chars, settings.clone()),
        )
        .router(
            "research_router",
            Trigger::after("conduct_research"),
            ContentType::ALL.map(ContentEvent::make),
            ResearchRouter,
        )
        .stage(
            "make_short_post",
            generator_trigger(ContentType::ShortPost),
            GenerateStage::<ShortPostArtifact>::new(service.clone(), settings.clone()),
        )
        .stage(
            "make_article",
            generator_trigger(ContentType::Article),
            GenerateStage::<ArticleArtifact>::new(service.clone(), settings.clone()),
        )
        .stage(
            "make_professional_post",
            generator_trigger(ContentType::ProfessionalPost),
            GenerateStage::<ProfessionalPostArtifact>::new(service.clone(), settings.clone()),
        )
        .stage(
            "check_seo",
            Trigger::after("make_article"),
            QualityGateStage::new(GateKind::Seo, service.clone(), settings.clone()),
        )
        .stage(
            "check_virality",
            Trigger::ListenOnAny(vec![
                Signal::completed("make_short_post"),
                Signal::completed("make_professional_post"),
            ]),
            QualityGateStage::new(GateKind::Virality, service, settings),
        )
        .router(
            "score_router",
            Trigger::ListenOnAny(vec![
                Signal::completed("check_seo"),
                Signal::completed("check_virality"),
            ]),
            std::iter::once(ContentEvent::Accepted).chain(ContentType::ALL.map(ContentEvent::remake)),
            ScoreRouter::new(config.threshold, config.max_retries),
        )
        .loop_guard("score_router")
        .stage(TERMINAL_STAGE, Trigger::on(ContentEvent::Accepted), FinalizeStage)
        .terminal(TERMINAL_STAGE)
        .build()
}

// ---------------------------------------------------------------------------
// ContentPipeline
// ---------------------------------------------------------------------------

/// Raw inputs of one run. Validated when the run starts.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub content_type: String,
    pub topic: String,
}

impl RunRequest {
    pub fn new(content_type: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            topic: topic.into(),
        }
    }

    /// Check the inputs and build the initial run state.
    pub fn validate(&self) -> Result<PipelineState> {
        validate_and_initialize(&self.content_type, &self.topic)
    }
}

/// A built content graph plus the settings every run uses.
///
/// Runs share nothing mutable, so one pipeline can serve concurrent runs.
pub struct ContentPipeline {
    graph: StageGraph<PipelineState, ContentEvent>,
    config: PipelineConfig,
    emitter: EventEmitter,
}

impl ContentPipeline {
    pub fn new(
        service: Arc<dyn GenerationService>,
        search: Arc<dyn SearchTool>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let needed = epoch_budget(config.max_retries);
        if config.max_epochs < needed {
            return Err(ContentflowError::ConfigurationError(format!(
                "max_epochs {} cannot fit {} regenerate cycles (needs at least {needed})",
                config.max_epochs, config.max_retries
            )));
        }
        let graph = content_graph(service, search, &config)?;
        Ok(Self {
            graph,
            config,
            emitter: EventEmitter::default(),
        })
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.emitter.subscribe()
    }

    pub fn graph(&self) -> &StageGraph<PipelineState, ContentEvent> {
        &self.graph
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run with an external cancellation token. Cancellation takes effect
    /// before the next stage starts.
    pub async fn run_with_cancel(
        &self,
        request: RunRequest,
        token: CancellationToken,
    ) -> Result<RunReport> {
        let state = request.validate()?;
        let run_id = Uuid::new_v4();
        let started_at = chrono::Utc::now();

        let mut executor = PipelineExecutor::new(self.config.max_epochs)
            .with_emitter(self.emitter.clone())
            .with_cancellation(token);
        if let Some(timeout) = self.config.timeout {
            executor = executor.with_timeout(timeout);
        }

        let outcome = executor.run(&self.graph, state, run_id).await?;
        let state = outcome.state;
        let artifact = state.artifact().cloned().ok_or_else(|| {
            ContentflowError::ConfigurationError("run finished without an artifact".into())
        })?;

        Ok(RunReport {
            run_id,
            content_type: state.content_type(),
            topic: state.topic().to_string(),
            artifact,
            score: state.score().cloned(),
            retry_count: state.retry_count(),
            warnings: outcome.warnings,
            trace: outcome.trace,
            epochs: outcome.epochs,
            started_at,
            finished_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentflow_llm::{Generated, GenerationRequest};
    use contentflow_tools::StaticSearchTool;

    struct Silent;

    #[async_trait::async_trait]
    impl GenerationService for Silent {
        async fn generate(&self, _request: GenerationRequest) -> Result<Generated> {
            Ok(Generated::Text(String::new()))
        }
    }

    fn pipeline(config: PipelineConfig) -> Result<ContentPipeline> {
        ContentPipeline::new(Arc::new(Silent), Arc::new(StaticSearchTool::new("notes")), config)
    }

    #[test]
    fn event_names_are_stable() {
        assert_eq!(ContentEvent::make(ContentType::ShortPost).name(), "make_tweet");
        assert_eq!(ContentEvent::remake(ContentType::Article).name(), "remake_blog");
        assert_eq!(
            ContentEvent::remake(ContentType::ProfessionalPost).name(),
            "remake_linkedin_post"
        );
        assert_eq!(ContentEvent::Accepted.name(), "accepted");
    }

    #[test]
    fn content_graph_is_valid() {
        let p = pipeline(PipelineConfig::default()).unwrap();
        let graph = p.graph();
        assert_eq!(graph.stages().len(), 10);
        assert_eq!(graph.terminal(), Some(TERMINAL_STAGE));
        assert_eq!(graph.loop_guards(), ["score_router".to_string()]);
        let diagnostics = crate::validation::validate(&graph.describe());
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
    }

    #[test]
    fn research_router_declares_every_make_event() {
        let p = pipeline(PipelineConfig::default()).unwrap();
        let router = p.graph().stage("research_router").unwrap();
        assert!(router.is_router());
        for ct in ContentType::ALL {
            assert!(router.may_emit(ContentEvent::make(ct)));
            assert!(!router.may_emit(ContentEvent::remake(ct)));
        }
    }

    #[test]
    fn epoch_budget_must_fit_retries() {
        assert_eq!(epoch_budget(0), 7);
        assert_eq!(epoch_budget(3), 16);
        let tight = PipelineConfig {
            max_epochs: 15,
            ..Default::default()
        };
        let err = pipeline(tight).err().unwrap();
        assert!(matches!(err, ContentflowError::ConfigurationError(_)));
        let exact = PipelineConfig {
            max_epochs: 16,
            ..Default::default()
        };
        assert!(pipeline(exact).is_ok());
    }

    #[test]
    fn run_request_validates_inputs() {
        let state = RunRequest::new("blog", "rust").validate().unwrap();
        assert_eq!(state.content_type(), ContentType::Article);
        assert_eq!(state.max_length(), 800);

        let err = RunRequest::new("podcast", "rust").validate().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        let err = RunRequest::new("tweet", "   ").validate().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = PipelineConfig {
            threshold: 11,
            ..Default::default()
        };
        assert!(pipeline(bad).is_err());
    }
}
