//! Quality gate stages: score the current artifact for SEO or virality.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use contentflow_llm::{parse_structured, GenerationRequest, GenerationService, ResponseShape};
use contentflow_types::{ContentflowError, PipelineState, Result, Score};

use crate::handler::{StageContext, StageHandler, StageResult};
use crate::handlers::{excerpt, generate_with_retry, CallSettings};
use crate::pipeline::ContentEvent;
use crate::prompts;

/// Which reviewer scores the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Articles.
    Seo,
    /// Short and professional posts.
    Virality,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::Seo => "seo",
            GateKind::Virality => "virality",
        }
    }
}

/// Scores the current artifact and stores the result in `state.score`.
pub struct QualityGateStage {
    kind: GateKind,
    service: Arc<dyn GenerationService>,
    settings: CallSettings,
}

impl QualityGateStage {
    pub fn new(kind: GateKind, service: Arc<dyn GenerationService>, settings: CallSettings) -> Self {
        Self {
            kind,
            service,
            settings,
        }
    }
}

#[async_trait]
impl StageHandler<PipelineState, ContentEvent> for QualityGateStage {
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &mut StageContext,
    ) -> Result<StageResult<ContentEvent>> {
        let artifact = state.artifact().ok_or_else(|| {
            ContentflowError::ConfigurationError(format!(
                "{} gate ran before any artifact was produced",
                self.kind.as_str()
            ))
        })?;

        let request = GenerationRequest::new(prompts::score(self.kind, artifact, &artifact.to_prompt_json()?))
            .with_system(prompts::scorer_system(self.kind))
            .with_shape(ResponseShape::new("score", Score::schema()));
        let generated = generate_with_retry(&self.service, request, &self.settings, ctx).await?;

        let parse_error = |message: String| ContentflowError::GenerationParseError {
            target: "score".into(),
            message: format!("{message}; raw output: {}", excerpt(&generated)),
        };
        let score: Score = parse_structured(&generated).map_err(parse_error)?;
        score.check_range().map_err(parse_error)?;

        tracing::info!(
            stage = %ctx.stage(),
            gate = self.kind.as_str(),
            score = score.value,
            reason = %score.reason,
            "Content scored"
        );
        state.set_score(score)?;
        Ok(StageResult::Completed)
    }
}
