//! Router stages: pick the generator, then accept or send back for revision.

use async_trait::async_trait;

use contentflow_types::{ContentflowError, PipelineState, Result, WarningKind};

use crate::events::PipelineEvent;
use crate::graph::RouteEvent;
use crate::handler::{StageContext, StageHandler, StageResult};
use crate::pipeline::ContentEvent;

/// Routes to the generator for the run's content type.
pub struct ResearchRouter;

#[async_trait]
impl StageHandler<PipelineState, ContentEvent> for ResearchRouter {
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &mut StageContext,
    ) -> Result<StageResult<ContentEvent>> {
        let event = ContentEvent::make(state.content_type());
        tracing::debug!(stage = %ctx.stage(), event = event.name(), "Routing to generator");
        Ok(StageResult::Routed(event))
    }
}

/// Quality decision after each scoring pass.
///
/// `value >= threshold` accepts. Below it the artifact goes back to its
/// generator while `retry_count < max_retries`; once the bound is reached the
/// last artifact is accepted anyway and a `MaxRetriesExceeded` warning is
/// recorded.
pub struct ScoreRouter {
    threshold: u8,
    max_retries: u32,
}

impl ScoreRouter {
    pub fn new(threshold: u8, max_retries: u32) -> Self {
        Self {
            threshold,
            max_retries,
        }
    }
}

#[async_trait]
impl StageHandler<PipelineState, ContentEvent> for ScoreRouter {
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &mut StageContext,
    ) -> Result<StageResult<ContentEvent>> {
        let value = state
            .score()
            .map(|s| s.value)
            .ok_or_else(|| {
                ContentflowError::ConfigurationError(
                    "score router ran before any score was recorded".into(),
                )
            })?;

        if value >= self.threshold {
            tracing::info!(stage = %ctx.stage(), score = value, threshold = self.threshold, "Content accepted");
            return Ok(StageResult::Routed(ContentEvent::Accepted));
        }

        if state.retry_count() < self.max_retries {
            let retry_count = state.record_retry();
            tracing::info!(
                stage = %ctx.stage(),
                score = value,
                threshold = self.threshold,
                retry_count,
                "Score below threshold, regenerating"
            );
            ctx.emit(PipelineEvent::RegenerateRequested {
                stage: ctx.stage().to_string(),
                score: value,
                retry_count,
            });
            return Ok(StageResult::Routed(ContentEvent::remake(state.content_type())));
        }

        let retry_count = state.retry_count();
        ctx.warn(
            WarningKind::MaxRetriesExceeded,
            format!(
                "score {value} still below threshold {} after {retry_count} regenerations; accepting last draft",
                self.threshold
            ),
        );
        ctx.emit(PipelineEvent::Degraded {
            stage: ctx.stage().to_string(),
            score: value,
            retry_count,
        });
        Ok(StageResult::Routed(ContentEvent::Accepted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventEmitter;
    use contentflow_types::{validate_and_initialize, Artifact, Score, ShortPostArtifact};
    use uuid::Uuid;

    fn scored(value: u8) -> PipelineState {
        let mut state = validate_and_initialize("tweet", "rust").unwrap();
        state
            .replace_artifact(Artifact::ShortPost(ShortPostArtifact {
                content: "hello".into(),
                hashtags: "#rust".into(),
            }))
            .unwrap();
        state
            .set_score(Score {
                value,
                reason: "because".into(),
            })
            .unwrap();
        state
    }

    fn ctx() -> StageContext {
        StageContext::new(Uuid::new_v4(), 4, "score_router", EventEmitter::default())
    }

    #[tokio::test]
    async fn research_router_picks_generator_by_type() {
        let mut state = validate_and_initialize("linkedin", "rust").unwrap();
        let result = ResearchRouter.execute(&mut state, &mut ctx()).await.unwrap();
        assert_eq!(result, StageResult::Routed(ContentEvent::MakeProfessionalPost));
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let mut state = scored(8);
        let result = ScoreRouter::new(8, 3).execute(&mut state, &mut ctx()).await.unwrap();
        assert_eq!(result, StageResult::Routed(ContentEvent::Accepted));
        assert_eq!(state.retry_count(), 0);
    }

    #[tokio::test]
    async fn low_score_requests_remake_and_counts() {
        let mut state = scored(5);
        let mut c = ctx();
        let mut rx = c.emitter().subscribe();
        let result = ScoreRouter::new(8, 3).execute(&mut state, &mut c).await.unwrap();
        assert_eq!(result, StageResult::Routed(ContentEvent::RemakeShortPost));
        assert_eq!(state.retry_count(), 1);
        match rx.try_recv().unwrap() {
            PipelineEvent::RegenerateRequested { score, retry_count, .. } => {
                assert_eq!(score, 5);
                assert_eq!(retry_count, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_to_accept() {
        let mut state = scored(2);
        let router = ScoreRouter::new(8, 1);
        router.execute(&mut state, &mut ctx()).await.unwrap();
        assert_eq!(state.retry_count(), 1);

        let mut c = ctx();
        let result = router.execute(&mut state, &mut c).await.unwrap();
        assert_eq!(result, StageResult::Routed(ContentEvent::Accepted));
        assert_eq!(state.retry_count(), 1);
        assert_eq!(c.warnings().len(), 1);
        assert_eq!(c.warnings()[0].kind, WarningKind::MaxRetriesExceeded);
    }

    #[tokio::test]
    async fn zero_retries_accepts_first_draft() {
        let mut state = scored(0);
        let mut c = ctx();
        let result = ScoreRouter::new(8, 0).execute(&mut state, &mut c).await.unwrap();
        assert_eq!(result, StageResult::Routed(ContentEvent::Accepted));
        assert_eq!(c.warnings().len(), 1);
    }

    #[tokio::test]
    async fn missing_score_is_configuration_error() {
        let mut state = validate_and_initialize("tweet", "rust").unwrap();
        let err = ScoreRouter::new(8, 3).execute(&mut state, &mut ctx()).await.unwrap_err();
        assert!(matches!(err, ContentflowError::ConfigurationError(_)));
    }
}
