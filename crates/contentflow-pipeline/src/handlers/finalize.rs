//! Terminal stage that seals the run state.

use async_trait::async_trait;

use contentflow_types::{PipelineState, Result};

use crate::handler::{StageContext, StageHandler, StageResult};
use crate::pipeline::ContentEvent;

/// Terminal stage.
pub struct FinalizeStage;

#[async_trait]
impl StageHandler<PipelineState, ContentEvent> for FinalizeStage {
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &mut StageContext,
    ) -> Result<StageResult<ContentEvent>> {
        state.mark_finalized()?;
        tracing::info!(
            stage = %ctx.stage(),
            content_type = %state.content_type(),
            score = ?state.score().map(|s| s.value),
            retry_count = state.retry_count(),
            "Content finalized"
        );
        Ok(StageResult::Completed)
    }
}
