//! Entry stage. Logs the validated inputs of the run.

use async_trait::async_trait;

use contentflow_types::{PipelineState, Result};

use crate::handler::{StageContext, StageHandler, StageResult};
use crate::pipeline::ContentEvent;

/// Start stage. Inputs were validated before the run began, so this only
/// records them.
pub struct InitStage;

#[async_trait]
impl StageHandler<PipelineState, ContentEvent> for InitStage {
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &mut StageContext,
    ) -> Result<StageResult<ContentEvent>> {
        tracing::info!(
            run_id = %ctx.run_id(),
            content_type = %state.content_type(),
            topic = %state.topic(),
            max_length = state.max_length(),
            "Content pipeline initialised"
        );
        Ok(StageResult::Completed)
    }
}
