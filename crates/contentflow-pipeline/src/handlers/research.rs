//! Research stage: one search call, cut to the research budget.

use std::sync::Arc;

use async_trait::async_trait;

use contentflow_tools::{truncate_chars, SearchTool, TruncationMode};
use contentflow_types::{PipelineState, Result};

use crate::handler::{StageContext, StageHandler, StageResult};
use crate::handlers::CallSettings;
use crate::pipeline::ContentEvent;
use crate::prompts;
use crate::retry::execute_with_retry;

/// Searches the topic and stores the result, cut to the research budget.
pub struct ResearchStage {
    tool: Arc<dyn SearchTool>,
    budget_chars: usize,
    settings: CallSettings,
}

impl ResearchStage {
    pub fn new(tool: Arc<dyn SearchTool>, budget_chars: usize, settings: CallSettings) -> Self {
        Self {
            tool,
            budget_chars,
            settings,
        }
    }
}

#[async_trait]
impl StageHandler<PipelineState, ContentEvent> for ResearchStage {
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &mut StageContext,
    ) -> Result<StageResult<ContentEvent>> {
        let query = prompts::research_query(state.topic());
        let tool = self.tool.as_ref();
        tracing::info!(stage = %ctx.stage(), tool = %tool.name(), query = %query, "Researching topic");

        let q = query.as_str();
        let raw = execute_with_retry(
            move || tool.search(q),
            self.settings.retries,
            &self.settings.backoff,
            ctx.stage(),
            ctx.emitter(),
        )
        .await?;

        let notes = truncate_chars(&raw, self.budget_chars, TruncationMode::Head);
        tracing::debug!(
            raw_chars = raw.chars().count(),
            kept_chars = notes.chars().count(),
            "Research collected"
        );
        state.set_research(notes)?;
        Ok(StageResult::Completed)
    }
}
