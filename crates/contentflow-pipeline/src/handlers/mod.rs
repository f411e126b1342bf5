//! Stage handlers for the content graph.

pub mod finalize;
pub mod generate;
pub mod init;
pub mod quality;
pub mod research;
pub mod route;

pub use finalize::FinalizeStage;
pub use generate::GenerateStage;
pub use init::InitStage;
pub use quality::{GateKind, QualityGateStage};
pub use research::ResearchStage;
pub use route::{ResearchRouter, ScoreRouter};

use std::sync::Arc;

use contentflow_llm::{Generated, GenerationRequest, GenerationService};
use contentflow_tools::{truncate_chars, TruncationMode};
use contentflow_types::Result;

use crate::config::PipelineConfig;
use crate::handler::StageContext;
use crate::retry::{execute_with_retry, BackoffPolicy};

/// Characters of raw model output quoted in parse errors.
const RAW_EXCERPT_CHARS: usize = 400;

// ---------------------------------------------------------------------------
// CallSettings: how stages talk to the generation service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CallSettings {
    pub retries: usize,
    pub backoff: BackoffPolicy,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CallSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            retries: config.call_retries,
            backoff: config.backoff.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn apply(&self, request: GenerationRequest) -> GenerationRequest {
        request
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }
}

/// One generation call with transient failures retried.
async fn generate_with_retry(
    service: &Arc<dyn GenerationService>,
    request: GenerationRequest,
    settings: &CallSettings,
    ctx: &StageContext,
) -> Result<Generated> {
    let request = settings.apply(request);
    let service = service.as_ref();
    execute_with_retry(
        move || service.generate(request.clone()),
        settings.retries,
        &settings.backoff,
        ctx.stage(),
        ctx.emitter(),
    )
    .await
}

/// Short excerpt of raw output for error messages.
fn excerpt(generated: &Generated) -> String {
    truncate_chars(&generated.as_text(), RAW_EXCERPT_CHARS, TruncationMode::HeadTail)
}
