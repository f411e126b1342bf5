//! Run configuration with defaults.

use std::time::Duration;

use contentflow_types::artifact::SCORE_MAX;
use contentflow_types::{ContentflowError, Result};

use crate::retry::BackoffPolicy;

/// Knobs for one `ContentPipeline`. Every run started from it shares them.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model name passed to the generation service.
    pub model: String,
    /// Minimum score (inclusive) the quality gate accepts.
    pub threshold: u8,
    /// Regenerate cycles allowed before degrading to accept.
    pub max_retries: u32,
    /// Characters of search output kept as research notes.
    pub research_budget_chars: usize,
    pub max_epochs: usize,
    /// Extra attempts for transient collaborator failures, per call.
    pub call_retries: usize,
    pub backoff: BackoffPolicy,
    /// Wall-clock budget for a whole run.
    pub timeout: Option<Duration>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-mini".into(),
            threshold: 8,
            max_retries: 3,
            research_budget_chars: 2000,
            max_epochs: 64,
            call_retries: 3,
            backoff: BackoffPolicy::default(),
            timeout: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl PipelineConfig {
    /// Reject settings no run could honour.
    pub fn validate(&self) -> Result<()> {
        if self.threshold > SCORE_MAX {
            return Err(ContentflowError::ConfigurationError(format!(
                "threshold {} is above the maximum score {}",
                self.threshold, SCORE_MAX
            )));
        }
        if self.research_budget_chars == 0 {
            return Err(ContentflowError::ConfigurationError(
                "research budget must be at least one character".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ContentflowError::ConfigurationError("model name is empty".into()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ContentflowError::ConfigurationError(format!(
                    "temperature {t} is outside 0.0..=2.0"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.threshold, 8);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.research_budget_chars, 2000);
        assert_eq!(config.max_epochs, 64);
        assert_eq!(config.model, "gpt-5-mini");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        let high = PipelineConfig {
            threshold: 11,
            ..Default::default()
        };
        assert!(matches!(high.validate(), Err(ContentflowError::ConfigurationError(_))));

        let no_budget = PipelineConfig {
            research_budget_chars: 0,
            ..Default::default()
        };
        assert!(no_budget.validate().is_err());

        let hot = PipelineConfig {
            temperature: Some(3.5),
            ..Default::default()
        };
        assert!(hot.validate().is_err());
    }
}
