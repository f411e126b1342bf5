//! The per-run state container.

use serde::{Deserialize, Serialize};

use crate::{Artifact, ContentType, ContentflowError, Result, Score};

/// Mutable record shared by every stage of one pipeline run.
///
/// Fields are private so that ownership rules hold by construction: the
/// inputs and `max_length` can only be set by [`validate_and_initialize`],
/// and every other field has a single narrow writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    // Set once at validation, read-only afterwards.
    content_type: ContentType,
    topic: String,
    max_length: usize,

    // Written once by the research stage.
    research: Option<String>,

    // Rewritten by the matching generator on every cycle.
    artifact: Option<Artifact>,

    // Written by the quality gate; cleared whenever the artifact changes.
    score: Option<Score>,

    // Incremented by the score router on each regenerate decision.
    retry_count: u32,

    // Set by the finalize stage.
    finalized: bool,
}

/// Validate raw run inputs and build the initial state.
pub fn validate_and_initialize(content_type: &str, topic: &str) -> Result<PipelineState> {
    let content_type = ContentType::parse(content_type)?;
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(ContentflowError::ValidationError(
            "the topic can't be empty".into(),
        ));
    }
    Ok(PipelineState::new(content_type, topic))
}

impl PipelineState {
    fn new(content_type: ContentType, topic: &str) -> Self {
        Self {
            content_type,
            topic: topic.to_string(),
            max_length: content_type.max_length(),
            research: None,
            artifact: None,
            score: None,
            retry_count: 0,
            finalized: false,
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn research(&self) -> Option<&str> {
        self.research.as_deref()
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn score(&self) -> Option<&Score> {
        self.score.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Store the research notes. May only happen once per run.
    pub fn set_research(&mut self, research: String) -> Result<()> {
        if self.research.is_some() {
            return Err(ContentflowError::ConfigurationError(
                "research has already been written for this run".into(),
            ));
        }
        self.research = Some(research);
        Ok(())
    }

    /// Replace the artifact, invalidating any score of the previous one.
    pub fn replace_artifact(&mut self, artifact: Artifact) -> Result<()> {
        if artifact.content_type() != self.content_type {
            return Err(ContentflowError::ConfigurationError(format!(
                "a {} artifact cannot be stored in a {} run",
                artifact.content_type(),
                self.content_type
            )));
        }
        self.score = None;
        self.artifact = Some(artifact);
        Ok(())
    }

    /// Record the score of the current artifact.
    pub fn set_score(&mut self, score: Score) -> Result<()> {
        if self.artifact.is_none() {
            return Err(ContentflowError::ConfigurationError(
                "cannot score before an artifact exists".into(),
            ));
        }
        self.score = Some(score);
        Ok(())
    }

    /// Count one more regenerate cycle and return the new total.
    pub fn record_retry(&mut self) -> u32 {
        self.retry_count += 1;
        tracing::debug!(retry_count = self.retry_count, "Regenerate cycle recorded");
        self.retry_count
    }

    pub fn mark_finalized(&mut self) -> Result<()> {
        if self.artifact.is_none() {
            return Err(ContentflowError::ConfigurationError(
                "cannot finalize a run without an artifact".into(),
            ));
        }
        self.finalized = true;
        Ok(())
    }

    /// Fold the writes a sibling stage made relative to `base` into `self`.
    ///
    /// `self` and `written` both started the epoch as copies of `base`. A field
    /// changed in both is a conflict.
    pub fn merge_writes(&mut self, base: &PipelineState, written: PipelineState) -> Result<()> {
        if written.content_type != base.content_type
            || written.topic != base.topic
            || written.max_length != base.max_length
        {
            return Err(ContentflowError::ConfigurationError(
                "validated inputs were modified during the run".into(),
            ));
        }

        fn take<T: PartialEq>(
            field: &str,
            current: &mut T,
            base: &T,
            written: T,
        ) -> Result<()> {
            if written == *base {
                return Ok(());
            }
            if *current != *base {
                return Err(ContentflowError::ConfigurationError(format!(
                    "conflicting writes to '{field}' within one epoch"
                )));
            }
            *current = written;
            Ok(())
        }

        take("research", &mut self.research, &base.research, written.research)?;
        take("artifact", &mut self.artifact, &base.artifact, written.artifact)?;
        take("score", &mut self.score, &base.score, written.score)?;
        take(
            "retry_count",
            &mut self.retry_count,
            &base.retry_count,
            written.retry_count,
        )?;
        take("finalized", &mut self.finalized, &base.finalized, written.finalized)?;
        Ok(())
    }
}
