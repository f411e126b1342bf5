//! Shared types, errors, state and reports for the contentflow pipeline engine.
//!
//! This crate provides the foundational types used across all other contentflow crates:
//! - `ContentflowError`: unified error taxonomy
//! - `ContentType`: the three supported kinds of content
//! - `PipelineState`: the per-run state container
//! - `Artifact`: the structured content produced for a content type
//! - `RunReport`: serializable summary of a finished run

use serde::{Deserialize, Serialize};

pub mod artifact;
pub mod report;
pub mod state;

pub use artifact::{
    ArticleArtifact, Artifact, ArtifactKind, ProfessionalPostArtifact, Score, ShortPostArtifact,
};
pub use report::{ErrorReport, RunReport, RunWarning, StageRecord, WarningKind};
pub use state::{validate_and_initialize, PipelineState};

/// Unified error type for all contentflow subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ContentflowError {
    // === Input Errors ===
    #[error("Invalid input: {0}")]
    ValidationError(String),

    // === Generation Service Errors ===
    #[error("Generation service {provider} failed (HTTP {status}): {message}")]
    GenerationServiceError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    #[error("Could not parse generated {target}: {message}")]
    GenerationParseError { target: String, message: String },

    // === Tool Errors ===
    #[error("Search tool '{tool}' failed: {message}")]
    SearchError {
        tool: String,
        message: String,
        retryable: bool,
    },

    // === Graph / Engine Errors ===
    #[error("Pipeline configuration error: {0}")]
    ConfigurationError(String),

    #[error("Stage '{stage}' failed in epoch {epoch}: {source}")]
    StageFailed {
        stage: String,
        epoch: usize,
        #[source]
        source: Box<ContentflowError>,
    },

    #[error("Epoch limit of {limit} exceeded at epoch {epoch} before reaching the terminal stage (ready: [{}])", .ready.join(", "))]
    EpochLimitExceeded {
        limit: usize,
        epoch: usize,
        /// Stages that would have run next.
        ready: Vec<String>,
    },

    #[error("Run stalled after epoch {epoch}: no stage is ready and the terminal stage has not run")]
    Stalled { epoch: usize },

    #[error("Run cancelled before stage '{stage}' (epoch {epoch})")]
    Cancelled { stage: String, epoch: usize },

    #[error("Run deadline exceeded before stage '{stage}' (epoch {epoch})")]
    DeadlineExceeded { stage: String, epoch: usize },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ContentflowError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ContentflowError::RateLimited { .. }
                | ContentflowError::RequestTimeout { .. }
                | ContentflowError::GenerationServiceError {
                    retryable: true,
                    ..
                }
                | ContentflowError::SearchError {
                    retryable: true,
                    ..
                }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContentflowError::ValidationError(_)
                | ContentflowError::AuthError { .. }
                | ContentflowError::ConfigurationError(_)
                | ContentflowError::GenerationParseError { .. }
        )
    }

    /// The innermost cause, looking through `StageFailed` wrappers.
    pub fn root_cause(&self) -> &ContentflowError {
        match self {
            ContentflowError::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Stable snake_case name of the error class, used in reports and exit codes.
    pub fn kind(&self) -> &'static str {
        match self.root_cause() {
            ContentflowError::ValidationError(_) => "validation_error",
            ContentflowError::GenerationServiceError { .. }
            | ContentflowError::RateLimited { .. }
            | ContentflowError::AuthError { .. }
            | ContentflowError::RequestTimeout { .. } => "generation_service_error",
            ContentflowError::GenerationParseError { .. } => "generation_parse_error",
            ContentflowError::SearchError { .. } => "search_error",
            ContentflowError::ConfigurationError(_) => "configuration_error",
            ContentflowError::EpochLimitExceeded { .. } => "epoch_limit_exceeded",
            ContentflowError::Stalled { .. } => "stalled",
            ContentflowError::Cancelled { .. } => "cancelled",
            ContentflowError::DeadlineExceeded { .. } => "deadline_exceeded",
            ContentflowError::Io(_) => "io_error",
            ContentflowError::Json(_) => "json_error",
            ContentflowError::StageFailed { .. } | ContentflowError::Other(_) => "other",
        }
    }
}

/// A convenience alias for `Result<T, ContentflowError>`.
pub type Result<T> = std::result::Result<T, ContentflowError>;

// ---------------------------------------------------------------------------
// ContentType
// ---------------------------------------------------------------------------

/// The kinds of content the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    ShortPost,
    Article,
    ProfessionalPost,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [
        ContentType::ShortPost,
        ContentType::Article,
        ContentType::ProfessionalPost,
    ];

    /// Parse a user-facing content type name.
    ///
    /// Accepts the channel names (`tweet`, `blog`, `linkedin`) as well as the
    /// snake_case variant names, case-insensitively.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "tweet" | "short_post" => Ok(ContentType::ShortPost),
            "blog" | "article" => Ok(ContentType::Article),
            "linkedin" | "professional_post" => Ok(ContentType::ProfessionalPost),
            other => Err(ContentflowError::ValidationError(format!(
                "unknown content type '{other}' (expected tweet, blog or linkedin)"
            ))),
        }
    }

    /// Channel name used on the command line and in event names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::ShortPost => "tweet",
            ContentType::Article => "blog",
            ContentType::ProfessionalPost => "linkedin",
        }
    }

    /// Length ceiling for generated content, in words.
    pub fn max_length(&self) -> usize {
        match self {
            ContentType::ShortPost => 150,
            ContentType::Article => 800,
            ContentType::ProfessionalPost => 500,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = ContentflowError;

    fn from_str(s: &str) -> Result<Self> {
        ContentType::parse(s)
    }
}
