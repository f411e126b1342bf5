//! Run reports, warnings and structured error reports.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Artifact, ContentType, ContentflowError, Result, Score};

/// One stage invocation recorded by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub epoch: usize,
    pub stage: String,
    /// Event name when the stage is a router.
    pub routed: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The quality loop hit its retry bound and the last artifact was accepted anyway.
    MaxRetriesExceeded,
}

/// A non-fatal condition recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    pub stage: String,
    pub kind: WarningKind,
    pub message: String,
}

/// Summary of a successfully finalized run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub content_type: ContentType,
    pub topic: String,
    pub artifact: Artifact,
    pub score: Option<Score>,
    pub retry_count: u32,
    pub warnings: Vec<RunWarning>,
    pub trace: Vec<StageRecord>,
    pub epochs: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl RunReport {
    /// Number of times the given stage ran.
    pub fn invocations(&self, stage: &str) -> usize {
        self.trace.iter().filter(|r| r.stage == stage).count()
    }

    pub fn degraded(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| w.kind == WarningKind::MaxRetriesExceeded)
    }

    /// Serialize this report to JSON and write it to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a report from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let report: Self = serde_json::from_str(&data)?;
        Ok(report)
    }
}

/// Serializable description of a failed run, returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub stage: Option<String>,
    pub epoch: Option<usize>,
    pub message: String,
}

impl From<&ContentflowError> for ErrorReport {
    fn from(err: &ContentflowError) -> Self {
        let (stage, epoch) = match err {
            ContentflowError::StageFailed { stage, epoch, .. }
            | ContentflowError::Cancelled { stage, epoch }
            | ContentflowError::DeadlineExceeded { stage, epoch } => {
                (Some(stage.clone()), Some(*epoch))
            }
            ContentflowError::EpochLimitExceeded { epoch, ready, .. } => {
                let stage = (!ready.is_empty()).then(|| ready.join(", "));
                (stage, Some(*epoch))
            }
            ContentflowError::Stalled { epoch } => (None, Some(*epoch)),
            _ => (None, None),
        };
        Self {
            kind: err.kind().to_string(),
            stage,
            epoch,
            message: err.root_cause().to_string(),
        }
    }
}
