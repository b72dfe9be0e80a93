//! Types describing a transfer request and its caller-facing views.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use super::state::JobStatus;

/// Job identifier, unique per submission within one scheduler.
pub type JobId = u64;

/// Queue tier. Ordering is `Low < Normal < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority {other:?} (expected low, normal or high)")),
        }
    }
}

/// Reference to a file held by a cloud provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudRef {
    pub provider_id: String,
    pub file_id: String,
    /// The downloaded payload is an archive and goes through extraction.
    #[serde(default)]
    pub is_archive: bool,
}

/// Where a job reads its content from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSpec {
    /// Local file or directory. A single archive file is always extracted; a
    /// directory is searched for an archive only when `extract` is set.
    Local {
        path: PathBuf,
        #[serde(default)]
        extract: bool,
    },
    Cloud(CloudRef),
}

impl SourceSpec {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        SourceSpec::Local {
            path: path.into(),
            extract: false,
        }
    }

    pub fn cloud(provider_id: impl Into<String>, file_id: impl Into<String>) -> Self {
        SourceSpec::Cloud(CloudRef {
            provider_id: provider_id.into(),
            file_id: file_id.into(),
            is_archive: false,
        })
    }
}

/// What to do when the destination volume looks too small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LowSpaceAction {
    /// Ask through the scheduler's prompt channel (cancel when there is none).
    #[default]
    Ask,
    Proceed,
    Cancel,
}

/// Everything needed to submit one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Logical target identity (e.g. a game id); at most one live job per target.
    pub target: String,
    pub source: SourceSpec,
    /// Absolute destination directory.
    pub destination: PathBuf,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub low_space: LowSpaceAction,
}

impl JobRequest {
    pub fn new(target: impl Into<String>, source: SourceSpec, destination: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            source,
            destination: destination.into(),
            priority: Priority::Normal,
            low_space: LowSpaceAction::Ask,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_low_space(mut self, action: LowSpaceAction) -> Self {
        self.low_space = action;
        self
    }
}

/// Row returned by `Scheduler::list_jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub target: String,
    pub status: JobStatus,
    pub priority: Priority,
}
