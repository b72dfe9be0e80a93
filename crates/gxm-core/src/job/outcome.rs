use serde::Serialize;
use std::path::PathBuf;

use crate::error::ErrorKind;
use crate::integrity::IntegrityReport;

/// Terminal result of a job, delivered once through the handle's outcome channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        destination: PathBuf,
        integrity: IntegrityReport,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    Cancelled,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}
