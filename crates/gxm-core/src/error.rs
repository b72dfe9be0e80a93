//! Error taxonomy for transfer jobs and the scheduler API.
//!
//! `TransferError` is what a pipeline stage fails with; `kind()` classifies it
//! for the caller-facing outcome. `SchedulerError` is returned synchronously by
//! scheduler calls (submit, pause, resume, ...).

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use crate::control::StopReason;
use crate::job::{JobId, JobStatus};

/// Caller-visible classification of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientSpace,
    SourceNotFound,
    PermissionDenied,
    SourceIo,
    DestinationIo,
    ExtractionFailed,
    DownloadFailed,
    IntegrityMismatch,
    Cancelled,
    Paused,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InsufficientSpace => "insufficient_space",
            ErrorKind::SourceNotFound => "source_not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::SourceIo => "source_io",
            ErrorKind::DestinationIo => "destination_io",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::DownloadFailed => "download_failed",
            ErrorKind::IntegrityMismatch => "integrity_mismatch",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Paused => "paused",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised inside a job's pipeline.
///
/// `Paused` and `Cancelled` are stop signals observed by a stage, not failures;
/// the finalizer turns them into the matching job status.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("insufficient space: {required} bytes required (with margin), {available} available")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    SourceIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    DestinationIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("job paused")]
    Paused,

    #[error("internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Classify an I/O error raised while reading the source side.
    pub fn source_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => TransferError::SourceNotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => TransferError::PermissionDenied {
                path: path.to_path_buf(),
                source: err,
            },
            _ => TransferError::SourceIo {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Classify an I/O error raised while writing the destination side.
    pub fn dest_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => TransferError::PermissionDenied {
                path: path.to_path_buf(),
                source: err,
            },
            _ => TransferError::DestinationIo {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        TransferError::ExtractionFailed(msg.into())
    }

    pub fn download(msg: impl Into<String>) -> Self {
        TransferError::DownloadFailed(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::InsufficientSpace { .. } => ErrorKind::InsufficientSpace,
            TransferError::SourceNotFound { .. } => ErrorKind::SourceNotFound,
            TransferError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            TransferError::SourceIo { .. } => ErrorKind::SourceIo,
            TransferError::DestinationIo { .. } => ErrorKind::DestinationIo,
            TransferError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            TransferError::DownloadFailed(_) => ErrorKind::DownloadFailed,
            TransferError::Cancelled => ErrorKind::Cancelled,
            TransferError::Paused => ErrorKind::Paused,
            TransferError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The stop reason carried by this error, if it is a stop signal.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            TransferError::Paused => Some(StopReason::Pause),
            TransferError::Cancelled => Some(StopReason::Cancel),
            _ => None,
        }
    }
}

impl From<StopReason> for TransferError {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Pause => TransferError::Paused,
            StopReason::Cancel => TransferError::Cancelled,
        }
    }
}

/// Errors returned by the scheduler's control API.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("target {target:?} already has an active job ({existing})")]
    DuplicateTarget { target: String, existing: JobId },

    #[error("job {0} not found")]
    UnknownJob(JobId),

    #[error("cannot {action} job {id} while it is {status}")]
    InvalidState {
        id: JobId,
        action: &'static str,
        status: JobStatus,
    },

    #[error("destination must be an absolute path: {}", .0.display())]
    RelativeDestination(PathBuf),

    #[error("scheduler is shut down")]
    Closed,
}
