//! Turning a pipeline result into the job's next status, cleanup and outcome.

use std::path::{Path, PathBuf};

use crate::control::{JobSignal, StopReason};
use crate::error::TransferError;
use crate::integrity::IntegrityReport;
use crate::job::{JobId, JobOutcome, JobStatus};

use super::registry::JobEntry;
use super::Shared;

#[derive(Debug)]
pub(super) enum Disposition {
    Completed(IntegrityReport),
    Paused,
    Cancelled { cleanup: bool },
    Failed(TransferError),
}

/// Decide what a finished attempt means. `latest` is the most recent signal
/// delivered to the attempt; it overrides the reason a stage happened to see.
pub(super) fn decide(result: Result<IntegrityReport, TransferError>, latest: JobSignal) -> Disposition {
    let err = match result {
        Ok(report) => return Disposition::Completed(report),
        Err(err) => err,
    };
    if latest == JobSignal::Cancel {
        return Disposition::Cancelled { cleanup: true };
    }
    match err.stop_reason() {
        Some(StopReason::Pause) => Disposition::Paused,
        Some(StopReason::Cancel) => Disposition::Cancelled { cleanup: true },
        // Declined low-space prompt: this attempt wrote nothing. Output of an
        // earlier attempt is handled by `finish_job`.
        None if matches!(err, TransferError::InsufficientSpace { .. }) => {
            Disposition::Cancelled { cleanup: false }
        }
        None => Disposition::Failed(err),
    }
}

/// Apply the result of one attempt of job `id`.
pub(super) async fn finish_job(shared: &Shared, id: JobId, result: Result<IntegrityReport, TransferError>) {
    let (entry, status, outcome, cleanup) = {
        let mut reg = shared.lock_registry();
        let Some(entry) = reg.get_mut(id) else {
            tracing::warn!(job_id = id, "finished job is no longer registered");
            return;
        };
        let latest = entry
            .control
            .as_ref()
            .map(|c| c.current())
            .unwrap_or(JobSignal::Run);

        let (status, outcome, cleanup) = match decide(result, latest) {
            Disposition::Paused => {
                entry.control = None;
                entry.set_status(JobStatus::Paused);
                shared.queue.park(id, entry.priority, entry.seq);
                tracing::info!(job_id = id, "job paused");
                return;
            }
            Disposition::Completed(integrity) => {
                tracing::info!(job_id = id, clean = integrity.is_clean(), "job completed");
                let outcome = JobOutcome::Completed {
                    destination: entry.destination.clone(),
                    integrity,
                };
                (JobStatus::Completed, outcome, false)
            }
            Disposition::Cancelled { cleanup } => {
                tracing::info!(job_id = id, "job cancelled");
                (JobStatus::Cancelled, JobOutcome::Cancelled, cleanup || entry.wrote_destination)
            }
            Disposition::Failed(err) => {
                tracing::error!(job_id = id, kind = %err.kind(), "job failed: {err}");
                let outcome = JobOutcome::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                (JobStatus::Failed, outcome, true)
            }
        };
        match reg.take(id) {
            Some(entry) => (entry, status, outcome, cleanup),
            None => return,
        }
    };
    finalize(shared, entry, status, outcome, cleanup).await;
}

/// Terminal transition of an entry already taken out of the registry: clean
/// the destination if asked, free the target, publish status and outcome.
pub(super) async fn finalize(
    shared: &Shared,
    mut entry: JobEntry,
    status: JobStatus,
    outcome: JobOutcome,
    cleanup: bool,
) {
    if cleanup {
        remove_destination(entry.destination.clone()).await;
    }
    entry.control = None;
    shared.lock_registry().release_target(&entry.target, entry.id);
    entry.set_status(status);
    if !entry.send_outcome(outcome) {
        tracing::debug!(job_id = entry.id, "outcome receiver already gone");
    }
}

async fn remove_destination(path: PathBuf) {
    let res = tokio::task::spawn_blocking(move || remove_path(&path).map(|removed| (path, removed))).await;
    match res {
        Ok(Ok((path, true))) => tracing::info!(dest = %path.display(), "removed partial destination"),
        Ok(Ok((_, false))) => {}
        Ok(Err(e)) => tracing::warn!("failed to remove destination: {e}"),
        Err(e) => tracing::warn!("destination cleanup task join: {e}"),
    }
}

/// Remove a file or directory tree; Ok(false) when nothing was there.
fn remove_path(path: &Path) -> std::io::Result<bool> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(true)
}
