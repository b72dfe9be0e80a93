use tokio::sync::{mpsc, oneshot, watch};

use crate::error::SchedulerError;
use crate::job::{JobId, JobOutcome, JobStatus};
use crate::progress::ProgressSnapshot;

/// Caller's side of a submitted job.
///
/// `status` and `progress` are watch channels (latest value wins);
/// `next_transition` yields every status change in order. The outcome is
/// delivered once, on the terminal transition.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    target: String,
    status: watch::Receiver<JobStatus>,
    transitions: mpsc::UnboundedReceiver<JobStatus>,
    progress: watch::Receiver<ProgressSnapshot>,
    outcome: Option<oneshot::Receiver<JobOutcome>>,
}

impl JobHandle {
    pub(super) fn new(
        id: JobId,
        target: String,
        status: watch::Receiver<JobStatus>,
        transitions: mpsc::UnboundedReceiver<JobStatus>,
        progress: watch::Receiver<ProgressSnapshot>,
        outcome: oneshot::Receiver<JobOutcome>,
    ) -> Self {
        Self {
            id,
            target,
            status,
            transitions,
            progress,
            outcome: Some(outcome),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<JobStatus> {
        self.status.clone()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.borrow().clone()
    }

    pub fn progress_watch(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.clone()
    }

    /// Next status change, or None once the job is gone and all changes were read.
    pub async fn next_transition(&mut self) -> Option<JobStatus> {
        self.transitions.recv().await
    }

    /// Wait until the job reaches `want`. Returns false if it reaches a
    /// different terminal state or the scheduler goes away first.
    pub async fn wait_for_status(&mut self, want: JobStatus) -> bool {
        let mut rx = self.status.clone();
        loop {
            let current = *rx.borrow_and_update();
            if current == want {
                return true;
            }
            if current.is_terminal() {
                return false;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow() == want;
            }
        }
    }

    /// The terminal outcome. A second call, or a scheduler dropped before the
    /// job finished, yields `SchedulerError::Closed`.
    pub async fn outcome(&mut self) -> Result<JobOutcome, SchedulerError> {
        match self.outcome.take() {
            Some(rx) => rx.await.map_err(|_| SchedulerError::Closed),
            None => Err(SchedulerError::Closed),
        }
    }
}
