//! Live jobs (non-terminal) and the target reservations that prevent
//! duplicate submissions.
//!
//! Lock order: the registry lock is taken before the queue's internal lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::control::JobControl;
use crate::job::{JobId, JobOutcome, JobRequest, JobStatus, JobSummary, LowSpaceAction, Priority, SourceSpec};
use crate::progress::ProgressSnapshot;

use super::handle::JobHandle;

pub(super) struct JobEntry {
    pub id: JobId,
    pub target: String,
    pub source: SourceSpec,
    pub destination: PathBuf,
    pub priority: Priority,
    pub low_space: LowSpaceAction,
    /// Submission order; FIFO tie-break inside a priority tier.
    pub seq: u64,
    pub status: JobStatus,
    /// Present while an attempt is running.
    pub control: Option<JobControl>,
    pub progress: Arc<watch::Sender<ProgressSnapshot>>,
    /// Set once any attempt reached the copy stage; a later cancellation of
    /// any kind then removes the destination.
    pub wrote_destination: bool,
    status_tx: watch::Sender<JobStatus>,
    transitions_tx: mpsc::UnboundedSender<JobStatus>,
    outcome_tx: Option<oneshot::Sender<JobOutcome>>,
}

impl JobEntry {
    pub fn new(id: JobId, seq: u64, request: JobRequest) -> (Self, JobHandle) {
        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);
        let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();
        let _ = transitions_tx.send(JobStatus::Pending);
        let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot::default());
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let handle = JobHandle::new(
            id,
            request.target.clone(),
            status_rx,
            transitions_rx,
            progress_rx,
            outcome_rx,
        );
        let entry = Self {
            id,
            target: request.target,
            source: request.source,
            destination: request.destination,
            priority: request.priority,
            low_space: request.low_space,
            seq,
            status: JobStatus::Pending,
            control: None,
            progress: Arc::new(progress_tx),
            wrote_destination: false,
            status_tx,
            transitions_tx,
            outcome_tx: Some(outcome_tx),
        };
        (entry, handle)
    }

    pub fn set_status(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal transition {} -> {}",
            self.status,
            next
        );
        tracing::debug!(job_id = self.id, from = %self.status, to = %next, "status change");
        self.status = next;
        self.status_tx.send_replace(next);
        let _ = self.transitions_tx.send(next);
    }

    /// Deliver the terminal outcome. Only the first call sends anything.
    pub fn send_outcome(&mut self, outcome: JobOutcome) -> bool {
        match self.outcome_tx.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            target: self.target.clone(),
            status: self.status,
            priority: self.priority,
        }
    }
}

#[derive(Default)]
pub(super) struct Registry {
    jobs: HashMap<JobId, JobEntry>,
    /// Target -> job holding it. A target stays reserved until its job's
    /// outcome has been delivered (cleanup included).
    targets: HashMap<String, JobId>,
}

impl Registry {
    pub fn reserved_by(&self, target: &str) -> Option<JobId> {
        self.targets.get(target).copied()
    }

    pub fn insert(&mut self, entry: JobEntry) {
        self.targets.insert(entry.target.clone(), entry.id);
        self.jobs.insert(entry.id, entry);
    }

    pub fn get(&self, id: JobId) -> Option<&JobEntry> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut JobEntry> {
        self.jobs.get_mut(&id)
    }

    /// Remove a job that is being finalized. Its target stays reserved.
    pub fn take(&mut self, id: JobId) -> Option<JobEntry> {
        self.jobs.remove(&id)
    }

    pub fn release_target(&mut self, target: &str, id: JobId) {
        if self.targets.get(target) == Some(&id) {
            self.targets.remove(target);
        }
    }

    pub fn summaries(&self) -> Vec<JobSummary> {
        let mut rows: Vec<JobSummary> = self.jobs.values().map(JobEntry::summary).collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: &str) -> JobRequest {
        JobRequest::new(target, SourceSpec::local("/src"), "/dst")
    }

    #[test]
    fn target_stays_reserved_until_released() {
        let mut reg = Registry::default();
        let (entry, _handle) = JobEntry::new(1, 1, request("game"));
        reg.insert(entry);
        assert_eq!(reg.reserved_by("game"), Some(1));

        let taken = reg.take(1).unwrap();
        assert!(reg.get(1).is_none());
        assert_eq!(reg.reserved_by("game"), Some(1));

        reg.release_target(&taken.target, 2);
        assert_eq!(reg.reserved_by("game"), Some(1));
        reg.release_target(&taken.target, 1);
        assert_eq!(reg.reserved_by("game"), None);
    }

    #[tokio::test]
    async fn outcome_is_sent_once() {
        let (mut entry, mut handle) = JobEntry::new(1, 1, request("game"));
        entry.set_status(JobStatus::Cancelled);
        assert!(entry.send_outcome(JobOutcome::Cancelled));
        assert!(!entry.send_outcome(JobOutcome::Cancelled));
        assert_eq!(handle.outcome().await.unwrap(), JobOutcome::Cancelled);
        assert!(handle.outcome().await.is_err());
    }

    #[tokio::test]
    async fn transitions_are_recorded_in_order() {
        let (mut entry, mut handle) = JobEntry::new(1, 1, request("game"));
        entry.set_status(JobStatus::InProgress);
        entry.set_status(JobStatus::Paused);
        entry.set_status(JobStatus::Pending);
        assert_eq!(handle.next_transition().await, Some(JobStatus::Pending));
        assert_eq!(handle.next_transition().await, Some(JobStatus::InProgress));
        assert_eq!(handle.next_transition().await, Some(JobStatus::Paused));
        assert_eq!(handle.next_transition().await, Some(JobStatus::Pending));
        assert_eq!(handle.status(), JobStatus::Pending);
    }

    #[test]
    fn summaries_are_sorted_by_id() {
        let mut reg = Registry::default();
        for (id, target) in [(3, "c"), (1, "a"), (2, "b")] {
            let (entry, _h) = JobEntry::new(id, id, request(target));
            reg.insert(entry);
        }
        let ids: Vec<_> = reg.summaries().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(reg.ids(), vec![1, 2, 3]);
    }
}
