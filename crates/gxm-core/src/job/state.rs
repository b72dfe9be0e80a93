//! Job status and the transitions the scheduler is allowed to make.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal edge of the job state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, InProgress) | (Pending, Cancelled) => true,
            (InProgress, Completed)
            | (InProgress, Failed)
            | (InProgress, Cancelled)
            | (InProgress, Paused) => true,
            (Paused, Pending) | (Paused, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                JobStatus::Pending,
                JobStatus::InProgress,
                JobStatus::Paused,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn paused_only_resumes_to_pending() {
        assert!(JobStatus::Paused.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Paused.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Paused.can_transition_to(JobStatus::InProgress));
        assert!(!JobStatus::Paused.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn pending_cannot_pause() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Paused));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::InProgress));
        assert!(!JobStatus::Pending.is_terminal());
    }
}
