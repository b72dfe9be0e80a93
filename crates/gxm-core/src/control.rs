//! Job control for pause/cancel: one watch channel per running attempt.
//!
//! The scheduler keeps the `JobControl` side and hands a `StopToken` to the
//! pipeline. Stages call `check()` between chunks and files (blocking code) or
//! await `stopped()` (async code). Cancel is sticky: a later pause request
//! cannot downgrade it.

use std::sync::Arc;
use tokio::sync::watch;

use crate::error::TransferError;

/// Signal sent to a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSignal {
    Run,
    Pause,
    Cancel,
}

/// Why a job stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stop now, keep partial output, resume later.
    Pause,
    /// Stop for good; partial output is discarded.
    Cancel,
}

fn reason_of(signal: JobSignal) -> Option<StopReason> {
    match signal {
        JobSignal::Run => None,
        JobSignal::Pause => Some(StopReason::Pause),
        JobSignal::Cancel => Some(StopReason::Cancel),
    }
}

/// Sender side, owned by the scheduler for one attempt of one job.
#[derive(Debug)]
pub struct JobControl {
    tx: watch::Sender<JobSignal>,
}

impl JobControl {
    /// New control in the `Run` state plus the token for the pipeline.
    pub fn new() -> (Self, StopToken) {
        let (tx, rx) = watch::channel(JobSignal::Run);
        (Self { tx }, StopToken { rx, _keep: None })
    }

    /// Deliver a signal. Returns false when it changed nothing (same signal,
    /// or the job is already cancelled).
    pub fn request(&self, signal: JobSignal) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == JobSignal::Cancel || *current == signal {
                return false;
            }
            *current = signal;
            true
        })
    }

    /// Most recent signal; this is the stop reason that wins at finalize time.
    pub fn current(&self) -> JobSignal {
        *self.tx.borrow()
    }
}

/// Receiver side handed to pipeline stages. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<JobSignal>,
    _keep: Option<Arc<watch::Sender<JobSignal>>>,
}

impl StopToken {
    /// A token that never fires, for running stages outside the scheduler
    /// (e.g. the CLI `verify` command).
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(JobSignal::Run);
        Self {
            rx,
            _keep: Some(Arc::new(tx)),
        }
    }

    pub fn reason(&self) -> Option<StopReason> {
        reason_of(*self.rx.borrow())
    }

    pub fn is_stopped(&self) -> bool {
        self.reason().is_some()
    }

    /// `Err(Paused)` / `Err(Cancelled)` once a stop has been requested.
    pub fn check(&self) -> Result<(), TransferError> {
        match self.reason() {
            None => Ok(()),
            Some(reason) => Err(reason.into()),
        }
    }

    /// Resolve when a stop is requested. A dropped control counts as cancel.
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = reason_of(*rx.borrow_and_update()) {
                return reason;
            }
            if rx.changed().await.is_err() {
                return StopReason::Cancel;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn token_reflects_requests() {
        let (control, token) = JobControl::new();
        assert!(token.check().is_ok());
        assert!(control.request(JobSignal::Pause));
        assert_eq!(token.reason(), Some(StopReason::Pause));
        assert!(matches!(token.check(), Err(TransferError::Paused)));
    }

    #[test]
    fn cancel_overrides_pause_and_sticks() {
        let (control, token) = JobControl::new();
        control.request(JobSignal::Pause);
        assert!(control.request(JobSignal::Cancel));
        assert_eq!(control.current(), JobSignal::Cancel);
        assert!(!control.request(JobSignal::Pause));
        assert!(!control.request(JobSignal::Run));
        assert_eq!(token.reason(), Some(StopReason::Cancel));
    }

    #[test]
    fn repeated_signal_is_a_no_op() {
        let (control, _token) = JobControl::new();
        assert!(control.request(JobSignal::Pause));
        assert!(!control.request(JobSignal::Pause));
    }

    #[tokio::test]
    async fn stopped_wakes_on_request() {
        let (control, token) = JobControl::new();
        let waiter = tokio::spawn(async move { token.stopped().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        control.request(JobSignal::Cancel);
        assert_eq!(waiter.await.unwrap(), StopReason::Cancel);
    }

    #[tokio::test]
    async fn dropped_control_counts_as_cancel() {
        let (control, token) = JobControl::new();
        drop(control);
        assert_eq!(token.stopped().await, StopReason::Cancel);
    }

    #[test]
    fn detached_token_never_stops() {
        let token = StopToken::detached();
        assert!(!token.is_stopped());
        assert!(token.check().is_ok());
    }
}
