//! Dispatcher loop: claims worker slots, takes jobs off the queue and spawns
//! their pipelines. Sleeps on the scheduler's `Notify` between state changes.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::control::JobControl;
use crate::error::TransferError;
use crate::job::JobStatus;

use super::finish;
use super::pipeline::{self, ClaimedJob};
use super::slots::SlotGuard;
use super::Shared;

pub(super) async fn run_dispatcher(shared: Arc<Shared>) {
    let mut running: JoinSet<()> = JoinSet::new();
    tracing::debug!("dispatcher started");
    loop {
        if !shared.is_closed() {
            while shared.slots.try_acquire() {
                let Some(job) = claim_next(&shared) else {
                    shared.slots.release();
                    break;
                };
                let slot = SlotGuard::new(Arc::clone(&shared.slots), Arc::clone(&shared.wake));
                spawn_job(&mut running, Arc::clone(&shared), job, slot);
            }
        } else if running.is_empty() {
            break;
        }

        tokio::select! {
            _ = shared.wake.notified() => {}
            Some(res) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = res {
                    tracing::error!("job supervisor task failed: {e}");
                }
            }
        }
    }
    tracing::debug!("dispatcher stopped");
}

/// Take the next eligible job and mark it InProgress with a fresh control.
fn claim_next(shared: &Shared) -> Option<ClaimedJob> {
    let mut reg = shared.lock_registry();
    while let Some(id) = shared.queue.try_take_next() {
        let Some(entry) = reg.get_mut(id) else {
            continue;
        };
        if entry.status != JobStatus::Pending {
            tracing::warn!(job_id = id, status = %entry.status, "skipping queued job that is not pending");
            continue;
        }
        let (control, stop) = JobControl::new();
        entry.control = Some(control);
        entry.set_status(JobStatus::InProgress);
        return Some(ClaimedJob {
            id,
            target: entry.target.clone(),
            source: entry.source.clone(),
            destination: entry.destination.clone(),
            low_space: entry.low_space,
            stop,
            progress: Arc::clone(&entry.progress),
        });
    }
    None
}

/// Spawn the job on its own task, supervised so that a panic still ends the
/// job as Failed instead of leaving it InProgress forever.
fn spawn_job(running: &mut JoinSet<()>, shared: Arc<Shared>, job: ClaimedJob, slot: SlotGuard) {
    let id = job.id;
    running.spawn(async move {
        let worker = tokio::spawn(run_job(Arc::clone(&shared), job, slot));
        if let Err(e) = worker.await {
            tracing::error!(job_id = id, "job task failed: {e}");
            let err = TransferError::Internal(format!("job task failed: {e}"));
            finish::finish_job(&shared, id, Err(err)).await;
        }
    });
}

async fn run_job(shared: Arc<Shared>, job: ClaimedJob, _slot: SlotGuard) {
    let span = tracing::info_span!("job", id = job.id, target = %job.target);
    async {
        tracing::info!(dest = %job.destination.display(), "job started");
        let result = pipeline::run(&shared, &job).await;
        finish::finish_job(&shared, job.id, result).await;
    }
    .instrument(span)
    .await
}
