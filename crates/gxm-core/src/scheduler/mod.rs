//! Transfer job scheduler.
//!
//! Owns the job registry, the priority queue and the worker slots, and runs a
//! dispatcher task that drives each claimed job through the pipeline:
//! space check → download (cloud) → extraction (archives) → copy → integrity
//! check → finalize. An explicit instance is created with `Scheduler::builder`
//! and ended with `shutdown`.

mod dispatch;
mod finish;
mod handle;
mod pipeline;
mod prompt;
mod registry;
mod slots;

pub use handle::JobHandle;
pub use prompt::SpacePrompt;
pub use slots::WorkerSlots;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::cloud::{CloudRegistry, CloudSource};
use crate::config::{ExtractorConfig, GxmConfig};
use crate::control::JobSignal;
use crate::copier::CopyOptions;
use crate::error::SchedulerError;
use crate::extract::{ArchiveExtractor, CommandExtractor};
use crate::integrity::IntegrityOptions;
use crate::job::{JobId, JobOutcome, JobRequest, JobStatus, JobSummary, Priority};
use crate::queue::JobQueue;

use registry::{JobEntry, Registry};

/// Runtime knobs of one scheduler instance.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_parallel: usize,
    pub copy: CopyOptions,
    pub integrity: IntegrityOptions,
    pub space_margin: f64,
    /// Parent of private download/extraction dirs (None = system temp).
    pub temp_dir: Option<PathBuf>,
    /// Used when no extractor is supplied to the builder.
    pub extractor: ExtractorConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&GxmConfig::default())
    }
}

impl From<&GxmConfig> for SchedulerConfig {
    fn from(cfg: &GxmConfig) -> Self {
        Self {
            max_parallel: cfg.effective_max_parallel(),
            copy: CopyOptions {
                chunk_size: cfg.chunk_size_bytes.max(1),
                progress_interval: Duration::from_millis(cfg.progress_interval_ms),
            },
            integrity: IntegrityOptions {
                sample_limit: cfg.integrity_sample_limit,
                verify_checksums: cfg.verify_checksums,
            },
            space_margin: cfg.space_margin,
            temp_dir: cfg.temp_dir.clone(),
            extractor: cfg.extractor.clone(),
        }
    }
}

/// State shared by the scheduler API, the dispatcher and running jobs.
struct Shared {
    config: SchedulerConfig,
    registry: Mutex<Registry>,
    queue: JobQueue,
    slots: Arc<WorkerSlots>,
    wake: Arc<Notify>,
    closed: AtomicBool,
    extractor: Arc<dyn ArchiveExtractor>,
    cloud: CloudRegistry,
    prompts: Option<mpsc::Sender<SpacePrompt>>,
    next_id: AtomicU64,
}

impl Shared {
    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Collaborators and config for a new scheduler.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    extractor: Option<Arc<dyn ArchiveExtractor>>,
    cloud: CloudRegistry,
    prompts: Option<mpsc::Sender<SpacePrompt>>,
}

impl SchedulerBuilder {
    /// Replace the command extractor built from `config.extractor`.
    pub fn extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn cloud_source(mut self, provider_id: impl Into<String>, source: Arc<dyn CloudSource>) -> Self {
        self.cloud.register(provider_id, source);
        self
    }

    pub fn cloud_registry(mut self, cloud: CloudRegistry) -> Self {
        self.cloud = cloud;
        self
    }

    /// Channel receiving low-space prompts for jobs submitted with `LowSpaceAction::Ask`.
    pub fn space_prompts(mut self, tx: mpsc::Sender<SpacePrompt>) -> Self {
        self.prompts = Some(tx);
        self
    }

    /// Start the dispatcher. Must be called from within a tokio runtime.
    pub fn start(self) -> Scheduler {
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(CommandExtractor::new(&self.config.extractor)));
        let shared = Arc::new(Shared {
            slots: Arc::new(WorkerSlots::new(self.config.max_parallel)),
            config: self.config,
            registry: Mutex::new(Registry::default()),
            queue: JobQueue::new(),
            wake: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
            extractor,
            cloud: self.cloud,
            prompts: self.prompts,
            next_id: AtomicU64::new(0),
        });
        tracing::info!(max_parallel = shared.slots.max(), "scheduler started");
        let dispatcher = tokio::spawn(dispatch::run_dispatcher(Arc::clone(&shared)));
        Scheduler {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }
}

pub struct Scheduler {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder {
            config,
            extractor: None,
            cloud: CloudRegistry::new(),
            prompts: None,
        }
    }

    /// Start with default collaborators (command extractor, no cloud providers).
    pub fn start(config: SchedulerConfig) -> Self {
        Self::builder(config).start()
    }

    /// Queue a new job. Rejected while another job for the same target is live.
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, SchedulerError> {
        if !request.destination.is_absolute() {
            return Err(SchedulerError::RelativeDestination(request.destination));
        }
        let shared = &self.shared;
        let mut reg = shared.lock_registry();
        if shared.is_closed() {
            return Err(SchedulerError::Closed);
        }
        if let Some(existing) = reg.reserved_by(&request.target) {
            return Err(SchedulerError::DuplicateTarget {
                target: request.target,
                existing,
            });
        }
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let priority = request.priority;
        let (entry, handle) = JobEntry::new(id, id, request);
        tracing::info!(job_id = id, target = %entry.target, %priority, "job submitted");
        shared.queue.enqueue(id, priority, entry.seq);
        reg.insert(entry);
        drop(reg);
        shared.wake.notify_one();
        Ok(handle)
    }

    /// Ask a running job to stop and keep its partial output.
    pub fn pause(&self, id: JobId) -> Result<(), SchedulerError> {
        let reg = self.shared.lock_registry();
        let entry = reg.get(id).ok_or(SchedulerError::UnknownJob(id))?;
        if entry.status != JobStatus::InProgress {
            return Err(SchedulerError::InvalidState {
                id,
                action: "pause",
                status: entry.status,
            });
        }
        if let Some(control) = &entry.control {
            control.request(JobSignal::Pause);
        }
        tracing::info!(job_id = id, "pause requested");
        Ok(())
    }

    /// Put a paused job back in line at its original position.
    pub fn resume(&self, id: JobId) -> Result<(), SchedulerError> {
        let mut reg = self.shared.lock_registry();
        let entry = reg.get_mut(id).ok_or(SchedulerError::UnknownJob(id))?;
        if entry.status != JobStatus::Paused {
            return Err(SchedulerError::InvalidState {
                id,
                action: "resume",
                status: entry.status,
            });
        }
        entry.set_status(JobStatus::Pending);
        self.shared.queue.unpark(id);
        drop(reg);
        tracing::info!(job_id = id, "job resumed");
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Cancel a live job. A running job is signalled and finalizes itself;
    /// a pending or paused job is finalized here, destination cleanup included.
    pub async fn cancel(&self, id: JobId) -> Result<(), SchedulerError> {
        let entry = {
            let mut reg = self.shared.lock_registry();
            let entry = reg.get(id).ok_or(SchedulerError::UnknownJob(id))?;
            match entry.status {
                JobStatus::InProgress => {
                    if let Some(control) = &entry.control {
                        control.request(JobSignal::Cancel);
                    }
                    tracing::info!(job_id = id, "cancel requested");
                    return Ok(());
                }
                JobStatus::Pending | JobStatus::Paused => {}
                status => {
                    return Err(SchedulerError::InvalidState {
                        id,
                        action: "cancel",
                        status,
                    })
                }
            }
            self.shared.queue.remove(id);
            reg.take(id).ok_or(SchedulerError::UnknownJob(id))?
        };
        tracing::info!(job_id = id, "job cancelled before running");
        finish::finalize(&self.shared, entry, JobStatus::Cancelled, JobOutcome::Cancelled, true).await;
        Ok(())
    }

    /// Change a job's tier. Queued and paused jobs move in the queue; a running
    /// job keeps running and the new tier applies if it is paused and resumed.
    pub fn set_priority(&self, id: JobId, priority: Priority) -> Result<(), SchedulerError> {
        let mut reg = self.shared.lock_registry();
        let entry = reg.get_mut(id).ok_or(SchedulerError::UnknownJob(id))?;
        entry.priority = priority;
        if matches!(entry.status, JobStatus::Pending | JobStatus::Paused) {
            self.shared.queue.reprioritize(id, priority);
        }
        drop(reg);
        tracing::debug!(job_id = id, %priority, "priority changed");
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Change the number of concurrent jobs (clamped to 1..=10). Running jobs
    /// are never interrupted. Returns the effective value.
    pub fn set_max_parallel(&self, n: usize) -> usize {
        let effective = self.shared.slots.set_max(n);
        tracing::info!(max_parallel = effective, "max parallel changed");
        self.shared.wake.notify_one();
        effective
    }

    pub fn max_parallel(&self) -> usize {
        self.shared.slots.max()
    }

    /// Jobs currently holding a worker slot.
    pub fn running(&self) -> usize {
        self.shared.slots.in_use()
    }

    /// Live (non-terminal) jobs, by id.
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        self.shared.lock_registry().summaries()
    }

    /// Jobs waiting for a slot (paused jobs not included).
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.depth()
    }

    /// Stop dispatching, cancel every live job and wait for running pipelines.
    pub async fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let ids = self.shared.lock_registry().ids();
        tracing::info!(live = ids.len(), "scheduler shutting down");
        for id in ids {
            match self.cancel(id).await {
                Ok(()) | Err(SchedulerError::UnknownJob(_)) => {}
                Err(e) => tracing::debug!(job_id = id, "cancel during shutdown: {e}"),
            }
        }
        self.shared.wake.notify_one();
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                tracing::error!("dispatcher task failed: {e}");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Without shutdown, queued jobs never start; running ones finish.
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }
}
