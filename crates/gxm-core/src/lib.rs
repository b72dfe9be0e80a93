pub mod config;
pub mod logging;

pub mod checksum;
pub mod cloud;
pub mod control;
pub mod copier;
pub mod error;
pub mod extract;
pub mod integrity;
pub mod job;
pub mod progress;
pub mod queue;
pub mod scheduler;
pub mod space;

pub use error::{ErrorKind, SchedulerError, TransferError};
pub use job::{CloudRef, JobId, JobOutcome, JobRequest, JobStatus, JobSummary, LowSpaceAction, Priority, SourceSpec};
pub use scheduler::{JobHandle, Scheduler, SchedulerBuilder, SchedulerConfig, SpacePrompt};
