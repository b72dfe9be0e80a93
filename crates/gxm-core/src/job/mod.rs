//! Transfer job model: request, status machine, outcome.

mod outcome;
mod state;
mod types;

pub use outcome::JobOutcome;
pub use state::JobStatus;
pub use types::{CloudRef, JobId, JobRequest, JobSummary, LowSpaceAction, Priority, SourceSpec};
