//! CLI command handlers, one file per command.

mod batch;
mod checksum;
mod config;
mod display;
mod space;
mod transfer;
mod verify;

pub use batch::run_batch;
pub use checksum::run_checksum;
pub use config::run_config;
pub use space::run_space;
pub use transfer::{run_transfer, TransferArgs};
pub use verify::run_verify;

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Resolve `path` against the current directory; the scheduler only takes
/// absolute destinations.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
