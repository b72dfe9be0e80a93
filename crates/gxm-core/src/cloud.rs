//! Cloud sources: provider-agnostic download capability and the registry
//! that maps provider ids to implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::control::StopToken;
use crate::error::TransferError;
use crate::progress::StageProgress;

/// A provider able to fetch a file by id. Runs on a blocking thread.
///
/// Implementations write into `dest_dir` (a private temp dir) and return the
/// path of what they produced: a single file or a directory tree. They should
/// call `stop.check()?` regularly and fail with `TransferError::DownloadFailed`.
pub trait CloudSource: Send + Sync {
    fn download(
        &self,
        file_id: &str,
        dest_dir: &Path,
        progress: StageProgress<'_>,
        stop: &StopToken,
    ) -> Result<PathBuf, TransferError>;

    /// Expected download size, used by the space check when known.
    fn size_hint(&self, _file_id: &str) -> Option<u64> {
        None
    }
}

#[derive(Default, Clone)]
pub struct CloudRegistry {
    providers: HashMap<String, Arc<dyn CloudSource>>,
}

impl CloudRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider for `provider_id`.
    pub fn register(&mut self, provider_id: impl Into<String>, source: Arc<dyn CloudSource>) {
        self.providers.insert(provider_id.into(), source);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn CloudSource>> {
        self.providers.get(provider_id).cloned()
    }

    /// Like `get`, but an unknown provider is a download failure.
    pub fn resolve(&self, provider_id: &str) -> Result<Arc<dyn CloudSource>, TransferError> {
        self.get(provider_id)
            .ok_or_else(|| TransferError::download(format!("no cloud provider registered as {provider_id:?}")))
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for CloudRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudRegistry")
            .field("providers", &self.provider_ids())
            .finish()
    }
}
