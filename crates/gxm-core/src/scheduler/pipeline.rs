//! Per-job pipeline: space check, download, extraction, copy, integrity check.
//!
//! Runs once per start or resume of a job. Filesystem and process work runs
//! on the blocking pool; private temp dirs are removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

use crate::control::StopToken;
use crate::copier::{copy_tree, CopyStats};
use crate::error::TransferError;
use crate::extract::{archive_for_local_source, collapse_single_subdir};
use crate::integrity::{verify_tree, IntegrityReport};
use crate::job::{CloudRef, JobId, LowSpaceAction, SourceSpec};
use crate::progress::{ProgressSnapshot, Stage};
use crate::space::{check_required, check_space, SpaceCheck};

use super::prompt::SpacePrompt;
use super::Shared;

/// A job taken off the queue for one attempt.
pub(super) struct ClaimedJob {
    pub id: JobId,
    pub target: String,
    pub source: SourceSpec,
    pub destination: PathBuf,
    pub low_space: LowSpaceAction,
    pub stop: StopToken,
    pub progress: Arc<watch::Sender<ProgressSnapshot>>,
}

impl ClaimedJob {
    fn set_stage(&self, stage: Stage) {
        self.progress.send_modify(|s| s.stage = stage);
    }
}

pub(super) async fn run(shared: &Shared, job: &ClaimedJob) -> Result<IntegrityReport, TransferError> {
    let mut staging = Staging::default();
    let result = run_stages(shared, job, &mut staging).await;
    staging.cleanup().await;
    result
}

async fn run_stages(
    shared: &Shared,
    job: &ClaimedJob,
    staging: &mut Staging,
) -> Result<IntegrityReport, TransferError> {
    job.set_stage(Stage::Preflight);
    preflight(shared, job).await?;

    let source = match &job.source {
        SourceSpec::Local { path, extract } => {
            let lookup = path.clone();
            let extract = *extract;
            let archive = blocking("archive lookup", move || {
                archive_for_local_source(&lookup, extract)
            })
            .await?;
            match archive {
                Some(archive) => extract_archive(shared, job, archive, staging).await?,
                None => path.clone(),
            }
        }
        SourceSpec::Cloud(cloud) => {
            let downloaded = download(shared, job, cloud, staging).await?;
            if cloud.is_archive {
                extract_archive(shared, job, downloaded, staging).await?
            } else {
                downloaded
            }
        }
    };

    job.stop.check()?;
    let stats = copy(shared, job, source.clone()).await?;
    tracing::info!(
        files_copied = stats.files_copied,
        files_skipped = stats.files_skipped,
        "copy stage done"
    );

    let report = verify(shared, job, source).await?;
    job.set_stage(Stage::Done);
    Ok(report)
}

/// Run blocking work on the blocking pool; a panic there becomes `Internal`.
async fn blocking<T, F>(what: &'static str, f: F) -> Result<T, TransferError>
where
    F: FnOnce() -> Result<T, TransferError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransferError::Internal(format!("{what} task join: {e}")))?
}

async fn preflight(shared: &Shared, job: &ClaimedJob) -> Result<(), TransferError> {
    let margin = shared.config.space_margin;
    let dest = job.destination.clone();
    let check = match &job.source {
        SourceSpec::Local { path, .. } => {
            let path = path.clone();
            blocking("space check", move || {
                std::fs::metadata(&path).map_err(|e| TransferError::source_io(&path, e))?;
                Ok(Some(check_space(&path, &dest, margin)))
            })
            .await?
        }
        SourceSpec::Cloud(cloud) => {
            let provider = shared.cloud.resolve(&cloud.provider_id)?;
            let file_id = cloud.file_id.clone();
            blocking("space check", move || {
                Ok(provider
                    .size_hint(&file_id)
                    .map(|size| check_required(size, &dest, margin)))
            })
            .await?
        }
    };

    let Some(check) = check else {
        tracing::debug!("no size estimate for source, skipping space check");
        return Ok(());
    };
    if check.sufficient {
        return Ok(());
    }

    tracing::warn!(
        required = check.required_bytes,
        available = check.available_bytes,
        "destination volume may be too small"
    );
    let proceed = match job.low_space {
        LowSpaceAction::Proceed => true,
        LowSpaceAction::Cancel => false,
        LowSpaceAction::Ask => ask(shared, job, check).await?,
    };
    if proceed {
        tracing::info!("continuing despite low space");
        return Ok(());
    }
    Err(TransferError::InsufficientSpace {
        required: (check.required_bytes as f64 * margin) as u64,
        available: check.available_bytes.unwrap_or(0),
    })
}

async fn ask(shared: &Shared, job: &ClaimedJob, check: SpaceCheck) -> Result<bool, TransferError> {
    let Some(prompts) = &shared.prompts else {
        tracing::debug!("no prompt channel, treating low space as declined");
        return Ok(false);
    };
    let (prompt, reply) = SpacePrompt::new(job.id, job.target.clone(), job.destination.clone(), check);
    tokio::select! {
        sent = prompts.send(prompt) => {
            if sent.is_err() {
                return Ok(false);
            }
        }
        reason = job.stop.stopped() => return Err(reason.into()),
    }
    tokio::select! {
        answer = reply => Ok(answer.unwrap_or(false)),
        reason = job.stop.stopped() => Err(reason.into()),
    }
}

async fn download(
    shared: &Shared,
    job: &ClaimedJob,
    cloud: &CloudRef,
    staging: &mut Staging,
) -> Result<PathBuf, TransferError> {
    job.set_stage(Stage::Downloading);
    let provider = shared.cloud.resolve(&cloud.provider_id)?;
    let dir = staging.create(shared.config.temp_dir.as_deref(), "gxm-download-")?;
    let file_id = cloud.file_id.clone();
    let stop = job.stop.clone();
    let progress = Arc::clone(&job.progress);
    tracing::info!(provider = %cloud.provider_id, file_id = %cloud.file_id, "downloading");

    blocking("download", move || {
        let report = move |done: u64, total: u64| {
            progress.send_modify(|s| {
                s.stage = Stage::Downloading;
                s.bytes_done = done;
                s.bytes_total = total;
            });
        };
        provider.download(&file_id, &dir, &report, &stop)
    })
    .await
    .map_err(|e| match e {
        TransferError::Paused | TransferError::Cancelled | TransferError::DownloadFailed(_) => e,
        other => TransferError::DownloadFailed(other.to_string()),
    })
}

async fn extract_archive(
    shared: &Shared,
    job: &ClaimedJob,
    archive: PathBuf,
    staging: &mut Staging,
) -> Result<PathBuf, TransferError> {
    job.progress.send_replace(ProgressSnapshot {
        stage: Stage::Extracting,
        percent: Some(0),
        ..Default::default()
    });
    let out = staging.create(shared.config.temp_dir.as_deref(), "gxm-extract-")?;
    let extractor = Arc::clone(&shared.extractor);
    let stop = job.stop.clone();
    let progress = Arc::clone(&job.progress);
    tracing::info!(archive = %archive.display(), "extracting");

    blocking("extract", move || {
        let report = move |done: u64, total: u64| {
            progress.send_modify(|s| {
                s.stage = Stage::Extracting;
                s.percent = Some(percent_of(done, total));
            });
        };
        extractor.extract(&archive, &out, &report, &stop)?;
        collapse_single_subdir(&out)
    })
    .await
}

/// Extractor progress as percent points; unknown totals read as 0.
fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = u128::from(done) * 100 / u128::from(total);
    pct.min(100) as u8
}

async fn copy(shared: &Shared, job: &ClaimedJob, source: PathBuf) -> Result<CopyStats, TransferError> {
    job.set_stage(Stage::Copying);
    if let Some(entry) = shared.lock_registry().get_mut(job.id) {
        entry.wrote_destination = true;
    }
    let opts = shared.config.copy.clone();
    let dest = job.destination.clone();
    let stop = job.stop.clone();
    let progress = Arc::clone(&job.progress);
    blocking("copy", move || {
        copy_tree(&source, &dest, &opts, &stop, &mut |snap| {
            progress.send_replace(snap.clone());
        })
    })
    .await
}

async fn verify(shared: &Shared, job: &ClaimedJob, source: PathBuf) -> Result<IntegrityReport, TransferError> {
    job.set_stage(Stage::Verifying);
    let opts = shared.config.integrity;
    let dest = job.destination.clone();
    let stop = job.stop.clone();
    blocking("verify", move || verify_tree(&source, &dest, &opts, &stop)).await
}

/// Private temp dirs of one attempt.
#[derive(Default)]
struct Staging {
    dirs: Vec<TempDir>,
}

impl Staging {
    fn create(&mut self, root: Option<&Path>, prefix: &str) -> Result<PathBuf, TransferError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| TransferError::dest_io(root, e))?;
                builder
                    .tempdir_in(root)
                    .map_err(|e| TransferError::dest_io(root, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| TransferError::dest_io(&std::env::temp_dir(), e))?,
        };
        let path = dir.path().to_path_buf();
        tracing::debug!(dir = %path.display(), "created staging dir");
        self.dirs.push(dir);
        Ok(path)
    }

    async fn cleanup(self) {
        if self.dirs.is_empty() {
            return;
        }
        let dirs = self.dirs;
        let res = tokio::task::spawn_blocking(move || {
            for dir in dirs {
                let path = dir.path().to_path_buf();
                if let Err(e) = dir.close() {
                    tracing::warn!(dir = %path.display(), "failed to remove staging dir: {e}");
                }
            }
        })
        .await;
        if let Err(e) = res {
            tracing::warn!("staging cleanup task join: {e}");
        }
    }
}
