//! `gxm batch` – run a TOML manifest of jobs through one scheduler.
//!
//! ```toml
//! [[job]]
//! target = "hollow-knight"
//! destination = "/games/hollow-knight"
//! priority = "high"
//! source = { kind = "local", path = "/mnt/usb/hk.7z" }
//! ```

use anyhow::{bail, Context, Result};
use gxm_core::config::GxmConfig;
use gxm_core::{JobId, JobOutcome, JobRequest, LowSpaceAction, Scheduler, SchedulerConfig, SourceSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::absolute;
use super::display::outcome_label;

#[derive(Debug, Deserialize)]
pub(crate) struct Manifest {
    #[serde(rename = "job", default)]
    pub jobs: Vec<JobRequest>,
}

impl Manifest {
    pub(crate) fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid manifest")
    }

    /// Make local paths absolute (relative to `base`) and apply `--yes`.
    pub(crate) fn resolve(mut self, base: &Path, yes: bool) -> Self {
        for job in &mut self.jobs {
            if job.destination.is_relative() {
                job.destination = base.join(&job.destination);
            }
            if let SourceSpec::Local { path, .. } = &mut job.source {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
            if yes && job.low_space == LowSpaceAction::Ask {
                job.low_space = LowSpaceAction::Proceed;
            }
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct BatchResult {
    id: JobId,
    target: String,
    outcome: JobOutcome,
}

pub async fn run_batch(
    cfg: &GxmConfig,
    manifest_path: &Path,
    jobs: Option<usize>,
    yes: bool,
    json: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("reading manifest {}", manifest_path.display()))?;
    let manifest_path = absolute(manifest_path)?;
    let base = manifest_path.parent().unwrap_or(Path::new("/"));
    let manifest = Manifest::parse(&text)?.resolve(base, yes);
    if manifest.jobs.is_empty() {
        println!("No jobs in manifest.");
        return Ok(());
    }

    let mut sched_cfg = SchedulerConfig::from(cfg);
    if let Some(n) = jobs {
        sched_cfg.max_parallel = n;
    }
    let scheduler = Arc::new(Scheduler::start(sched_cfg));
    tracing::info!(jobs = manifest.jobs.len(), max_parallel = scheduler.max_parallel(), "batch started");

    let mut handles = Vec::with_capacity(manifest.jobs.len());
    for request in manifest.jobs {
        let target = request.target.clone();
        match scheduler.submit(request) {
            Ok(handle) => handles.push(handle),
            Err(e) => eprintln!("{target}: rejected: {e}"),
        }
    }

    let interrupt = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, cancelling all jobs...");
                scheduler.shutdown().await;
            }
        })
    };

    let mut results = Vec::with_capacity(handles.len());
    for mut handle in handles {
        let outcome = handle.outcome().await?;
        if !json {
            println!("{:<6} {:<24} {}", handle.id(), handle.target(), outcome_label(&outcome));
        }
        results.push(BatchResult {
            id: handle.id(),
            target: handle.target().to_string(),
            outcome,
        });
    }
    interrupt.abort();
    scheduler.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    let failed = results
        .iter()
        .filter(|r| matches!(r.outcome, JobOutcome::Failed { .. }))
        .count();
    if failed > 0 {
        bail!("{failed} of {} job(s) failed", results.len());
    }
    Ok(())
}
