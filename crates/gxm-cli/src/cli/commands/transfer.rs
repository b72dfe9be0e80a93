//! `gxm transfer` – install one game with live progress.

use anyhow::{bail, Context, Result};
use gxm_core::config::GxmConfig;
use gxm_core::{
    JobId, JobOutcome, JobRequest, LowSpaceAction, Priority, Scheduler, SchedulerConfig, SchedulerError,
    SourceSpec,
};
use std::path::PathBuf;

use super::absolute;
use super::display::{answer_space_prompts, follow_progress, outcome_label};

#[derive(Debug)]
pub struct TransferArgs {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub target: Option<String>,
    pub extract: bool,
    pub priority: Priority,
    pub yes: bool,
}

impl TransferArgs {
    fn into_request(self) -> Result<JobRequest> {
        let source = absolute(&self.source)?;
        let destination = absolute(&self.destination)?;
        let target = match self.target {
            Some(t) => t,
            None => destination
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("cannot derive a target name from the destination; pass --target")?,
        };
        let low_space = if self.yes {
            LowSpaceAction::Proceed
        } else {
            LowSpaceAction::Ask
        };
        Ok(JobRequest::new(
            target,
            SourceSpec::Local {
                path: source,
                extract: self.extract,
            },
            destination,
        )
        .with_priority(self.priority)
        .with_low_space(low_space))
    }
}

/// Cancel `id`; a job that finalized in the meantime is not an error, its
/// outcome is still waiting on the handle.
async fn cancel_unless_finished(scheduler: &Scheduler, id: JobId) -> Result<(), SchedulerError> {
    match scheduler.cancel(id).await {
        Ok(()) | Err(SchedulerError::UnknownJob(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

pub async fn run_transfer(cfg: &GxmConfig, args: TransferArgs) -> Result<()> {
    let request = args.into_request()?;
    let (prompt_tx, prompt_rx) = tokio::sync::mpsc::channel(1);
    let prompt_task = tokio::spawn(answer_space_prompts(prompt_rx));

    let scheduler = Scheduler::builder(SchedulerConfig::from(cfg))
        .space_prompts(prompt_tx)
        .start();
    println!(
        "Installing {} -> {}",
        request.target,
        request.destination.display()
    );
    let mut handle = scheduler.submit(request)?;
    let progress_task = tokio::spawn(follow_progress(handle.progress_watch()));
    let (id, target) = (handle.id(), handle.target().to_string());

    let pending = handle.outcome();
    tokio::pin!(pending);
    let outcome = tokio::select! {
        outcome = &mut pending => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(job_id = id, "interrupted, cancelling");
            cancel_unless_finished(&scheduler, id).await?;
            pending.await?
        }
    };
    scheduler.shutdown().await;
    drop(scheduler);
    let _ = progress_task.await;
    prompt_task.abort();

    println!("{target}: {}", outcome_label(&outcome));
    match outcome {
        JobOutcome::Completed { integrity, .. } => {
            for sample in &integrity.samples {
                println!("  {sample}");
            }
            Ok(())
        }
        JobOutcome::Failed { kind, .. } => bail!("transfer failed ({kind})"),
        JobOutcome::Cancelled => bail!("transfer cancelled"),
    }
}
