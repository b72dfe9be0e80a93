//! Terminal output shared by `transfer` and `batch`: progress lines, outcome
//! rows and the interactive low-space prompt.

use gxm_core::progress::{ProgressSnapshot, Stage};
use gxm_core::space::SpaceCheck;
use gxm_core::{JobOutcome, SpacePrompt};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

const MIB: f64 = 1_048_576.0;

pub(crate) fn mib(bytes: u64) -> f64 {
    bytes as f64 / MIB
}

fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(d) => format!("{:.0}s", d.as_secs_f64()),
        None => "?".to_string(),
    }
}

/// One progress line, e.g. `copying  12.0 / 40.0 MiB (30.0%)  85.00 MiB/s  ETA 1s`.
pub(crate) fn progress_line(snap: &ProgressSnapshot) -> String {
    let pct = snap.fraction() * 100.0;
    match snap.stage {
        Stage::Extracting => format!("{:<11} {}%", snap.stage.as_str(), snap.percent.unwrap_or(0)),
        Stage::Copying => format!(
            "{:<11} {:.1} / {:.1} MiB ({:.1}%)  {} / {} files  {:.2} MiB/s  ETA {}",
            snap.stage.as_str(),
            mib(snap.bytes_done),
            mib(snap.bytes_total),
            pct,
            snap.files_done,
            snap.files_total,
            snap.speed_bps / MIB,
            format_eta(snap.eta)
        ),
        Stage::Downloading => format!(
            "{:<11} {:.1} / {:.1} MiB ({:.1}%)",
            snap.stage.as_str(),
            mib(snap.bytes_done),
            mib(snap.bytes_total),
            pct
        ),
        stage => stage.as_str().to_string(),
    }
}

/// Print progress in place until the job's progress channel closes.
pub(crate) async fn follow_progress(mut rx: watch::Receiver<ProgressSnapshot>) {
    let mut last = String::new();
    while rx.changed().await.is_ok() {
        let line = progress_line(&rx.borrow_and_update());
        if line != last {
            print!("\r  {line:<90}");
            let _ = std::io::stdout().flush();
            last = line;
        }
    }
    if !last.is_empty() {
        println!();
    }
}

pub(crate) fn outcome_label(outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Completed { integrity, .. } if integrity.is_clean() => {
            format!("completed ({} files verified)", integrity.files_checked)
        }
        JobOutcome::Completed { integrity, .. } => format!(
            "completed with {} missing and {} mismatched file(s)",
            integrity.missing, integrity.mismatched
        ),
        JobOutcome::Failed { kind, message } => format!("failed [{kind}]: {message}"),
        JobOutcome::Cancelled => "cancelled".to_string(),
    }
}

pub(crate) fn space_summary(check: &SpaceCheck) -> String {
    let available = check
        .available_bytes
        .map(|a| format!("{:.1} MiB", mib(a)))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "needs {:.1} MiB, {} free",
        mib(check.required_bytes),
        available
    )
}

/// Ask on stdin for every low-space prompt; anything but `y`/`yes` declines.
pub(crate) async fn answer_space_prompts(mut prompts: mpsc::Receiver<SpacePrompt>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(prompt) = prompts.recv().await {
        println!();
        println!(
            "Destination {} for {} may be too small: {}.",
            prompt.destination.display(),
            prompt.target,
            space_summary(&prompt.check)
        );
        print!("Continue anyway? [y/N] ");
        let _ = std::io::stdout().flush();
        let proceed = match lines.next_line().await {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("reading prompt answer: {e}");
                false
            }
        };
        prompt.respond(proceed);
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
