//! `gxm verify` – compare an installed tree with its source.

use anyhow::{bail, Result};
use gxm_core::config::GxmConfig;
use gxm_core::control::StopToken;
use gxm_core::integrity::{self, IntegrityOptions};
use std::path::Path;

use super::absolute;

pub async fn run_verify(cfg: &GxmConfig, source: &Path, destination: &Path, checksums: bool) -> Result<()> {
    let source = absolute(source)?;
    let destination = absolute(destination)?;
    let opts = IntegrityOptions {
        sample_limit: cfg.integrity_sample_limit,
        verify_checksums: checksums || cfg.verify_checksums,
    };
    let report = tokio::task::spawn_blocking(move || {
        integrity::verify_tree(&source, &destination, &opts, &StopToken::detached())
    })
    .await??;

    println!(
        "{} file(s) checked, {} missing, {} mismatched",
        report.files_checked, report.missing, report.mismatched
    );
    for sample in &report.samples {
        println!("  {sample}");
    }
    if !report.is_clean() {
        bail!("destination does not match source");
    }
    Ok(())
}
