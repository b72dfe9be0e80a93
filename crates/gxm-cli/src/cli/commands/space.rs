//! `gxm space` – check whether a source fits on the destination volume.

use anyhow::Result;
use gxm_core::config::GxmConfig;
use gxm_core::space;
use std::path::Path;

use super::absolute;
use super::display::space_summary;

pub async fn run_space(cfg: &GxmConfig, source: &Path, destination: &Path) -> Result<()> {
    let source = absolute(source)?;
    let destination = absolute(destination)?;
    if !source.exists() {
        anyhow::bail!("source {} does not exist", source.display());
    }
    let margin = cfg.space_margin;
    let dest = destination.clone();
    let check = tokio::task::spawn_blocking(move || space::check_space(&source, &dest, margin)).await?;

    let verdict = if check.sufficient { "ok" } else { "insufficient" };
    println!(
        "{}: {} ({}, margin {:.0}%)",
        destination.display(),
        verdict,
        space_summary(&check),
        (margin - 1.0) * 100.0
    );
    Ok(())
}
