//! CLI for the GXM game transfer manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gxm_core::config;
use gxm_core::Priority;
use std::path::PathBuf;

use commands::{run_batch, run_checksum, run_config, run_space, run_transfer, run_verify, TransferArgs};

/// Top-level CLI for the GXM game transfer manager.
#[derive(Debug, Parser)]
#[command(name = "gxm")]
#[command(about = "GXM: game install transfer manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Copy (and extract if needed) one game into a destination directory.
    Transfer {
        /// Local file, directory or archive to install from.
        source: PathBuf,

        /// Destination directory.
        destination: PathBuf,

        /// Target identity (defaults to the destination directory name).
        #[arg(long)]
        target: Option<String>,

        /// Look for an archive inside a source directory and extract it.
        #[arg(long)]
        extract: bool,

        /// Queue tier: low, normal or high.
        #[arg(long, default_value = "normal")]
        priority: Priority,

        /// Continue without asking when the destination looks too small.
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Run every job of a TOML manifest through one scheduler.
    Batch {
        /// Path to the manifest (`[[job]]` tables).
        manifest: PathBuf,

        /// Run up to N jobs concurrently (default from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,

        /// Continue without asking when a destination looks too small.
        #[arg(long, short = 'y')]
        yes: bool,

        /// Print outcomes as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report whether a source fits on the destination volume.
    Space {
        source: PathBuf,
        destination: PathBuf,
    },

    /// Compare a destination tree with its source.
    Verify {
        source: PathBuf,
        destination: PathBuf,

        /// Also compare SHA-256 of files with equal sizes.
        #[arg(long)]
        checksums: bool,
    },

    /// Compute SHA-256 of a file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Show the config file path and effective values.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Transfer {
                source,
                destination,
                target,
                extract,
                priority,
                yes,
            } => {
                let args = TransferArgs {
                    source,
                    destination,
                    target,
                    extract,
                    priority,
                    yes,
                };
                run_transfer(&cfg, args).await?
            }
            CliCommand::Batch {
                manifest,
                jobs,
                yes,
                json,
            } => run_batch(&cfg, &manifest, jobs, yes, json).await?,
            CliCommand::Space {
                source,
                destination,
            } => run_space(&cfg, &source, &destination).await?,
            CliCommand::Verify {
                source,
                destination,
                checksums,
            } => run_verify(&cfg, &source, &destination, checksums).await?,
            CliCommand::Checksum { path } => run_checksum(&path).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
