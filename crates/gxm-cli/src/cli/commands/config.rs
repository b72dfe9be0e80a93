//! `gxm config` – print the config file path and the loaded values.

use anyhow::Result;
use gxm_core::config::{self, GxmConfig};

pub fn run_config(cfg: &GxmConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    if cfg.max_parallel != cfg.effective_max_parallel() {
        println!(
            "# max_parallel is clamped to {} at runtime",
            cfg.effective_max_parallel()
        );
    }
    Ok(())
}
