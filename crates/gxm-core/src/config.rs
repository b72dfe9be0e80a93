use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Lowest and highest accepted values for `max_parallel`.
pub const MIN_PARALLEL: usize = 1;
pub const MAX_PARALLEL: usize = 10;

/// External archive tool invocation (optional section in config.toml).
///
/// `args` is a template: `{archive}` and `{out}` are replaced with the archive
/// path and the output directory. Progress is parsed from `NN%` tokens on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Program to run (looked up on PATH when not absolute).
    pub program: String,
    /// Argument template.
    pub args: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: "7z".to_string(),
            args: vec![
                "x".to_string(),
                "-y".to_string(),
                "-bsp1".to_string(),
                "-o{out}".to_string(),
                "{archive}".to_string(),
            ],
        }
    }
}

/// Global configuration loaded from `~/.config/gxm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GxmConfig {
    /// Maximum number of jobs running at once (clamped to 1..=10).
    pub max_parallel: usize,
    /// Read/write chunk size of the copy engine.
    pub chunk_size_bytes: usize,
    /// Minimum interval between two progress ticks of one job.
    pub progress_interval_ms: u64,
    /// Free space must be at least `required * space_margin`.
    pub space_margin: f64,
    /// Maximum number of offending paths kept in an integrity report.
    pub integrity_sample_limit: usize,
    /// Also compare SHA-256 of same-sized files after copy (slow on large trees).
    #[serde(default)]
    pub verify_checksums: bool,
    /// Parent directory for private download/extraction dirs (None = system temp).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

impl Default for GxmConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            chunk_size_bytes: 1024 * 1024,
            progress_interval_ms: 250,
            space_margin: 1.10,
            integrity_sample_limit: 10,
            verify_checksums: false,
            temp_dir: None,
            extractor: ExtractorConfig::default(),
        }
    }
}

impl GxmConfig {
    /// `max_parallel` clamped into the accepted range.
    pub fn effective_max_parallel(&self) -> usize {
        clamp_parallel(self.max_parallel)
    }
}

pub fn clamp_parallel(n: usize) -> usize {
    n.clamp(MIN_PARALLEL, MAX_PARALLEL)
}

/// `~/.config/gxm/config.toml` (parent dir is created).
pub fn config_path() -> Result<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix("gxm")?;
    Ok(dirs.place_config_file("config.toml")?)
}

/// Load the config at the default path, writing defaults on first run.
pub fn load_or_init() -> Result<GxmConfig> {
    load_or_init_at(&config_path()?)
}

/// Load `path`, or write `GxmConfig::default()` there when it is missing.
pub fn load_or_init_at(path: &Path) -> Result<GxmConfig> {
    match fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).with_context(|| format!("parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let cfg = GxmConfig::default();
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
            }
            fs::write(path, toml::to_string_pretty(&cfg)?)
                .with_context(|| format!("write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote default config");
            Ok(cfg)
        }
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = GxmConfig::default();
        assert_eq!(cfg.max_parallel, 1);
        assert_eq!(cfg.chunk_size_bytes, 1024 * 1024);
        assert_eq!(cfg.progress_interval_ms, 250);
        assert!((cfg.space_margin - 1.10).abs() < 1e-9);
        assert!(!cfg.verify_checksums);
        assert_eq!(cfg.extractor.program, "7z");
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = GxmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: GxmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_parallel, cfg.max_parallel);
        assert_eq!(parsed.chunk_size_bytes, cfg.chunk_size_bytes);
        assert_eq!(parsed.extractor, cfg.extractor);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            max_parallel = 4
            chunk_size_bytes = 65536
            progress_interval_ms = 100
            space_margin = 1.25
            integrity_sample_limit = 3
            verify_checksums = true
            temp_dir = "/var/tmp/gxm"

            [extractor]
            program = "unzip"
            args = ["-o", "{archive}", "-d", "{out}"]
        "#;
        let cfg: GxmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_parallel, 4);
        assert_eq!(cfg.chunk_size_bytes, 65536);
        assert!(cfg.verify_checksums);
        assert_eq!(cfg.temp_dir, Some(PathBuf::from("/var/tmp/gxm")));
        assert_eq!(cfg.extractor.program, "unzip");
        assert_eq!(cfg.extractor.args.len(), 4);
    }

    #[test]
    fn optional_sections_default_when_missing() {
        let toml = r#"
            max_parallel = 2
            chunk_size_bytes = 4096
            progress_interval_ms = 250
            space_margin = 1.1
            integrity_sample_limit = 10
        "#;
        let cfg: GxmConfig = toml::from_str(toml).unwrap();
        assert!(!cfg.verify_checksums);
        assert!(cfg.temp_dir.is_none());
        assert_eq!(cfg.extractor, ExtractorConfig::default());
    }

    #[test]
    fn max_parallel_is_clamped() {
        let mut cfg = GxmConfig::default();
        cfg.max_parallel = 0;
        assert_eq!(cfg.effective_max_parallel(), 1);
        cfg.max_parallel = 64;
        assert_eq!(cfg.effective_max_parallel(), 10);
        cfg.max_parallel = 3;
        assert_eq!(cfg.effective_max_parallel(), 3);
    }

    #[test]
    fn first_load_writes_defaults_then_reads_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let cfg = load_or_init_at(&path).unwrap();
        assert_eq!(cfg.max_parallel, 1);
        assert!(path.exists());

        let edited = fs::read_to_string(&path)
            .unwrap()
            .replace("max_parallel = 1", "max_parallel = 4");
        fs::write(&path, edited).unwrap();
        assert_eq!(load_or_init_at(&path).unwrap().max_parallel, 4);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_parallel = \"many\"").unwrap();
        assert!(load_or_init_at(&path).is_err());
    }
}
