//! Post-copy verification: every source file must exist at the destination
//! with the same length. Optionally also compares SHA-256 of same-sized pairs.

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::checksum;
use crate::control::StopToken;
use crate::copier::scan_tree;
use crate::error::{ErrorKind, TransferError};

#[derive(Debug, Clone, Copy)]
pub struct IntegrityOptions {
    /// Maximum number of offending paths kept in `IntegrityReport::samples`.
    pub sample_limit: usize,
    pub verify_checksums: bool,
}

impl Default for IntegrityOptions {
    fn default() -> Self {
        Self {
            sample_limit: 10,
            verify_checksums: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub files_checked: usize,
    pub missing: usize,
    pub mismatched: usize,
    /// First offending paths (relative), capped by `sample_limit`.
    pub samples: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.missing == 0 && self.mismatched == 0
    }

    /// `IntegrityMismatch` when anything was off. Reported alongside a
    /// completed job, never as its outcome.
    pub fn problem(&self) -> Option<ErrorKind> {
        (!self.is_clean()).then_some(ErrorKind::IntegrityMismatch)
    }

    fn record(&mut self, limit: usize, sample: String) {
        if self.samples.len() < limit {
            self.samples.push(sample);
        }
    }
}

/// Compare the tree under `source` with `dest`.
pub fn verify_tree(
    source: &Path,
    dest: &Path,
    opts: &IntegrityOptions,
    stop: &StopToken,
) -> Result<IntegrityReport, TransferError> {
    let tree = scan_tree(source)?;
    let source_is_file = fs::metadata(source)
        .map_err(|e| TransferError::source_io(source, e))?
        .is_file();
    let mut report = IntegrityReport::default();

    for file in &tree.files {
        stop.check()?;
        report.files_checked += 1;
        let rel = file.rel.display().to_string();
        let dst = dest.join(&file.rel);
        let meta = match fs::metadata(&dst) {
            Ok(m) if m.is_file() => m,
            _ => {
                report.missing += 1;
                report.record(opts.sample_limit, format!("{rel}: missing"));
                continue;
            }
        };
        if meta.len() != file.len {
            report.mismatched += 1;
            report.record(
                opts.sample_limit,
                format!("{rel}: size {} != {}", meta.len(), file.len),
            );
            continue;
        }
        if opts.verify_checksums {
            let src = if source_is_file {
                source.to_path_buf()
            } else {
                source.join(&file.rel)
            };
            match checksum::same_contents(&src, &dst) {
                Ok(true) => {}
                Ok(false) => {
                    report.mismatched += 1;
                    report.record(opts.sample_limit, format!("{rel}: checksum differs"));
                }
                Err(e) => {
                    report.mismatched += 1;
                    report.record(opts.sample_limit, format!("{rel}: {e:#}"));
                }
            }
        }
    }

    if report.is_clean() {
        tracing::debug!(files = report.files_checked, "integrity check passed");
    } else {
        tracing::warn!(
            missing = report.missing,
            mismatched = report.mismatched,
            "integrity check found problems"
        );
    }
    Ok(report)
}
