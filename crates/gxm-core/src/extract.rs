//! Archive extraction through an external tool.
//!
//! `ArchiveExtractor` is the seam; `CommandExtractor` runs the configured
//! program (7z by default), reports `NN%` tokens from its stdout as progress
//! and kills the child when the job is stopped.

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use crate::config::ExtractorConfig;
use crate::control::StopToken;
use crate::copier::scan_tree;
use crate::error::TransferError;
use crate::progress::StageProgress;

/// Lowercase extensions treated as archives.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "7z", "rar", "tar", "gz", "tgz", "xz", "bz2", "iso"];

const STDERR_TAIL: usize = 2048;

/// Extract `archive` into `out_dir`. Runs on a blocking thread.
///
/// Must return `Err(Paused)`/`Err(Cancelled)` promptly once `stop` fires.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(
        &self,
        archive: &Path,
        out_dir: &Path,
        progress: StageProgress<'_>,
        stop: &StopToken,
    ) -> Result<(), TransferError>;
}

#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    poll: Duration,
}

impl CommandExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            poll: Duration::from_millis(50),
        }
    }

    fn render_args(&self, archive: &Path, out_dir: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                "{archive}" => archive.as_os_str().to_owned(),
                "{out}" => out_dir.as_os_str().to_owned(),
                _ => arg
                    .replace("{archive}", &archive.to_string_lossy())
                    .replace("{out}", &out_dir.to_string_lossy())
                    .into(),
            })
            .collect()
    }
}

impl From<&ExtractorConfig> for CommandExtractor {
    fn from(config: &ExtractorConfig) -> Self {
        Self::new(config)
    }
}

impl ArchiveExtractor for CommandExtractor {
    fn extract(
        &self,
        archive: &Path,
        out_dir: &Path,
        progress: StageProgress<'_>,
        stop: &StopToken,
    ) -> Result<(), TransferError> {
        stop.check()?;
        fs::create_dir_all(out_dir).map_err(|e| TransferError::dest_io(out_dir, e))?;
        tracing::debug!(program = %self.program, archive = %archive.display(), "starting extractor");

        let mut command = Command::new(&self.program);
        command
            .args(self.render_args(archive, out_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a stop also takes down anything a wrapper forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| TransferError::extraction(format!("failed to start {}: {e}", self.program)))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, stderr_tail) = std::thread::scope(|scope| {
            if let Some(out) = stdout {
                scope.spawn(move || report_percent(out, progress));
            }
            let tail = stderr.map(|err| scope.spawn(move || read_tail(err)));
            let status = wait_or_kill(&mut child, stop, self.poll);
            let tail = tail.and_then(|h| h.join().ok()).unwrap_or_default();
            status.map(|s| (s, tail))
        })?;

        if !status.success() {
            let mut msg = format!("{} exited with {status}", self.program);
            if !stderr_tail.is_empty() {
                msg.push_str(": ");
                msg.push_str(&stderr_tail);
            }
            return Err(TransferError::ExtractionFailed(msg));
        }
        progress(100, 100);
        Ok(())
    }
}

fn wait_or_kill(child: &mut Child, stop: &StopToken, poll: Duration) -> Result<ExitStatus, TransferError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => return Err(TransferError::extraction(format!("wait for extractor: {e}"))),
        }
        if let Some(reason) = stop.reason() {
            tracing::debug!("stop requested, killing extractor");
            kill_process_group(child);
            let _ = child.wait();
            return Err(reason.into());
        }
        std::thread::sleep(poll);
    }
}

/// Kill the child and every process left in its group. Grandchildren would
/// otherwise keep the output pipes open and block the reader threads.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: kill(2) only sends a signal; a negative pid addresses the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

/// Last `NN%` token of a progress line, if any.
pub fn parse_percent(line: &str) -> Option<u8> {
    line.split_whitespace()
        .filter_map(|tok| tok.strip_suffix('%'))
        .filter_map(|num| num.parse::<u8>().ok())
        .filter(|p| *p <= 100)
        .last()
}

fn report_percent(mut reader: impl Read, progress: StageProgress<'_>) {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    let mut last = None;
    let mut flush = |pending: &mut Vec<u8>| {
        if let Some(p) = parse_percent(&String::from_utf8_lossy(pending)) {
            if last != Some(p) {
                last = Some(p);
                progress(u64::from(p), 100);
            }
        }
        pending.clear();
    };
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        // 7z redraws its progress line with \r or backspaces.
        for &b in &buf[..n] {
            if matches!(b, b'\r' | b'\n' | 0x08) {
                flush(&mut pending);
            } else {
                pending.push(b);
            }
        }
    }
    flush(&mut pending);
}

fn read_tail(mut reader: impl Read) -> String {
    let mut data = Vec::new();
    let _ = reader.read_to_end(&mut data);
    let start = data.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&data[start..]).trim().to_string()
}

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ARCHIVE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// First archive under `dir`, in sorted walk order.
pub fn find_first_archive(dir: &Path) -> Result<Option<PathBuf>, TransferError> {
    let tree = scan_tree(dir)?;
    Ok(tree
        .files
        .iter()
        .find(|f| is_archive(&f.rel))
        .map(|f| dir.join(&f.rel)))
}

/// Archive to extract for a local source, or None to copy it as is.
/// A single archive file is always extracted; a directory only when `extract` is set.
pub fn archive_for_local_source(path: &Path, extract: bool) -> Result<Option<PathBuf>, TransferError> {
    let meta = fs::metadata(path).map_err(|e| TransferError::source_io(path, e))?;
    if meta.is_file() {
        return Ok(is_archive(path).then(|| path.to_path_buf()));
    }
    if !extract {
        return Ok(None);
    }
    let found = find_first_archive(path)?;
    if found.is_none() {
        tracing::warn!(source = %path.display(), "extraction requested but no archive found, copying as is");
    }
    Ok(found)
}

/// When extraction produced exactly one top-level directory, use it as the source root.
pub fn collapse_single_subdir(out_dir: &Path) -> Result<PathBuf, TransferError> {
    let entries = fs::read_dir(out_dir)
        .map_err(|e| TransferError::source_io(out_dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransferError::source_io(out_dir, e))?;
    if let [only] = entries.as_slice() {
        if only.path().is_dir() {
            return Ok(only.path());
        }
    }
    Ok(out_dir.to_path_buf())
}
