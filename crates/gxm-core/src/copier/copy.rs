//! Chunked, resumable copy of a directory tree.
//!
//! A destination file that already has the source's length is counted as
//! transferred without reading it. Everything else is streamed in
//! `chunk_size` pieces; the stop token is checked between chunks and files.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::control::StopToken;
use crate::error::TransferError;
use crate::progress::{ProgressMeter, ProgressSnapshot, Stage};

use super::enumerate::{scan_tree, TreeFile};

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub chunk_size: usize,
    pub progress_interval: Duration,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            progress_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files_total: usize,
    pub files_copied: usize,
    /// Files skipped by the same-length rule.
    pub files_skipped: usize,
    pub bytes_total: u64,
    /// Bytes actually read and written (skipped files excluded).
    pub bytes_written: u64,
}

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), TransferError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| TransferError::dest_io(parent, e))?;
        }
    }
    Ok(())
}

struct Tracker<'a> {
    meter: ProgressMeter,
    snap: ProgressSnapshot,
    on_progress: &'a mut dyn FnMut(&ProgressSnapshot),
}

impl Tracker<'_> {
    fn tick(&mut self, force: bool) {
        if let Some(s) = self.meter.observe(self.snap.clone(), force) {
            (self.on_progress)(&s);
        }
    }
}

/// Copy `source` (file or directory) into the directory `dest`.
pub fn copy_tree(
    source: &Path,
    dest: &Path,
    opts: &CopyOptions,
    stop: &StopToken,
    on_progress: &mut dyn FnMut(&ProgressSnapshot),
) -> Result<CopyStats, TransferError> {
    stop.check()?;
    let tree = scan_tree(source)?;
    let source_is_file = fs::metadata(source)
        .map_err(|e| TransferError::source_io(source, e))?
        .is_file();

    fs::create_dir_all(dest).map_err(|e| TransferError::dest_io(dest, e))?;
    for dir in &tree.dirs {
        let target = dest.join(dir);
        fs::create_dir_all(&target).map_err(|e| TransferError::dest_io(&target, e))?;
    }

    let mut stats = CopyStats {
        files_total: tree.files.len(),
        bytes_total: tree.total_bytes,
        ..Default::default()
    };
    let mut tracker = Tracker {
        meter: ProgressMeter::new(opts.progress_interval),
        snap: ProgressSnapshot {
            stage: Stage::Copying,
            bytes_total: tree.total_bytes,
            files_total: tree.files.len(),
            ..Default::default()
        },
        on_progress,
    };
    tracker.tick(true);

    let mut buf = vec![0u8; opts.chunk_size.max(1)];
    for file in &tree.files {
        stop.check()?;
        let src = if source_is_file {
            source.to_path_buf()
        } else {
            source.join(&file.rel)
        };
        let dst = dest.join(&file.rel);
        tracker.snap.current_file = Some(file.rel.display().to_string());

        if same_length(&dst, file.len) {
            tracing::trace!(file = %file.rel.display(), "skipping, destination has same length");
            tracker.meter.credit(file.len);
            tracker.snap.bytes_done += file.len;
            tracker.snap.files_done += 1;
            tracker.snap.files_skipped += 1;
            stats.files_skipped += 1;
            tracker.tick(false);
            continue;
        }

        stats.bytes_written += copy_file_chunked(&src, &dst, file, &mut buf, stop, &mut tracker)?;
        tracker.snap.files_done += 1;
        stats.files_copied += 1;
        tracker.tick(false);
    }

    tracker.snap.current_file = None;
    tracker.tick(true);
    tracing::debug!(
        files_copied = stats.files_copied,
        files_skipped = stats.files_skipped,
        bytes_written = stats.bytes_written,
        "copy finished"
    );
    Ok(stats)
}

fn same_length(dst: &Path, len: u64) -> bool {
    fs::metadata(dst).map(|m| m.is_file() && m.len() == len).unwrap_or(false)
}

fn copy_file_chunked(
    src: &Path,
    dst: &Path,
    file: &TreeFile,
    buf: &mut [u8],
    stop: &StopToken,
    tracker: &mut Tracker<'_>,
) -> Result<u64, TransferError> {
    ensure_parent_dir_exists(dst)?;
    let mut input = File::open(src).map_err(|e| TransferError::source_io(src, e))?;
    let mut output = File::create(dst).map_err(|e| TransferError::dest_io(dst, e))?;
    let mut written = 0u64;
    loop {
        let n = input
            .read(buf)
            .map_err(|e| TransferError::source_io(src, e))?;
        if n == 0 {
            break;
        }
        output
            .write_all(&buf[..n])
            .map_err(|e| TransferError::dest_io(dst, e))?;
        written += n as u64;
        tracker.snap.bytes_done += n as u64;
        tracker.tick(false);
        stop.check()?;
    }
    output.flush().map_err(|e| TransferError::dest_io(dst, e))?;
    if written != file.len {
        tracing::warn!(
            file = %file.rel.display(),
            expected = file.len,
            written,
            "source length changed during copy"
        );
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{JobControl, JobSignal};

    fn write_tree(root: &Path) {
        fs::create_dir_all(root.join("data/sub")).unwrap();
        fs::create_dir_all(root.join("saves")).unwrap();
        fs::write(root.join("game.exe"), vec![7u8; 3000]).unwrap();
        fs::write(root.join("data/level1.pak"), vec![1u8; 5000]).unwrap();
        fs::write(root.join("data/sub/tex.bin"), vec![2u8; 1234]).unwrap();
    }

    fn small_chunks() -> CopyOptions {
        CopyOptions {
            chunk_size: 512,
            progress_interval: Duration::ZERO,
        }
    }

    #[test]
    fn copies_tree_and_recreates_empty_dirs() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write_tree(src.path());
        let dest = dst.path().join("install");

        let mut ticks = Vec::new();
        let stats = copy_tree(
            src.path(),
            &dest,
            &small_chunks(),
            &StopToken::detached(),
            &mut |s| ticks.push(s.clone()),
        )
        .unwrap();

        assert_eq!(stats.files_copied, 3);
        assert_eq!(stats.files_skipped, 0);
        assert_eq!(stats.bytes_written, 9234);
        assert_eq!(fs::read(dest.join("data/sub/tex.bin")).unwrap(), vec![2u8; 1234]);
        assert!(dest.join("saves").is_dir());

        let last = ticks.last().unwrap();
        assert_eq!(last.bytes_done, 9234);
        assert_eq!(last.bytes_total, 9234);
        assert_eq!(last.files_done, 3);
        assert_eq!(last.files_total, 3);
        assert!(ticks.windows(2).all(|w| w[0].bytes_done <= w[1].bytes_done));
    }

    #[test]
    fn same_length_files_are_skipped() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write_tree(src.path());
        fs::create_dir_all(dst.path().join("data")).unwrap();
        // Same length, different content: the rule only looks at length.
        fs::write(dst.path().join("game.exe"), vec![0u8; 3000]).unwrap();
        fs::write(dst.path().join("data/level1.pak"), vec![9u8; 10]).unwrap();

        let mut last = None;
        let stats = copy_tree(
            src.path(),
            dst.path(),
            &small_chunks(),
            &StopToken::detached(),
            &mut |s| last = Some(s.clone()),
        )
        .unwrap();

        assert_eq!(stats.files_skipped, 1);
        assert_eq!(last.unwrap().files_skipped, 1);
        assert_eq!(stats.files_copied, 2);
        assert_eq!(fs::read(dst.path().join("game.exe")).unwrap(), vec![0u8; 3000]);
        assert_eq!(fs::metadata(dst.path().join("data/level1.pak")).unwrap().len(), 5000);
    }

    #[test]
    fn single_file_source_lands_inside_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let file = src.path().join("setup.bin");
        fs::write(&file, vec![3u8; 777]).unwrap();

        let stats = copy_tree(&file, dst.path(), &small_chunks(), &StopToken::detached(), &mut |_| {})
            .unwrap();
        assert_eq!(stats.files_copied, 1);
        assert_eq!(fs::metadata(dst.path().join("setup.bin")).unwrap().len(), 777);
    }

    #[test]
    fn stop_between_chunks_leaves_partial_output() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("big.bin"), vec![5u8; 8192]).unwrap();
        let (control, token) = JobControl::new();

        let mut seen = 0;
        let err = copy_tree(src.path(), dst.path(), &small_chunks(), &token, &mut |s| {
            seen += 1;
            if s.bytes_done >= 1024 {
                control.request(JobSignal::Pause);
            }
        })
        .unwrap_err();

        assert!(matches!(err, TransferError::Paused));
        assert!(seen > 1);
        let partial = fs::metadata(dst.path().join("big.bin")).unwrap().len();
        assert!(partial > 0 && partial < 8192);
    }

    #[test]
    fn already_stopped_token_copies_nothing() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write_tree(src.path());
        let (control, token) = JobControl::new();
        control.request(JobSignal::Cancel);
        let dest = dst.path().join("install");
        let err = copy_tree(src.path(), &dest, &small_chunks(), &token, &mut |_| {}).unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert!(!dest.exists());
    }
}
