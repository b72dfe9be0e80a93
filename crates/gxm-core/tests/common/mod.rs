//! Shared helpers for scheduler integration tests.

#![allow(dead_code)]

pub mod fakes;

use std::fs;
use std::path::Path;
use std::time::Duration;

use gxm_core::{JobHandle, JobOutcome, SchedulerConfig};

/// Scheduler config with fast progress ticks for tests.
pub fn config(max_parallel: usize) -> SchedulerConfig {
    let mut cfg = SchedulerConfig::default();
    cfg.max_parallel = max_parallel;
    cfg.copy.chunk_size = 64 * 1024;
    cfg.copy.progress_interval = Duration::from_millis(10);
    cfg
}

/// Write `files` (relative path, length) under `root`, creating parents.
pub fn write_files(root: &Path, files: &[(&str, usize)]) {
    for (i, (rel, len)) in files.iter().enumerate() {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, vec![(i as u8).wrapping_add(1); *len]).unwrap();
    }
}

pub async fn outcome(handle: &mut JobHandle) -> JobOutcome {
    tokio::time::timeout(Duration::from_secs(30), handle.outcome())
        .await
        .expect("timed out waiting for outcome")
        .expect("outcome channel closed")
}

/// Poll `cond` until it holds; panics after 10s.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_status(handle: &mut JobHandle, want: gxm_core::JobStatus) {
    let reached = tokio::time::timeout(Duration::from_secs(10), handle.wait_for_status(want))
        .await
        .expect("timed out waiting for status");
    assert!(reached, "job {} never reached {want}", handle.id());
}

/// Drain every status change of a finished job.
pub async fn transitions(handle: &mut JobHandle) -> Vec<gxm_core::JobStatus> {
    let mut seen = Vec::new();
    while let Some(status) = handle.next_transition().await {
        seen.push(status);
    }
    seen
}

/// Pause job `handle` once the copy stage has finished at least one file,
/// leaving the next one partially written.
pub async fn pause_mid_copy(sched: &gxm_core::Scheduler, handle: &JobHandle) {
    let mut rx = handle.progress_watch();
    let seen = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|s| s.stage == gxm_core::progress::Stage::Copying && s.files_done >= 1),
    )
    .await
    .expect("copy stage not reached in time")
    .is_ok();
    assert!(seen, "progress channel closed before copying");
    sched.pause(handle.id()).unwrap();
}

/// Source tree for mid-copy pauses: one small file, then one large enough
/// that 16-byte chunks keep it in flight for a while.
pub fn two_file_tree(root: &Path) -> (u64, u64) {
    write_files(root, &[("a.bin", 4096), ("b.bin", 4 * 1024 * 1024)]);
    (4096, 4 * 1024 * 1024)
}

/// Config that copies in tiny chunks and ticks on every one.
pub fn slow_copy_config() -> SchedulerConfig {
    let mut cfg = config(1);
    cfg.copy.chunk_size = 16;
    cfg.copy.progress_interval = Duration::ZERO;
    cfg
}
