//! In-process stand-ins for cloud providers and the archive tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use gxm_core::cloud::CloudSource;
use gxm_core::control::StopToken;
use gxm_core::extract::ArchiveExtractor;
use gxm_core::progress::StageProgress;
use gxm_core::TransferError;

fn write_payload(dest_dir: &Path, name: &str, len: usize) -> Result<PathBuf, TransferError> {
    let path = dest_dir.join(name);
    fs::write(&path, vec![0xAB; len]).map_err(|e| TransferError::dest_io(&path, e))?;
    Ok(path)
}

/// Blocks every download until `open` is called. Honors stop requests while waiting.
pub struct GateSource {
    open: AtomicBool,
    attempts: AtomicUsize,
    payload_len: usize,
}

impl GateSource {
    pub fn new(payload_len: usize) -> Self {
        Self {
            open: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            payload_len,
        }
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Number of download calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl CloudSource for GateSource {
    fn download(
        &self,
        _file_id: &str,
        dest_dir: &Path,
        progress: StageProgress<'_>,
        stop: &StopToken,
    ) -> Result<PathBuf, TransferError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        loop {
            stop.check()?;
            if self.open.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let path = write_payload(dest_dir, "payload.bin", self.payload_len)?;
        progress(self.payload_len as u64, self.payload_len as u64);
        Ok(path)
    }
}

/// Records the order of downloads and the peak number running at once.
pub struct RecordingSource {
    hold: Duration,
    size_hint: Option<u64>,
    order: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingSource {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            size_hint: None,
            order: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl CloudSource for RecordingSource {
    fn download(
        &self,
        file_id: &str,
        dest_dir: &Path,
        progress: StageProgress<'_>,
        stop: &StopToken,
    ) -> Result<PathBuf, TransferError> {
        self.order.lock().unwrap().push(file_id.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let started = std::time::Instant::now();
        let waited = loop {
            if let Err(e) = stop.check() {
                break Err(e);
            }
            if started.elapsed() >= self.hold {
                break Ok(());
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        waited?;

        let path = write_payload(dest_dir, &format!("{file_id}.bin"), 4096)?;
        progress(4096, 4096);
        Ok(path)
    }

    fn size_hint(&self, _file_id: &str) -> Option<u64> {
        self.size_hint
    }
}

/// Pretends to unpack an archive into `<out>/Game/`. The archive's bytes
/// become `Game/data.bin`.
#[derive(Default)]
pub struct UnpackExtractor {
    fail: bool,
    out_dirs: Mutex<Vec<PathBuf>>,
}

impl UnpackExtractor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn out_dirs(&self) -> Vec<PathBuf> {
        self.out_dirs.lock().unwrap().clone()
    }
}

impl ArchiveExtractor for UnpackExtractor {
    fn extract(
        &self,
        archive: &Path,
        out_dir: &Path,
        progress: StageProgress<'_>,
        stop: &StopToken,
    ) -> Result<(), TransferError> {
        stop.check()?;
        self.out_dirs.lock().unwrap().push(out_dir.to_path_buf());
        if self.fail {
            return Err(TransferError::extraction("corrupt archive"));
        }
        let root = out_dir.join("Game");
        fs::create_dir_all(root.join("sub")).map_err(|e| TransferError::dest_io(&root, e))?;
        let data = fs::read(archive).map_err(|e| TransferError::source_io(archive, e))?;
        fs::write(root.join("data.bin"), data).map_err(|e| TransferError::dest_io(&root, e))?;
        fs::write(root.join("sub/readme.txt"), b"readme").map_err(|e| TransferError::dest_io(&root, e))?;
        progress(100, 100);
        Ok(())
    }
}
