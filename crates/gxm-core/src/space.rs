//! Preflight disk-space estimation with a safety margin.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a space check. `available_bytes` is None when the free space of
/// the destination volume could not be read; that case counts as sufficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpaceCheck {
    pub sufficient: bool,
    pub required_bytes: u64,
    pub available_bytes: Option<u64>,
}

/// Compare the size of `source` against free space at `destination`.
pub fn check_space(source: &Path, destination: &Path, margin: f64) -> SpaceCheck {
    check_required(tree_size(source), destination, margin)
}

/// Same as `check_space` for a size known up front (e.g. a cloud size hint).
pub fn check_required(required_bytes: u64, destination: &Path, margin: f64) -> SpaceCheck {
    let available_bytes = available_space(destination);
    let sufficient = match available_bytes {
        Some(available) => is_sufficient(required_bytes, available, margin),
        None => true,
    };
    SpaceCheck {
        sufficient,
        required_bytes,
        available_bytes,
    }
}

/// `available >= required * margin`.
pub fn is_sufficient(required: u64, available: u64, margin: f64) -> bool {
    available as f64 >= required as f64 * margin
}

/// Sum of file lengths under `path` (a single file counts its own length).
/// Unreadable entries are skipped.
pub fn tree_size(path: &Path) -> u64 {
    let Ok(meta) = fs::metadata(path) else {
        return 0;
    };
    if meta.is_file() {
        return meta.len();
    }
    if !meta.is_dir() {
        return 0;
    }
    let Ok(read_dir) = fs::read_dir(path) else {
        return 0;
    };
    read_dir
        .flatten()
        .map(|entry| tree_size(&entry.path()))
        .sum()
}

/// Free bytes on the volume holding `path`, measured at its nearest existing
/// ancestor (the destination usually does not exist yet).
pub fn available_space(path: &Path) -> Option<u64> {
    let existing = nearest_existing_path(path)?;
    volume_free_bytes(&existing)
}

fn nearest_existing_path(path: &Path) -> Option<PathBuf> {
    let mut current = Some(path);
    while let Some(p) = current {
        if p.exists() {
            return Some(p.to_path_buf());
        }
        current = p.parent();
    }
    None
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn volume_free_bytes(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        tracing::debug!(path = %path.display(), "statvfs failed");
        return None;
    }
    Some((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

#[cfg(not(unix))]
fn volume_free_bytes(_path: &Path) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.bin"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("a/mid.bin"), vec![0u8; 20]).unwrap();
        fs::write(dir.path().join("a/b/leaf.bin"), vec![0u8; 3]).unwrap();
        assert_eq!(tree_size(dir.path()), 123);
        assert_eq!(tree_size(&dir.path().join("top.bin")), 100);
        assert_eq!(tree_size(&dir.path().join("missing")), 0);
    }

    #[test]
    fn margin_is_applied() {
        assert!(is_sufficient(100, 110, 1.10));
        assert!(!is_sufficient(100, 109, 1.10));
        assert!(is_sufficient(0, 0, 1.10));
    }

    #[test]
    fn nearest_existing_ancestor_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("not/yet/created");
        assert_eq!(nearest_existing_path(&deep), Some(dir.path().to_path_buf()));
    }

    #[cfg(unix)]
    #[test]
    fn free_space_is_readable_on_unix() {
        let dir = tempfile::tempdir().unwrap();
        assert!(available_space(&dir.path().join("dest")).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn huge_requirement_is_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_required(u64::MAX / 4, &dir.path().join("dest"), 1.10);
        assert!(!check.sufficient);
        assert_eq!(check.required_bytes, u64::MAX / 4);
    }

    #[test]
    fn small_tree_fits() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("f.bin"), vec![1u8; 64]).unwrap();
        let check = check_space(src.path(), dst.path(), 1.10);
        assert_eq!(check.required_bytes, 64);
        assert!(check.sufficient);
    }
}
