//! Recursive enumeration of a source tree, sorted for deterministic order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TransferError;

/// One regular file of a source tree, relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    pub rel: PathBuf,
    pub len: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    pub files: Vec<TreeFile>,
    /// Every directory below the root, parents before children.
    pub dirs: Vec<PathBuf>,
    pub total_bytes: u64,
}

/// Enumerate `root`. A file root yields a one-entry tree named after the file.
pub fn scan_tree(root: &Path) -> Result<SourceTree, TransferError> {
    let meta = fs::metadata(root).map_err(|e| TransferError::source_io(root, e))?;
    let mut tree = SourceTree::default();
    if meta.is_file() {
        let name = root
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| TransferError::SourceNotFound {
                path: root.to_path_buf(),
            })?;
        tree.total_bytes = meta.len();
        tree.files.push(TreeFile {
            rel: name,
            len: meta.len(),
        });
        return Ok(tree);
    }

    fn recurse(dir: &Path, rel: &Path, tree: &mut SourceTree) -> Result<(), TransferError> {
        let mut entries = fs::read_dir(dir)
            .map_err(|e| TransferError::source_io(dir, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransferError::source_io(dir, e))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let rel_path = rel.join(entry.file_name());
            // Follows symlinks, so linked files are copied as regular files.
            let meta = fs::metadata(&path).map_err(|e| TransferError::source_io(&path, e))?;
            if meta.is_dir() {
                tree.dirs.push(rel_path.clone());
                recurse(&path, &rel_path, tree)?;
            } else if meta.is_file() {
                tree.total_bytes += meta.len();
                tree.files.push(TreeFile {
                    rel: rel_path,
                    len: meta.len(),
                });
            }
        }
        Ok(())
    }

    recurse(root, Path::new(""), &mut tree)?;
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn scan_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/inner")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("a.bin"), b"12345").unwrap();
        fs::write(root.join("b/inner/c.bin"), b"xy").unwrap();

        let tree = scan_tree(root).unwrap();
        assert_eq!(tree.total_bytes, 7);
        let rels: Vec<_> = tree.files.iter().map(|f| f.rel.clone()).collect();
        assert_eq!(rels, vec![PathBuf::from("a.bin"), PathBuf::from("b/inner/c.bin")]);
        assert_eq!(
            tree.dirs,
            vec![
                PathBuf::from("b"),
                PathBuf::from("b/inner"),
                PathBuf::from("empty")
            ]
        );
    }

    #[test]
    fn scan_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("game.iso");
        fs::write(&file, vec![0u8; 42]).unwrap();
        let tree = scan_tree(&file).unwrap();
        assert_eq!(tree.files.len(), 1);
        assert_eq!(tree.files[0].rel, PathBuf::from("game.iso"));
        assert_eq!(tree.total_bytes, 42);
        assert!(tree.dirs.is_empty());
    }

    #[test]
    fn scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_tree(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
    }
}
