//! Byte copy engine: tree enumeration and chunked, resumable copy.

mod copy;
mod enumerate;

pub use copy::{copy_tree, ensure_parent_dir_exists, CopyOptions, CopyStats};
pub use enumerate::{scan_tree, SourceTree, TreeFile};
