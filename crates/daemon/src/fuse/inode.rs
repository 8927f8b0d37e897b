//! Inode ↔ path mapping for the variable filesystem
//!
//! FUSE identifies nodes by 64-bit inode numbers while the filesystem core
//! works on paths. The namespace is flat and append-only, so inodes are
//! derived from registry positions instead of being allocated: the root is
//! inode 1 and the variable at registry index `i` is inode `i + 2`.

use std::sync::Arc;

use common::{Registry, ROOT_PATH};

/// Inode of the first registry entry
const FIRST_VARIABLE_INODE: u64 = 2;

/// Stateless inode mapping over a registry
#[derive(Debug, Clone)]
pub struct InodeMap {
    registry: Arc<Registry>,
}

impl InodeMap {
    /// Root inode number (always 1 in FUSE)
    pub const ROOT_INODE: u64 = 1;

    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn inode_for_index(index: usize) -> u64 {
        index as u64 + FIRST_VARIABLE_INODE
    }

    pub fn index_for_inode(inode: u64) -> Option<usize> {
        inode
            .checked_sub(FIRST_VARIABLE_INODE)
            .and_then(|index| usize::try_from(index).ok())
    }

    /// Path for an inode, if it names the root or a registered variable
    pub fn path_for(&self, inode: u64) -> Option<String> {
        if inode == Self::ROOT_INODE {
            return Some(ROOT_PATH.to_string());
        }
        let index = Self::index_for_inode(inode)?;
        self.registry.get(index).map(|entry| entry.path())
    }

    /// Inode of `name` inside `parent`; only the root has children
    pub fn lookup_child(&self, parent: u64, name: &str) -> Option<u64> {
        if parent != Self::ROOT_INODE {
            return None;
        }
        self.registry
            .lookup(&child_path(ROOT_PATH, name))
            .map(Self::inode_for_index)
    }
}

/// Join a directory path and a child name
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
