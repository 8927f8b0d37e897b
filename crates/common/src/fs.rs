//! Path-based filesystem operations over a [`Registry`]
//!
//! The namespace is a single directory: `/` holds one regular file per
//! registered variable. Every operation resolves its path again from
//! scratch; there is no open-file or session state. The FUSE layer maps
//! inode numbers onto these paths and forwards here.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::{self, CodecError};
use crate::registry::Registry;

/// Path of the mount root
pub const ROOT_PATH: &str = "/";

/// Size reported for every variable file.
///
/// Only an upper bound hint; readers get the real length from `read`.
pub const REPORTED_FILE_SIZE: u64 = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    #[error("no such variable: {0}")]
    NotFound(String),
    #[error("input of {len} bytes exceeds the {limit} byte limit")]
    Truncated { len: usize, limit: usize },
    #[error("text of {len} bytes exceeds cell capacity of {capacity} bytes")]
    CapacityExceeded { len: usize, capacity: usize },
    #[error("variable storage behind {0} has been dropped")]
    Stale(String),
}

impl FsError {
    /// OS error code reported to the calling process
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::Truncated { .. } => libc::EFBIG,
            FsError::CapacityExceeded { .. } => libc::ENOSPC,
            FsError::Stale(_) => libc::ESTALE,
        }
    }

    fn from_codec(path: &str, err: CodecError) -> Self {
        match err {
            CodecError::Truncated { len, limit } => FsError::Truncated { len, limit },
            CodecError::Cell(crate::cell::CellError::CapacityExceeded { len, capacity }) => {
                FsError::CapacityExceeded { len, capacity }
            }
            CodecError::Stale => FsError::Stale(path.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// Metadata reported for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub kind: NodeKind,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
}

impl NodeAttr {
    pub const ROOT: NodeAttr = NodeAttr {
        kind: NodeKind::Directory,
        perm: 0o755,
        nlink: 2,
        size: 0,
    };

    pub const VARIABLE: NodeAttr = NodeAttr {
        kind: NodeKind::File,
        perm: 0o666,
        nlink: 1,
        size: REPORTED_FILE_SIZE,
    };
}

/// A directory listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    /// Registry index, `None` for `.` and `..`
    pub index: Option<usize>,
}

impl DirEntry {
    fn dot(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Directory,
            index: None,
        }
    }
}

/// Platform-neutral filesystem logic shared by the FUSE adapter and tests
#[derive(Debug, Clone)]
pub struct VarFsCore {
    registry: Arc<Registry>,
}

impl VarFsCore {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn getattr(&self, path: &str) -> Result<NodeAttr, FsError> {
        if path == ROOT_PATH {
            return Ok(NodeAttr::ROOT);
        }
        match self.registry.lookup(path) {
            Some(_) => Ok(NodeAttr::VARIABLE),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// List the root directory: `.`, `..`, then every variable in order
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        if path != ROOT_PATH {
            return Err(FsError::NotFound(path.to_string()));
        }

        let names = self.registry.names();
        let mut entries = Vec::with_capacity(names.len() + 2);
        entries.push(DirEntry::dot("."));
        entries.push(DirEntry::dot(".."));
        entries.extend(names.into_iter().enumerate().map(|(index, name)| DirEntry {
            name,
            kind: NodeKind::File,
            index: Some(index),
        }));
        Ok(entries)
    }

    /// Read up to `size` bytes of the rendered value starting at `offset`
    pub fn read(&self, path: &str, offset: u64, size: usize) -> Result<Vec<u8>, FsError> {
        let (_, entry) = self
            .registry
            .resolve(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let rendered = codec::render(entry.var()).map_err(|e| FsError::from_codec(path, e))?;
        let Ok(start) = usize::try_from(offset) else {
            return Ok(Vec::new());
        };
        if start >= rendered.len() {
            return Ok(Vec::new());
        }
        let end = start.saturating_add(size).min(rendered.len());

        debug!(path = %path, offset, len = end - start, "read");
        Ok(rendered[start..end].to_vec())
    }

    /// Parse `data` into the variable and report the whole payload as written
    pub fn write(&self, path: &str, data: &[u8]) -> Result<usize, FsError> {
        let (_, entry) = self
            .registry
            .resolve(path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        codec::parse_and_apply(entry.var(), data, self.registry.config().overflow).map_err(
            |e| {
                warn!(path = %path, len = data.len(), error = %e, "write rejected");
                FsError::from_codec(path, e)
            },
        )?;

        debug!(path = %path, len = data.len(), "write");
        Ok(data.len())
    }

    /// Accept size changes on variables so `>` redirection works; the value
    /// is left untouched
    pub fn truncate(&self, path: &str) -> Result<(), FsError> {
        match self.registry.lookup(path) {
            Some(_) => Ok(()),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{IntVar, TextVar};

    fn core_with_kills() -> (VarFsCore, IntVar) {
        let registry = Arc::new(Registry::new());
        let kills = IntVar::new(0);
        registry.register_integer("kills", &kills).unwrap();
        (VarFsCore::new(registry), kills)
    }

    #[test]
    fn test_getattr() {
        let (core, _kills) = core_with_kills();

        assert_eq!(core.getattr("/").unwrap(), NodeAttr::ROOT);
        let attr = core.getattr("/kills").unwrap();
        assert_eq!(attr.kind, NodeKind::File);
        assert_eq!(attr.perm, 0o666);
        assert_eq!(attr.size, REPORTED_FILE_SIZE);
        assert_eq!(
            core.getattr("/deaths"),
            Err(FsError::NotFound("/deaths".to_string()))
        );
    }

    #[test]
    fn test_readdir_only_root() {
        let (core, _kills) = core_with_kills();
        let names: Vec<_> = core
            .readdir("/")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![".", "..", "kills"]);
        assert!(core.readdir("/kills").is_err());
    }

    #[test]
    fn test_read_window() {
        let (core, kills) = core_with_kills();
        kills.set(12345);

        assert_eq!(core.read("/kills", 0, 4096).unwrap(), b"12345\n");
        assert_eq!(core.read("/kills", 2, 2).unwrap(), b"34");
        assert_eq!(core.read("/kills", 4, 100).unwrap(), b"5\n");
        assert!(core.read("/kills", 6, 100).unwrap().is_empty());
        assert!(core.read("/kills", u64::MAX, 100).unwrap().is_empty());
    }

    #[test]
    fn test_write_reports_full_length() {
        let (core, kills) = core_with_kills();
        let payload = vec![b'7'; 400];
        assert_eq!(core.write("/kills", &payload).unwrap(), 400);
        // 255 sevens saturate
        assert_eq!(kills.get(), i64::MAX);
    }

    #[test]
    fn test_truncate() {
        let (core, kills) = core_with_kills();
        kills.set(9);
        core.truncate("/kills").unwrap();
        assert_eq!(kills.get(), 9);
        assert_eq!(core.truncate("/nope").unwrap_err().errno(), libc::ENOENT);
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::NotFound("/x".into()).errno(), libc::ENOENT);
        assert_eq!(
            FsError::Truncated { len: 300, limit: 255 }.errno(),
            libc::EFBIG
        );
        assert_eq!(
            FsError::CapacityExceeded { len: 9, capacity: 8 }.errno(),
            libc::ENOSPC
        );
        assert_eq!(FsError::Stale("/x".into()).errno(), libc::ESTALE);
    }

    #[test]
    fn test_stale_variable() {
        let registry = Arc::new(Registry::new());
        let name = TextVar::new(16, "gone").unwrap();
        registry.register_text("name", &name).unwrap();
        let core = VarFsCore::new(registry);
        drop(name);

        assert!(core.getattr("/name").is_ok());
        assert_eq!(
            core.read("/name", 0, 64),
            Err(FsError::Stale("/name".to_string()))
        );
        assert_eq!(
            core.write("/name", b"back"),
            Err(FsError::Stale("/name".to_string()))
        );
    }
}
