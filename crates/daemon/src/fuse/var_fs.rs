//! `fuser::Filesystem` implementation over the variable registry
//!
//! Each callback maps its inode to a path and hands the work to
//! [`VarFsCore`]. Failures are replied as the errno of the [`FsError`].

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen,
    ReplyWrite, Request, TimeOrNow,
};
use tracing::debug;

use common::{DirEntry, FsError, NodeAttr, NodeKind, Registry, VarFsCore};

use super::inode::InodeMap;

const BLOCK_SIZE: u32 = 512;

/// FUSE adapter exposing registered variables as files
#[derive(Debug)]
pub struct VarFs {
    core: VarFsCore,
    inodes: InodeMap,
    attr_ttl: Duration,
    mounted_at: SystemTime,
}

impl VarFs {
    pub fn new(registry: Arc<Registry>, attr_ttl: Duration) -> Self {
        Self {
            core: VarFsCore::new(registry.clone()),
            inodes: InodeMap::new(registry),
            attr_ttl,
            mounted_at: SystemTime::now(),
        }
    }

    fn path_for(&self, inode: u64) -> Result<String, FsError> {
        self.inodes
            .path_for(inode)
            .ok_or_else(|| FsError::NotFound(format!("inode {inode}")))
    }

    fn node_attr(&self, inode: u64) -> Result<NodeAttr, FsError> {
        let path = self.path_for(inode)?;
        self.core.getattr(&path)
    }

    fn attr_for(&self, req: &Request<'_>, inode: u64) -> Result<FileAttr, FsError> {
        let attr = self.node_attr(inode)?;
        Ok(to_file_attr(
            inode,
            &attr,
            req.uid(),
            req.gid(),
            self.mounted_at,
            SystemTime::now(),
        ))
    }

    /// Size changes truncate as a no-op; everything else is ignored
    fn resize(&self, inode: u64, size: Option<u64>) -> Result<NodeAttr, FsError> {
        if size.is_some() {
            let path = self.path_for(inode)?;
            self.core.truncate(&path)?;
        }
        self.node_attr(inode)
    }

    /// Open flags for a variable file, or the errno to reply with
    fn open_flags(&self, inode: u64) -> Result<u32, i32> {
        match self.node_attr(inode) {
            Ok(attr) if attr.kind == NodeKind::Directory => Err(libc::EISDIR),
            // Direct IO keeps the page cache out of the way of live values
            Ok(_) => Ok(fuser::consts::FOPEN_DIRECT_IO),
            Err(e) => Err(e.errno()),
        }
    }

    /// Directory entries after the `offset` cookie
    fn listing(&self, inode: u64, offset: i64) -> Result<Vec<DirSlot>, FsError> {
        let path = self.path_for(inode)?;
        let entries = self.core.readdir(&path)?;
        Ok(dir_slots(entries, offset))
    }
}

/// One directory entry as handed to `ReplyDirectory::add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSlot {
    pub inode: u64,
    /// Offset the kernel passes back to resume after this entry
    pub cookie: i64,
    pub kind: FileType,
    pub name: String,
}

/// Number entries with their inode and resume cookie, skipping the first
/// `offset`. `.` and `..` both point at the root.
pub fn dir_slots(entries: Vec<DirEntry>, offset: i64) -> Vec<DirSlot> {
    let start = usize::try_from(offset).unwrap_or(0);
    entries
        .into_iter()
        .enumerate()
        .skip(start)
        .map(|(idx, entry)| DirSlot {
            inode: entry
                .index
                .map(InodeMap::inode_for_index)
                .unwrap_or(InodeMap::ROOT_INODE),
            cookie: (idx + 1) as i64,
            kind: to_file_type(entry.kind),
            name: entry.name,
        })
        .collect()
}

/// Build the FUSE attribute record for a node.
///
/// Values change without notice, so modification times always read as `now`.
pub fn to_file_attr(
    inode: u64,
    attr: &NodeAttr,
    uid: u32,
    gid: u32,
    created: SystemTime,
    now: SystemTime,
) -> FileAttr {
    FileAttr {
        ino: inode,
        size: attr.size,
        blocks: attr.size.div_ceil(u64::from(BLOCK_SIZE)),
        atime: now,
        mtime: now,
        ctime: now,
        crtime: created,
        kind: to_file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid,
        gid,
        rdev: 0,
        flags: 0,
        blksize: BLOCK_SIZE,
    }
}

fn to_file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

impl Filesystem for VarFs {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_string_lossy();
        let Some(inode) = self.inodes.lookup_child(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.attr_for(req, inode) {
            Ok(attr) => reply.entry(&self.attr_ttl, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr_for(req, ino) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    /// Only size changes are honored, as a no-op truncate; mode, owner and
    /// time changes are accepted and ignored
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.resize(ino, size) {
            Ok(attr) => {
                let attr = to_file_attr(
                    ino,
                    &attr,
                    req.uid(),
                    req.gid(),
                    self.mounted_at,
                    SystemTime::now(),
                );
                reply.attr(&self.attr_ttl, &attr);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.open_flags(ino) {
            Ok(flags) => reply.opened(0, flags),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let data = self
            .path_for(ino)
            .and_then(|path| self.core.read(&path, offset, size as usize));
        match data {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let written = self
            .path_for(ino)
            .and_then(|path| self.core.write(&path, data));
        match written {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let slots = match self.listing(ino, offset) {
            Ok(slots) => slots,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        for slot in slots {
            // A full buffer; the kernel asks again from the last cookie
            if reply.add(slot.inode, slot.cookie, slot.kind, &slot.name) {
                break;
            }
        }
        reply.ok();
    }

    fn destroy(&mut self) {
        debug!("variable filesystem destroyed");
    }
}
