//! FUSE filesystem integration for varpipe
//!
//! This module mounts a [`Registry`](common::Registry) so every registered
//! variable shows up as a file at the mount root.
//!
//! # Architecture
//!
//! - `MountManager`: Mounts and unmounts, owns the background session
//! - `VarFs`: FUSE filesystem implementation using fuser
//! - `InodeMap`: Inode ↔ path mapping derived from registry positions
//!
//! Callbacks run on the session thread, concurrently with the host program.
//! Variable cells are mutex-guarded on both sides, and the registry is sealed
//! while mounted so its entry list does not change under a callback.

mod inode;
mod mount_manager;
mod var_fs;

pub use inode::InodeMap;
pub use mount_manager::{LiveMount, MountError, MountManager, MountManagerConfig};
pub use var_fs::VarFs;
