//! Core of varpipe: live program variables exposed as files.
//!
//! - [`registry`]: name → typed variable reference, in insertion order
//! - [`cell`]: host-owned variable handles and the weak references the
//!   registry keeps to them
//! - [`codec`]: rendering values for reads and parsing writes
//! - [`fs`]: path-based filesystem operations built on the two above
//!
//! This crate has no FUSE dependency; the daemon crate plugs [`fs::VarFsCore`]
//! into `fuser`.

pub mod cell;
pub mod codec;
pub mod config;
pub mod fs;
pub mod registry;

pub use cell::{CellError, IntVar, TextVar, VarKind, VarRef};
pub use codec::{CodecError, MAX_INPUT_LEN};
pub use config::{OverflowPolicy, RegistryConfig};
pub use fs::{DirEntry, FsError, NodeAttr, NodeKind, VarFsCore, REPORTED_FILE_SIZE, ROOT_PATH};
pub use registry::{RegisteredVariable, Registry, RegistryError, MAX_NAME_LEN};
