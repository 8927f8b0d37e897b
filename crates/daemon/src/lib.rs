pub mod demo;
#[cfg(feature = "fuse")]
pub mod fuse;

// Re-exports for host programs
pub use common::{IntVar, OverflowPolicy, Registry, RegistryConfig, TextVar};
#[cfg(feature = "fuse")]
pub use fuse::{MountError, MountManager, MountManagerConfig};
