//! Mount lifecycle for the variable filesystem
//!
//! `init` starts the FUSE session on its own background thread and returns
//! right away. `cleanup` unmounts and waits for that thread, so no callback
//! can touch the registry once it returns.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use fuser::{BackgroundSession, MountOption};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use common::Registry;

use super::var_fs::VarFs;

/// Configuration for mounting the variable filesystem
#[derive(Debug, Clone)]
pub struct MountManagerConfig {
    /// Filesystem name shown in the mount table
    pub fs_name: String,
    /// Let the kernel unmount when the process dies. Implies `allow_other`.
    pub auto_unmount: bool,
    /// Allow users other than the mounting one to access the files
    pub allow_other: bool,
    /// How long the kernel may cache attributes and lookups
    pub attr_ttl: Duration,
}

impl Default for MountManagerConfig {
    fn default() -> Self {
        Self {
            fs_name: "varpipe".to_string(),
            auto_unmount: false,
            allow_other: false,
            attr_ttl: Duration::ZERO,
        }
    }
}

impl MountManagerConfig {
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![MountOption::FSName(self.fs_name.clone()), MountOption::RW];
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        options
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("a filesystem is already mounted at {0}")]
    AlreadyMounted(PathBuf),
    #[error("mount point {0} is not an existing directory")]
    MountPointMissing(PathBuf),
    #[error("no filesystem is mounted")]
    NotMounted,
    #[error("filesystem is mounted at {mounted}, not {requested}")]
    PathMismatch { mounted: PathBuf, requested: PathBuf },
    #[error("session at {0} ended with an error")]
    SessionFailed(PathBuf),
    #[error("mount failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A running FUSE session and where it is mounted
pub struct LiveMount {
    mount_path: PathBuf,
    session: BackgroundSession,
}

impl LiveMount {
    pub fn mount_path(&self) -> &Path {
        &self.mount_path
    }

    /// Unmount and wait for the session thread to finish
    fn unmount(self) -> Result<(), MountError> {
        let LiveMount {
            mount_path,
            session,
        } = self;
        join_session(&mount_path, move || session.join())?;
        info!(mount_path = %mount_path.display(), "filesystem unmounted");
        Ok(())
    }
}

impl std::fmt::Debug for LiveMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMount")
            .field("mount_path", &self.mount_path)
            .finish()
    }
}

/// Owns the registry's mount and its background session
#[derive(Debug)]
pub struct MountManager {
    registry: Arc<Registry>,
    config: MountManagerConfig,
    live: Mutex<Option<LiveMount>>,
}

impl MountManager {
    pub fn new(registry: Arc<Registry>, config: MountManagerConfig) -> Self {
        Self {
            registry,
            config,
            live: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &MountManagerConfig {
        &self.config
    }

    /// Mount the registry at `mount_path` and serve it from a background thread.
    ///
    /// Any stale mount left at the path is unmounted first. The registry is
    /// sealed for as long as the mount is live.
    #[tracing::instrument(skip_all, fields(mount_path = %mount_path.display()))]
    pub fn init(&self, mount_path: &Path) -> Result<(), MountError> {
        let mut live = self.live.lock();
        if let Some(existing) = live.as_ref() {
            return Err(MountError::AlreadyMounted(existing.mount_path.clone()));
        }
        if !mount_path.is_dir() {
            return Err(MountError::MountPointMissing(mount_path.to_path_buf()));
        }

        unmount_stale(mount_path);

        self.registry.seal();
        let fs = VarFs::new(self.registry.clone(), self.config.attr_ttl);
        let session = match fuser::spawn_mount2(fs, mount_path, &self.config.mount_options()) {
            Ok(session) => session,
            Err(e) => {
                self.registry.unseal();
                warn!(error = %e, "failed to mount filesystem");
                return Err(e.into());
            }
        };

        info!(
            variables = self.registry.len(),
            fs_name = %self.config.fs_name,
            "filesystem mounted"
        );
        *live = Some(LiveMount {
            mount_path: mount_path.to_path_buf(),
            session,
        });
        Ok(())
    }

    /// Unmount `mount_path`, wait for the session to stop, and release the
    /// registry's entries
    #[tracing::instrument(skip_all, fields(mount_path = %mount_path.display()))]
    pub fn cleanup(&self, mount_path: &Path) -> Result<(), MountError> {
        let mount = {
            let mut live = self.live.lock();
            let mounted = live
                .as_ref()
                .map(|mount| mount.mount_path.clone())
                .ok_or(MountError::NotMounted)?;
            if mounted != mount_path {
                return Err(MountError::PathMismatch {
                    mounted,
                    requested: mount_path.to_path_buf(),
                });
            }
            live.take()
        };

        // The session thread is gone either way, so the registry is released
        // before a join failure is reported
        let joined = mount.map_or(Ok(()), LiveMount::unmount);
        self.registry.release();
        joined
    }

    pub fn is_mounted(&self) -> bool {
        self.live.lock().is_some()
    }

    pub fn mount_path(&self) -> Option<PathBuf> {
        self.live
            .lock()
            .as_ref()
            .map(|mount| mount.mount_path.clone())
    }
}

impl Drop for MountManager {
    fn drop(&mut self) {
        if let Some(mount) = self.live.get_mut().take() {
            if let Err(e) = mount.unmount() {
                warn!(error = %e, "unmount on drop failed");
            }
            self.registry.unseal();
        }
    }
}

/// Run a session join, turning a panic from the session thread into an error.
///
/// `BackgroundSession::join` panics when the session loop returned an I/O
/// error or its thread panicked.
fn join_session(mount_path: &Path, join: impl FnOnce()) -> Result<(), MountError> {
    panic::catch_unwind(AssertUnwindSafe(join)).map_err(|_| {
        warn!(mount_path = %mount_path.display(), "filesystem session failed");
        MountError::SessionFailed(mount_path.to_path_buf())
    })
}

/// Best-effort unmount of whatever is mounted at `path`; failures are ignored
fn unmount_stale(path: &Path) {
    for program in ["fusermount3", "fusermount"] {
        let status = Command::new(program)
            .arg("-u")
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) => {
                if status.success() {
                    info!(path = %path.display(), "unmounted stale filesystem");
                }
                return;
            }
            // Not installed, try the next one
            Err(e) => debug!(program, error = %e, "unmount helper unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::IntVar;

    #[test]
    fn test_default_mount_options() {
        let config = MountManagerConfig::default();
        let options = config.mount_options();

        assert!(options.contains(&MountOption::FSName("varpipe".to_string())));
        assert!(options.contains(&MountOption::RW));
        assert!(!options.contains(&MountOption::AutoUnmount));
        assert!(!options.contains(&MountOption::AllowOther));
        assert_eq!(config.attr_ttl, Duration::ZERO);
    }

    #[test]
    fn test_mount_options_flags() {
        let config = MountManagerConfig {
            fs_name: "game".to_string(),
            auto_unmount: true,
            allow_other: true,
            ..Default::default()
        };
        let options = config.mount_options();

        assert!(options.contains(&MountOption::FSName("game".to_string())));
        assert!(options.contains(&MountOption::AutoUnmount));
        assert!(options.contains(&MountOption::AllowOther));
    }

    #[test]
    fn test_init_missing_mount_point() {
        let registry = Arc::new(Registry::new());
        let var = IntVar::new(0);
        registry.register_integer("kills", &var).unwrap();
        let manager = MountManager::new(registry.clone(), MountManagerConfig::default());

        let err = manager
            .init(Path::new("/nonexistent/varpipe/mount"))
            .unwrap_err();
        assert!(matches!(err, MountError::MountPointMissing(_)));
        assert!(!manager.is_mounted());
        assert!(manager.mount_path().is_none());
        assert!(!registry.is_sealed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_cleanup_without_mount() {
        let manager = MountManager::new(Arc::new(Registry::new()), MountManagerConfig::default());
        let err = manager.cleanup(Path::new("/tmp/vfs")).unwrap_err();
        assert!(matches!(err, MountError::NotMounted));
    }

    #[test]
    fn test_join_session_ok() {
        let mut joined = false;
        join_session(Path::new("/tmp/vfs"), || joined = true).unwrap();
        assert!(joined);
    }

    #[test]
    fn test_join_session_failure_is_an_error() {
        let err = join_session(Path::new("/tmp/vfs"), || {
            let session: Result<(), std::io::Error> =
                Err(std::io::Error::other("transport endpoint is not connected"));
            session.unwrap();
        })
        .unwrap_err();
        assert!(matches!(err, MountError::SessionFailed(path) if path == Path::new("/tmp/vfs")));
    }
}
