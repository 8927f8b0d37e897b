use std::path::PathBuf;

use clap::Args;

use common::OverflowPolicy;

#[derive(Args, Debug, Clone)]
pub struct Demo {
    /// Directory to mount the variables at
    #[arg(long, env = "VARPIPE_MOUNT", default_value = "/tmp/vfs")]
    pub mount: PathBuf,

    /// Create the mount directory if it does not exist
    #[arg(long)]
    pub create: bool,

    /// Milliseconds between game ticks
    #[arg(long, env = "VARPIPE_INTERVAL_MS", default_value_t = 500)]
    pub interval_ms: u64,

    /// What to do with writes over 255 bytes and names over 63 bytes: clip or reject
    #[arg(long, env = "VARPIPE_OVERFLOW", default_value_t = OverflowPolicy::Clip)]
    pub overflow: OverflowPolicy,

    /// Have the kernel unmount if the process dies (needs user_allow_other in /etc/fuse.conf)
    #[arg(long, env = "VARPIPE_AUTO_UNMOUNT")]
    pub auto_unmount: bool,

    /// Let other users access the mount
    #[arg(long, env = "VARPIPE_ALLOW_OTHER")]
    pub allow_other: bool,
}

#[cfg(feature = "fuse")]
impl Demo {
    pub async fn execute(&self) -> anyhow::Result<()> {
        use std::sync::Arc;
        use std::time::Duration;

        use anyhow::Context;
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        use common::{Registry, RegistryConfig};
        use varpipe_daemon::demo::DemoVariables;
        use varpipe_daemon::{MountManager, MountManagerConfig};

        if self.create {
            std::fs::create_dir_all(&self.mount)
                .with_context(|| format!("failed to create {}", self.mount.display()))?;
        }

        let registry = Arc::new(Registry::with_config(RegistryConfig::with_overflow(
            self.overflow,
        )));
        let vars = DemoVariables::new()?;
        vars.register(&registry)?;

        let config = MountManagerConfig {
            auto_unmount: self.auto_unmount,
            allow_other: self.allow_other,
            ..Default::default()
        };
        let manager = MountManager::new(registry, config);
        manager.init(&self.mount)?;

        let mount = self.mount.display();
        tracing::info!("Check your files in: {mount}");
        tracing::info!("Try: watch -n 0.5 'ls -l {mount} && cat {mount}/*'");
        tracing::info!("Try: echo 'TheBoss' > {mount}/player_name");

        let mut rng = StdRng::from_os_rng();
        let mut ticker = tokio::time::interval(Duration::from_millis(self.interval_ms.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => vars.tick(&mut rng),
                result = tokio::signal::ctrl_c() => {
                    result.context("failed to listen for Ctrl-C")?;
                    break;
                }
            }
        }

        tracing::info!("shutting down");
        manager.cleanup(&self.mount)?;
        Ok(())
    }
}

#[cfg(not(feature = "fuse"))]
impl Demo {
    pub async fn execute(&self) -> anyhow::Result<()> {
        anyhow::bail!("FUSE support not enabled; rebuild with --features fuse")
    }
}
