//! Integration tests for the mount lifecycle
//!
//! Most tests exercise the manager without mounting anything. The live mount
//! test needs `/dev/fuse` and a working `fusermount`, so it is ignored by
//! default; run it with `cargo test -- --ignored`.

#![cfg(feature = "fuse")]

use std::sync::Arc;

use tempfile::TempDir;

use varpipe_daemon::demo::DemoVariables;
use varpipe_daemon::{
    IntVar, MountError, MountManager, MountManagerConfig, Registry, TextVar,
};

fn setup_registry() -> (Arc<Registry>, IntVar, TextVar) {
    let registry = Arc::new(Registry::new());
    let kills = IntVar::new(0);
    let name = TextVar::new(63, "PlayerOne").unwrap();
    registry.register_integer("kills", &kills).unwrap();
    registry.register_text("player_name", &name).unwrap();
    (registry, kills, name)
}

#[test]
fn test_init_rejects_file_as_mount_point() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("not-a-dir");
    std::fs::write(&file_path, b"x").unwrap();

    let (registry, _kills, _name) = setup_registry();
    let manager = MountManager::new(registry.clone(), MountManagerConfig::default());

    let err = manager.init(&file_path).unwrap_err();
    assert!(matches!(err, MountError::MountPointMissing(path) if path == file_path));
    assert!(!registry.is_sealed());
    assert!(!manager.is_mounted());
}

#[test]
fn test_cleanup_requires_live_mount() {
    let temp_dir = TempDir::new().unwrap();
    let (registry, _kills, _name) = setup_registry();
    let manager = MountManager::new(registry.clone(), MountManagerConfig::default());

    let err = manager.cleanup(temp_dir.path()).unwrap_err();
    assert!(matches!(err, MountError::NotMounted));
    // Nothing was released
    assert_eq!(registry.len(), 2);
}

#[test]
#[ignore = "requires FUSE (/dev/fuse and fusermount)"]
fn test_live_mount_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let mount_point = temp_dir.path().join("vfs");
    std::fs::create_dir_all(&mount_point).unwrap();

    let registry = Arc::new(Registry::new());
    let vars = DemoVariables::new().unwrap();
    vars.register(&registry).unwrap();

    let manager = MountManager::new(registry.clone(), MountManagerConfig::default());
    manager.init(&mount_point).unwrap();
    assert!(manager.is_mounted());
    assert!(registry.is_sealed());
    assert!(matches!(
        manager.init(&mount_point),
        Err(MountError::AlreadyMounted(_))
    ));

    let late = IntVar::new(0);
    assert!(registry.register_integer("late", &late).is_err());

    let mut listing: Vec<String> = std::fs::read_dir(&mount_point)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    listing.sort();
    assert_eq!(
        listing,
        vec![
            "level",
            "player_deaths",
            "player_hp",
            "player_kills",
            "player_name"
        ]
    );

    let kills_path = mount_point.join("player_kills");
    assert_eq!(std::fs::read_to_string(&kills_path).unwrap(), "0\n");
    std::fs::write(&kills_path, "42\n").unwrap();
    assert_eq!(std::fs::read_to_string(&kills_path).unwrap(), "42\n");
    assert_eq!(vars.kills.get(), 42);

    let name_path = mount_point.join("player_name");
    std::fs::write(&name_path, "TheBoss\n").unwrap();
    assert_eq!(vars.player_name.get(), "TheBoss");
    assert!(std::fs::write(&name_path, "x".repeat(100)).is_err());
    assert_eq!(vars.player_name.get(), "TheBoss");

    manager.cleanup(&mount_point).unwrap();
    assert!(!manager.is_mounted());
    assert!(registry.is_empty());
    assert!(!registry.is_sealed());
}
