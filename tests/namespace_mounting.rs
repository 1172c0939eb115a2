//! Mounting containers, path resolution and mount point discovery

mod common;

use common::{build_pak, write_file};
use pakvfs::{
    CancellationFlag, ContainerKind, FileProvider, IoStoreContainer, MemoryChunkStore,
    PackageFileVersion, ProviderError,
};
use std::sync::Arc;
use tempfile::TempDir;

fn tree(files: &[(&str, &[u8])]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, bytes) in files {
        write_file(dir.path(), path, bytes);
    }
    dir
}

#[test]
fn test_later_mount_wins() {
    let a = tree(&[
        ("MyGame/Content/Shared.uasset", b"from a"),
        ("MyGame/Content/OnlyA.uasset", b"a"),
    ]);
    let b = tree(&[("MyGame/Content/Shared.uasset", b"from b!")]);

    let provider = FileProvider::new();
    assert_eq!(provider.mount_directory(a.path()).unwrap(), 2);
    assert_eq!(provider.mount_directory(b.path()).unwrap(), 1);

    assert_eq!(provider.len(), 2);
    assert_eq!(provider.save_asset("/Game/Shared").unwrap(), b"from b!");
    assert_eq!(provider.resolve_path("/Game/Shared").unwrap().size(), 7);
    assert_eq!(provider.save_asset("/Game/OnlyA").unwrap(), b"a");

    // Reverse the order and the other copy wins
    let reversed = FileProvider::new();
    reversed.mount_directory(b.path()).unwrap();
    reversed.mount_directory(a.path()).unwrap();
    assert_eq!(reversed.save_asset("/Game/Shared").unwrap(), b"from a");
}

#[test]
fn test_pak_and_loose_share_one_namespace() {
    let dir = TempDir::new().unwrap();
    let pak_path = dir.path().join("pakchunk0.pak");
    std::fs::write(
        &pak_path,
        build_pak(
            "../../../MyGame/Content/",
            &[("Hero.uasset", b"packed hero"), ("Maps/Arena.umap", b"arena")],
        ),
    )
    .unwrap();
    let loose = tree(&[("MyGame/Content/Hero.uasset", b"patched hero")]);

    let provider = FileProvider::new();
    assert_eq!(provider.mount_pak(&pak_path).unwrap(), 2);
    assert_eq!(provider.resolve_path("/Game/Hero").unwrap().kind(), ContainerKind::ContainerIndexed);
    assert_eq!(provider.save_asset("/Game/Maps/Arena.umap").unwrap(), b"arena");

    provider.mount_directory(loose.path()).unwrap();
    let hero = provider.resolve_path("/Game/Hero").unwrap();
    assert_eq!(hero.kind(), ContainerKind::LooseFile);
    assert_eq!(hero.read().unwrap(), b"patched hero");
}

#[test]
fn test_iostore_entries_are_chunk_indexed() {
    let mut store = MemoryChunkStore::new("global", 1);
    store.insert_package("MyGame/Content/Hero.uasset", "/Game/Hero", &[], b"chunk".to_vec());

    let provider = FileProvider::new();
    let container = IoStoreContainer::new(Arc::new(store));
    assert_eq!(provider.mount(&container).unwrap(), 1);

    let hero = provider.resolve_path("Game/Hero").unwrap();
    assert_eq!(hero.kind(), ContainerKind::ChunkIndexed);
    assert_eq!(hero.read().unwrap(), b"chunk");
}

#[test]
fn test_not_found_is_distinct() {
    let provider = FileProvider::new();
    provider
        .mount_directory(tree(&[("MyGame/Content/A.uasset", b"a")]).path())
        .unwrap();

    let err = provider.resolve_path("/Game/B").unwrap_err();
    assert!(err.is_not_found());
    assert!(err.is_recoverable());
    assert!(provider.try_resolve_path("/Game/B").is_none());
    assert!(provider.try_create_reader("/Game/B").is_none());
}

#[test]
fn test_case_sensitive_namespace() {
    let dir = tree(&[("MyGame/Content/Hero.uasset", b"hero")]);
    let provider = FileProvider::builder().case_insensitive(false).build();
    provider.mount_directory(dir.path()).unwrap();

    assert_eq!(provider.project_name(), "MyGame");
    assert_eq!(provider.normalize("/Game/Hero"), "MyGame/Content/Hero.uasset");
    assert!(provider.contains("/Game/Hero"));
    assert!(!provider.contains("/Game/hero"));
}

#[test]
fn test_project_name_discovery() {
    // A .uproject decides, even when another root sorts first
    let dir = tree(&[
        ("AAA/Content/Stray.uasset", b"x"),
        ("ShooterGame/ShooterGame.uproject", b"{}"),
        ("Engine/Content/Base.uasset", b"x"),
    ]);
    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();
    assert_eq!(provider.project_name(), "shootergame");

    // Without one, the first non-engine root
    let dir = tree(&[
        ("Engine/Content/Base.uasset", b"x"),
        ("MidnightSuns/Content/Hero.uasset", b"x"),
    ]);
    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();
    assert_eq!(provider.project_name(), "codagame");

    // Configured names bypass discovery
    let provider = FileProvider::builder().project_name("Override").build();
    provider.mount_directory(dir.path()).unwrap();
    assert_eq!(provider.project_name(), "Override");
}

#[test]
fn test_project_name_recomputed_after_mount() {
    let provider = FileProvider::new();
    provider
        .mount_directory(tree(&[("Engine/Content/Base.uasset", b"x")]).path())
        .unwrap();
    assert_eq!(provider.project_name(), "");

    provider
        .mount_directory(tree(&[("MyGame/MyGame.uproject", b"{}")]).path())
        .unwrap();
    assert_eq!(provider.project_name(), "mygame");
}

#[test]
fn test_manifest_registers_every_content_plugin() {
    let manifest = r#"{
        "Contents": [
            {"File": "../../../MyGame/Plugins/GameFeatures/ShooterCore/ShooterCore.uplugin",
             "Descriptor": {"CanContainContent": true, "FriendlyName": "Shooter Core"}},
            {"File": "../../../MyGame/Plugins/GameFeatures/ShooterMaps/ShooterMaps.uplugin",
             "Descriptor": {"CanContainContent": true}},
            {"File": "../../../MyGame/Plugins/TopDownArena/TopDownArena.uplugin",
             "Descriptor": {"CanContainContent": true}},
            {"File": "../../../MyGame/Plugins/CodeOnly/CodeOnly.uplugin",
             "Descriptor": {"CanContainContent": false}}
        ]
    }"#;
    let dir = tree(&[
        ("MyGame/Plugins/MyGame.upluginmanifest", manifest.as_bytes()),
        (
            "MyGame/Plugins/GameFeatures/ShooterCore/Content/Weapons/Rifle.uasset",
            b"rifle",
        ),
    ]);

    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();
    assert_eq!(provider.load_virtual_paths(&CancellationFlag::new()).unwrap(), 3);

    let paths = provider.virtual_paths();
    assert_eq!(paths.len(), 3);
    assert_eq!(
        paths.get("shootercore"),
        Some("MyGame/Plugins/GameFeatures/ShooterCore")
    );
    assert!(!paths.contains("CodeOnly"));

    assert_eq!(
        provider.normalize("/ShooterCore/Weapons/Rifle.Rifle"),
        "mygame/plugins/gamefeatures/shootercore/content/weapons/rifle.uasset"
    );
    assert_eq!(
        provider.save_asset("/ShooterCore/Weapons/Rifle").unwrap(),
        b"rifle"
    );
}

#[test]
fn test_descriptors_used_before_manifest_versions() {
    let dir = tree(&[
        ("MyGame/Plugins/MyGame.upluginmanifest", br#"{"Contents": []}"#),
        ("MyGame/Plugins/Arena/Arena.uplugin", br#"{"CanContainContent": true}"#),
        ("MyGame/Plugins/Broken/Broken.uplugin", b"{ not json"),
    ]);
    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();

    let cancel = CancellationFlag::new();
    assert_eq!(provider.load_virtual_paths(&cancel).unwrap(), 0);
    assert_eq!(
        provider
            .load_virtual_paths_for(PackageFileVersion::ue4(510), &cancel)
            .unwrap(),
        1
    );
    assert_eq!(provider.virtual_paths().get("Arena"), Some("MyGame/Plugins/Arena"));
}

#[test]
fn test_cancelled_rebuild_keeps_previous_table() {
    let dir = tree(&[("MyGame/Plugins/Arena/Arena.uplugin", br#"{"CanContainContent": true}"#)]);
    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();
    provider.load_virtual_paths(&CancellationFlag::new()).unwrap();

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let err = provider.load_virtual_paths(&cancel).unwrap_err();
    assert!(matches!(err, ProviderError::Cancelled));
    assert!(provider.virtual_paths().contains("Arena"));
}
