//! Locale table rebuilds

mod common;

use common::{build_locres, write_file};
use pakvfs::{CancellationFlag, FileProvider, Language, ProviderError};
use tempfile::TempDir;

fn localized_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "MyGame/Content/Localization/Game/de/Game.locres",
        &build_locres(&[("UI", vec![("Play", "Spielen"), ("Quit", "Beenden"), ("Back", "Zurueck")])]),
    );
    write_file(
        dir.path(),
        "MyGame/Content/Localization/Items/de/Items.locres",
        &build_locres(&[
            ("Items", vec![("Sword", "Schwert"), ("Shield", "Schild"), ("Bow", "Bogen")]),
            ("UI", vec![("Play", "Los"), ("Options", "Optionen")]),
        ]),
    );
    write_file(
        dir.path(),
        "MyGame/Content/Localization/Game/fr/Game.locres",
        &build_locres(&[("UI", vec![("Play", "Jouer")])]),
    );
    write_file(
        dir.path(),
        "MyGame/Content/Localization/Broken/de/Broken.locres",
        b"\x05\x00",
    );
    dir
}

#[test]
fn test_locale_counts_every_insert() {
    let dir = localized_tree();
    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();

    let cancel = CancellationFlag::new();
    assert_eq!(provider.load_locale("de", &cancel).unwrap(), 8);
    // UI.Play was written twice
    assert_eq!(provider.localization_len(), 7);
    assert_eq!(provider.localized_string("Items", "Bow", None), "Bogen");
    assert_eq!(provider.localized_string("UI", "Back", None), "Zurueck");
    assert_eq!(provider.localized_string("UI", "Nope", Some("fallback")), "fallback");
    assert_eq!(provider.localized_string("UI", "Nope", None), "");
}

#[test]
fn test_locale_rebuild_replaces_table() {
    let dir = localized_tree();
    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();
    let cancel = CancellationFlag::new();

    provider.load_locale("de", &cancel).unwrap();
    assert_eq!(provider.load_locale("fr", &cancel).unwrap(), 1);
    assert_eq!(provider.localized_string("UI", "Play", None), "Jouer");
    assert_eq!(provider.localized_string("Items", "Bow", None), "");

    assert_eq!(provider.load_locale("ja", &cancel).unwrap(), 0);
    assert_eq!(provider.localization_len(), 0);
    assert_eq!(provider.localized_string("UI", "Play", Some("?")), "?");
}

#[test]
fn test_language_uses_project_culture_codes() {
    let dir = localized_tree();
    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();

    let cancel = CancellationFlag::new();
    assert_eq!(provider.load_localization(Language::French, &cancel).unwrap(), 1);
    assert_eq!(provider.load_localization(Language::German, &cancel).unwrap(), 8);
}

#[test]
fn test_cancelled_locale_keeps_table() {
    let dir = localized_tree();
    let provider = FileProvider::new();
    provider.mount_directory(dir.path()).unwrap();
    provider.load_locale("fr", &CancellationFlag::new()).unwrap();

    let cancel = CancellationFlag::new();
    cancel.cancel();
    assert!(matches!(
        provider.load_locale("de", &cancel),
        Err(ProviderError::Cancelled)
    ));
    assert_eq!(provider.localized_string("UI", "Play", None), "Jouer");
}
