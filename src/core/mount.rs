//! Mount table: short virtual roots (`ShooterCore`) to plugin roots
//! (`MyGame/Plugins/GameFeatures/ShooterCore`)
//!
//! Built by one pass over the namespace. Cooked builds from the soft object
//! path version on ship `.upluginmanifest` files that list every plugin;
//! older builds, or builds without a manifest, are scanned per `.uplugin`.

use crate::cancel::CancellationFlag;
use crate::error::{ProviderError, Result};
use crate::file::GameFile;
use crate::index::FileIndex;
use crate::plugin::{PluginDescriptor, PluginManifest, PLUGIN_EXTENSION, PLUGIN_MANIFEST_EXTENSION};
use crate::version::PackageFileVersion;
use ahash::AHashMap;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

/// Case-insensitive map of virtual root name to plugin root
#[derive(Debug, Clone, Default)]
pub struct VirtualPaths {
    // lower-cased name -> (name as discovered, target)
    entries: AHashMap<String, (String, String)>,
}

impl VirtualPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns true when the name was not present
    pub fn insert(&mut self, name: impl Into<String>, target: impl Into<String>) -> bool {
        let name = name.into();
        self.entries
            .insert(name.to_lowercase(), (name, target.into()))
            .is_none()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_lowercase())
            .map(|(_, target)| target.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, target)` pairs sorted by name
    pub fn to_vec(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self.entries.values().cloned().collect();
        pairs.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
        pairs
    }
}

/// How the table was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    PluginDescriptors,
    PluginManifests,
}

/// Rebuilds a [`VirtualPaths`] table from the namespace
pub struct MountTableBuilder<'a> {
    index: &'a FileIndex,
    project_name: &'a str,
    version: PackageFileVersion,
}

impl<'a> MountTableBuilder<'a> {
    pub fn new(index: &'a FileIndex, project_name: &'a str, version: PackageFileVersion) -> Self {
        MountTableBuilder {
            index,
            project_name,
            version,
        }
    }

    /// Pick descriptor or manifest scanning for this namespace
    pub fn mode(&self) -> DiscoveryMode {
        let has_manifest = self
            .index
            .find_first(|_, file| file.extension().eq_ignore_ascii_case(PLUGIN_MANIFEST_EXTENSION))
            .is_some();

        if !self.version.supports_plugin_manifests() || !has_manifest {
            DiscoveryMode::PluginDescriptors
        } else {
            DiscoveryMode::PluginManifests
        }
    }

    /// Build a fresh table; returns it with the number of roots registered
    ///
    /// Unreadable or unparsable descriptors are skipped. On cancellation the
    /// partial table is dropped.
    pub fn build(&self, cancel: &CancellationFlag) -> Result<(VirtualPaths, usize)> {
        let mode = self.mode();
        let manifest_pattern = manifest_pattern(self.project_name)?;
        let mut table = VirtualPaths::new();
        let mut added = 0;

        for (key, file) in self.index.snapshot() {
            cancel.check()?;

            match mode {
                DiscoveryMode::PluginDescriptors => {
                    if !file.extension().eq_ignore_ascii_case(PLUGIN_EXTENSION) {
                        continue;
                    }
                    let Some(descriptor) = read_json(&file, PluginDescriptor::from_slice) else {
                        continue;
                    };
                    if !descriptor.can_contain_content {
                        continue;
                    }

                    let (target, name) = split_descriptor_path(file.path());
                    if table.insert(name, target) {
                        added += 1;
                    }
                }
                DiscoveryMode::PluginManifests => {
                    if !manifest_pattern.is_match(&key) {
                        continue;
                    }
                    let Some(manifest) = read_json(&file, PluginManifest::from_slice) else {
                        continue;
                    };

                    for entry in &manifest.contents {
                        cancel.check()?;
                        if !entry.descriptor.can_contain_content {
                            continue;
                        }
                        if table.insert(entry.mount_name(), entry.mount_target()) {
                            added += 1;
                        }
                    }
                }
            }
        }

        info!(?mode, roots = added, "Rebuilt mount table");
        Ok((table, added))
    }
}

fn manifest_pattern(project_name: &str) -> Result<Regex> {
    RegexBuilder::new(&format!(
        "^{}/Plugins/.+\\.{}$",
        regex::escape(project_name),
        PLUGIN_MANIFEST_EXTENSION
    ))
    .case_insensitive(true)
    .build()
    .map_err(|e| ProviderError::InvalidPath(e.to_string()))
}

fn read_json<T>(file: &GameFile, parse: fn(&[u8]) -> Result<T>) -> Option<T> {
    let bytes = match file.read() {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = file.path(), error = %err, "Skipping unreadable plugin file");
            return None;
        }
    };
    match parse(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = file.path(), error = %err, "Skipping unparsable plugin file");
            None
        }
    }
}

/// `A/B/Foo.uplugin` -> (`A/B`, `Foo`)
fn split_descriptor_path(path: &str) -> (&str, &str) {
    let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
    let name = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    debug!(name, target = dir, "Discovered plugin");
    (dir, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::CaseMode;
    use std::fs;
    use tempfile::TempDir;

    fn loose(dir: &TempDir, path: &str, contents: &str) -> GameFile {
        let actual = dir.path().join(path.replace('/', "_"));
        fs::write(&actual, contents).unwrap();
        GameFile::loose(path, actual, contents.len() as u64)
    }

    #[test]
    fn test_virtual_paths_case_insensitive() {
        let mut table = VirtualPaths::new();
        assert!(table.insert("ShooterCore", "A/ShooterCore"));
        assert!(!table.insert("shootercore", "B/ShooterCore"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("SHOOTERCORE"), Some("B/ShooterCore"));
    }

    #[test]
    fn test_descriptor_mode() {
        let dir = TempDir::new().unwrap();
        let index = FileIndex::new(CaseMode::Insensitive);
        index.insert_batch(vec![
            loose(&dir, "MyGame/Plugins/A/A.uplugin", r#"{"CanContainContent": true}"#),
            loose(&dir, "MyGame/Plugins/B/B.uplugin", r#"{"CanContainContent": false}"#),
            loose(&dir, "MyGame/Plugins/C/C.uplugin", "not json"),
        ]);

        let builder = MountTableBuilder::new(&index, "MyGame", PackageFileVersion::default());
        assert_eq!(builder.mode(), DiscoveryMode::PluginDescriptors);

        let (table, added) = builder.build(&CancellationFlag::new()).unwrap();
        assert_eq!(added, 1);
        assert_eq!(table.get("A"), Some("MyGame/Plugins/A"));
        assert!(!table.contains("B"));
        assert!(!table.contains("C"));
    }

    #[test]
    fn test_manifest_mode_counts_new_roots() {
        let dir = TempDir::new().unwrap();
        let manifest = r#"{"Contents": [
            {"File": "../../../MyGame/Plugins/GF/One/One.uplugin", "Descriptor": {"CanContainContent": true}},
            {"File": "../../../MyGame/Plugins/GF/Two/Two.uplugin", "Descriptor": {"CanContainContent": true}},
            {"File": "../../../MyGame/Plugins/Other/One/One.uplugin", "Descriptor": {"CanContainContent": true}},
            {"File": "../../../MyGame/Plugins/Code/Code.uplugin", "Descriptor": {"CanContainContent": false}}
        ]}"#;
        let index = FileIndex::new(CaseMode::Insensitive);
        index.insert_batch(vec![
            loose(&dir, "MyGame/Plugins/MyGame.upluginmanifest", manifest),
            loose(&dir, "MyGame/Plugins/Stray/Stray.uplugin", r#"{"CanContainContent": true}"#),
        ]);

        let builder = MountTableBuilder::new(&index, "MyGame", PackageFileVersion::default());
        assert_eq!(builder.mode(), DiscoveryMode::PluginManifests);

        let (table, added) = builder.build(&CancellationFlag::new()).unwrap();
        assert_eq!(added, 2);
        assert_eq!(table.get("one"), Some("MyGame/Plugins/Other/One"));
        assert_eq!(table.get("Two"), Some("MyGame/Plugins/GF/Two"));
        assert!(!table.contains("Stray"));
    }

    #[test]
    fn test_old_versions_ignore_manifests() {
        let dir = TempDir::new().unwrap();
        let index = FileIndex::new(CaseMode::Insensitive);
        index.insert_batch(vec![
            loose(&dir, "MyGame/Plugins/MyGame.upluginmanifest", r#"{"Contents": []}"#),
            loose(&dir, "MyGame/Plugins/A/A.uplugin", r#"{"CanContainContent": true}"#),
        ]);

        let builder = MountTableBuilder::new(&index, "MyGame", PackageFileVersion::ue4(513));
        assert_eq!(builder.mode(), DiscoveryMode::PluginDescriptors);
        let (_, added) = builder.build(&CancellationFlag::new()).unwrap();
        assert_eq!(added, 1);
    }

    #[test]
    fn test_cancelled_build() {
        let dir = TempDir::new().unwrap();
        let index = FileIndex::new(CaseMode::Insensitive);
        index.insert_batch(vec![loose(&dir, "MyGame/Plugins/A/A.uplugin", "{}")]);

        let cancel = CancellationFlag::new();
        cancel.cancel();
        let builder = MountTableBuilder::new(&index, "MyGame", PackageFileVersion::default());
        assert!(matches!(builder.build(&cancel), Err(ProviderError::Cancelled)));
    }
}
