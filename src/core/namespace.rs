//! Shared provider state
//!
//! [`Namespace`] owns the merged file index, the mount table, the
//! localization table and the package registry. The public
//! [`FileProvider`](crate::FileProvider) is a cheap handle around it; loaded
//! packages point back at it weakly so they never keep it alive.

use crate::cancel::CancellationFlag;
use crate::config::ProviderConfig;
use crate::container::Container;
use crate::deserializer::PackageDeserializer;
use crate::error::{ProviderError, Result};
use crate::file::{ArchiveReader, GameFile};
use crate::index::FileIndex;
use crate::loader::{self, PackageRegistry};
use crate::localization::{self, language_code, Language, LocalizationTable};
use crate::mount::{MountTableBuilder, VirtualPaths};
use crate::package::{LoadedPackage, ObjectRef, PackageIndex, UObject, WaitGraph};
use crate::path::{CaseMode, PathNormalizer};
use crate::payload::find_payloads;
use crate::version::PackageFileVersion;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

const UPROJECT_EXTENSION: &str = ".uproject";
const MAP_EXTENSION: &str = "umap";

pub struct Namespace {
    config: ProviderConfig,
    index: FileIndex,
    virtual_paths: RwLock<VirtualPaths>,
    localization: RwLock<LocalizationTable>,
    project_name: RwLock<Option<Arc<str>>>,
    registry: PackageRegistry,
    export_waits: WaitGraph,
    deserializer: Arc<dyn PackageDeserializer>,
    self_ref: Weak<Namespace>,
}

impl Namespace {
    pub fn new(config: ProviderConfig, deserializer: Arc<dyn PackageDeserializer>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Namespace {
            index: FileIndex::new(CaseMode::from_insensitive(config.case_insensitive)),
            virtual_paths: RwLock::new(VirtualPaths::new()),
            localization: RwLock::new(LocalizationTable::new()),
            project_name: RwLock::new(None),
            registry: PackageRegistry::new(config.package_cache_capacity),
            export_waits: WaitGraph::default(),
            deserializer,
            self_ref: self_ref.clone(),
            config,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub(crate) fn export_waits(&self) -> &WaitGraph {
        &self.export_waits
    }

    /// Merge a container's files; later mounts win on collisions
    pub fn mount(&self, container: &dyn Container) -> Result<usize> {
        let files = container.entries()?;
        let added = self.index.insert_batch(files);
        *self.project_name.write() = None;
        info!(container = %container.name(), files = added, "Mounted container");
        Ok(added)
    }

    pub fn clear(&self) {
        self.index.clear();
        *self.virtual_paths.write() = VirtualPaths::new();
        *self.localization.write() = LocalizationTable::new();
        *self.project_name.write() = None;
        self.registry.clear();
        debug!("Cleared namespace");
    }

    /// Project root folder name, discovered from the namespace on first use
    pub fn project_name(&self) -> Arc<str> {
        if let Some(name) = self.config.project_name.as_deref() {
            return Arc::from(name);
        }
        if let Some(name) = self.project_name.read().as_ref() {
            return Arc::clone(name);
        }

        let name: Arc<str> = Arc::from(self.discover_project_name());
        *self.project_name.write() = Some(Arc::clone(&name));
        name
    }

    fn discover_project_name(&self) -> String {
        let key = self
            .index
            .find_first(|key, _| {
                key.len() >= UPROJECT_EXTENSION.len()
                    && key[key.len() - UPROJECT_EXTENSION.len()..].eq_ignore_ascii_case(UPROJECT_EXTENSION)
            })
            .or_else(|| {
                self.index.find_first(|key, _| {
                    !key.starts_with('/')
                        && key.split_once('/').map_or(false, |(root, _)| {
                            !root.to_ascii_lowercase().ends_with("engine")
                        })
                })
            })
            .map(|(key, _)| key)
            .unwrap_or_default();

        let root = key.split('/').next().unwrap_or_default();
        if root.eq_ignore_ascii_case("midnightsuns") {
            "codagame".to_string()
        } else {
            root.to_string()
        }
    }

    pub fn normalize(&self, path: &str) -> String {
        let project = self.project_name();
        let virtual_paths = self.virtual_paths.read();
        PathNormalizer::new(&project, &virtual_paths, self.index.case()).normalize(path)
    }

    pub fn resolve_path(&self, path: &str) -> Result<GameFile> {
        let canonical = self.normalize(path);
        self.index
            .get(&canonical)
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))
    }

    /// Like [`resolve_path`](Self::resolve_path), trying `.umap` when the
    /// default package extension was guessed
    fn resolve_package_path(&self, path: &str) -> Result<GameFile> {
        let canonical = self.normalize(path);
        if let Some(file) = self.index.get(&canonical) {
            return Ok(file);
        }

        let stem = canonical
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&canonical);
        self.index
            .get(&format!("{}.{}", stem, MAP_EXTENSION))
            .filter(|file| file.is_package())
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))
    }

    pub fn save_asset(&self, path: &str) -> Result<Vec<u8>> {
        self.resolve_path(path)?.read()
    }

    pub fn create_reader(&self, path: &str) -> Result<ArchiveReader> {
        self.resolve_path(path)?.create_reader()
    }

    /// Raw bytes of a package and its companions, keyed by their paths
    pub fn save_package(&self, path: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let primary = self.resolve_package_path(path)?;
        let payloads = find_payloads(&self.index, &primary);

        let mut files = BTreeMap::new();
        for file in std::iter::once(primary)
            .chain(payloads.exports)
            .chain(payloads.bulk)
            .chain(payloads.optional_bulk)
        {
            let data = file.read()?;
            files.insert(file.path().to_string(), data);
        }
        Ok(files)
    }

    pub fn load_package(&self, path: &str) -> Result<Arc<LoadedPackage>> {
        let file = self.resolve_package_path(path)?;
        self.load_package_file(file)
    }

    /// Load by engine package name (`/Game/Characters/Hero`)
    pub fn load_package_by_name(&self, name: &str) -> Result<Arc<LoadedPackage>> {
        self.load_package(name)
    }

    pub fn load_package_file(&self, file: GameFile) -> Result<Arc<LoadedPackage>> {
        let key = self.index.key(file.path());
        let lazy = self.config.lazy_serialization;
        let deserializer = Arc::clone(&self.deserializer);

        let (package, loaded) = self.registry.get_or_load(&key, || {
            loader::open_package(&self.index, file, deserializer, lazy, self.self_ref.clone())
        })?;

        if loaded {
            if !lazy {
                let discard = self.registry.discard_on_drop(&key);
                package.load_all_exports()?;
                discard.disarm();
            }
            package.mark_complete();
            debug!(package = package.name(), "Package complete");
        }
        Ok(package)
    }

    /// Handle to an object by path: `/Game/Foo.Bar`, or `/Game/Foo` for the
    /// object named like its package
    pub fn find_object(&self, object_path: &str) -> Result<ObjectRef> {
        let (package_path, object_name) = split_object_path(object_path);
        self.find_object_named(package_path, object_name)
    }

    pub fn find_object_named(&self, package_path: &str, object_name: &str) -> Result<ObjectRef> {
        let package = self.load_package(package_path)?;
        package
            .get_export(object_name)
            .ok_or_else(|| ProviderError::ExportNotFound {
                package: package.name().to_string(),
                object: object_name.to_string(),
            })
    }

    pub fn load_object(&self, object_path: &str) -> Result<Arc<UObject>> {
        self.find_object(object_path)?.load()
    }

    pub fn load_object_named(&self, package_path: &str, object_name: &str) -> Result<Arc<UObject>> {
        self.find_object_named(package_path, object_name)?.load()
    }

    pub fn resolve(&self, package: &Arc<LoadedPackage>, index: PackageIndex) -> Option<ObjectRef> {
        package.resolve(index)
    }

    pub fn load_virtual_paths(&self, cancel: &CancellationFlag) -> Result<usize> {
        self.load_virtual_paths_for(self.config.version, cancel)
    }

    /// Rebuild the mount table, gating manifest discovery on `version`
    pub fn load_virtual_paths_for(
        &self,
        version: PackageFileVersion,
        cancel: &CancellationFlag,
    ) -> Result<usize> {
        let project = self.project_name();
        let (table, added) = MountTableBuilder::new(&self.index, &project, version).build(cancel)?;
        *self.virtual_paths.write() = table;
        Ok(added)
    }

    pub fn virtual_paths(&self) -> VirtualPaths {
        self.virtual_paths.read().clone()
    }

    pub fn load_locale(&self, culture: &str, cancel: &CancellationFlag) -> Result<usize> {
        let project = self.project_name();
        let (table, inserted) = localization::build_table(&self.index, &project, culture, cancel)?;
        *self.localization.write() = table;
        Ok(inserted)
    }

    pub fn load_localization(&self, language: Language, cancel: &CancellationFlag) -> Result<usize> {
        let project = self.project_name();
        self.load_locale(language_code(&project, language), cancel)
    }

    pub fn localized_string(&self, namespace: &str, key: &str, default: Option<&str>) -> String {
        self.localization
            .read()
            .get(namespace, key)
            .or(default)
            .unwrap_or_default()
            .to_string()
    }

    pub fn localization_len(&self) -> usize {
        self.localization.read().len()
    }
}

/// `/Game/Foo.Bar` -> (`/Game/Foo`, `Bar`); `/Game/Foo` -> (`/Game/Foo`, `Foo`)
pub(crate) fn split_object_path(object_path: &str) -> (&str, &str) {
    let name_start = object_path.rfind('/').map_or(0, |i| i + 1);
    match object_path[name_start..].rfind('.') {
        Some(dot) => (
            &object_path[..name_start + dot],
            &object_path[name_start + dot + 1..],
        ),
        None => (object_path, &object_path[name_start..]),
    }
}
