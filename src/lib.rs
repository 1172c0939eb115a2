//! # pakvfs - Virtual filesystem over cooked game content
//!
//! `pakvfs` merges pak archives, IoStore chunk stores and loose directories
//! into one case-aware namespace of canonical paths, and loads packages out
//! of it:
//!
//! - **Path normalization** of engine-style paths (`/Game/Hero.Hero`) into
//!   canonical namespace keys, including plugin mount points
//! - **Mount point discovery** from `.uplugin` descriptors or
//!   `.upluginmanifest` files
//! - **Two-phase package loading** through a pluggable
//!   [`PackageDeserializer`], with companion `.uexp` / `.ubulk` / `.uptnl`
//!   files wired up automatically
//! - **Cross-package reference resolution** that is safe under cycles and
//!   concurrent callers
//! - **Localization tables** merged from every `.locres` of a culture
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pakvfs::{FileProvider, Result};
//!
//! # fn main() -> Result<()> {
//! let provider = FileProvider::builder().case_insensitive(true).build();
//!
//! provider.mount_directory("/games/MyGame/Content/Paks/Loose")?;
//! provider.mount_pak("/games/MyGame/Content/Paks/pakchunk0-WindowsNoEditor.pak")?;
//!
//! // Engine paths resolve to canonical files
//! let bytes = provider.save_asset("/Game/UI/Icons/T_Sword")?;
//! println!("{} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Loading Packages
//!
//! ```rust,no_run
//! use pakvfs::{CancellationFlag, FileProvider, Language, PackageDeserializer, Result};
//! use std::sync::Arc;
//!
//! # fn run(deserializer: Arc<dyn PackageDeserializer>) -> Result<()> {
//! let provider = FileProvider::builder()
//!     .deserializer(deserializer)
//!     .lazy_serialization(false)
//!     .build();
//! provider.mount_directory("/games/MyGame/Content/Paks/Loose")?;
//! provider.load_virtual_paths(&CancellationFlag::new())?;
//! provider.load_localization(Language::German, &CancellationFlag::new())?;
//!
//! let hero = provider.load_object("/Game/Characters/Hero.Hero")?;
//! println!("{} is a {}", hero.name(), hero.class());
//! # Ok(())
//! # }
//! ```

// Provider engine
pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{
    binary, cancel, config, container, deserializer, error, file, index, loader, localization,
    locres, mount, namespace, package, path, payload, plugin, resolver, version,
};
#[cfg(feature = "async")]
pub(crate) use crate::core::runtime;

// Re-export core types that users need
pub use crate::core::{
    cancel::CancellationFlag,
    config::ProviderConfig,
    container::{
        iostore::{ChunkId, ChunkKind, ChunkStore, ContainerHeader, IoStoreContainer, MemoryChunkStore, PackageId},
        loose::LooseDirectory,
        pak::PakArchive,
        Container,
    },
    deserializer::{
        ExportContext, NoDeserializer, ObjectData, PackageDeserializer, PackageLayout,
        PackageSource,
    },
    error::{ProviderError, Result},
    file::{ArchiveReader, CompressionMethod, ContainerKind, FileSource, GameFile, ReadSeek},
    localization::{language_code, Language},
    mount::VirtualPaths,
    package::{
        LazyPayload, LoadedPackage, ObjectExport, ObjectImport, ObjectRef, PackageIndex,
        PackageTables, PackageVariant, UObject,
    },
    path::{CaseMode, PathNormalizer},
    version::PackageFileVersion,
};

use crate::core::namespace::Namespace;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Read-only view over every mounted container
///
/// Cloning is cheap; clones share the namespace, the mount table, the
/// localization table and the loaded packages.
///
/// Every fallible operation comes in three forms: `op` returns a
/// [`Result`], `try_op` turns any error into `None`, and `op_async` (with the
/// `async` feature) runs `op` on tokio's blocking pool.
#[derive(Clone)]
pub struct FileProvider {
    inner: Arc<Namespace>,
}

impl FileProvider {
    /// Provider with default configuration that can only serve raw files
    pub fn new() -> Self {
        FileProviderBuilder::new().build()
    }

    pub fn builder() -> FileProviderBuilder {
        FileProviderBuilder::new()
    }

    pub fn config(&self) -> &ProviderConfig {
        self.inner.config()
    }

    /// Merge a container into the namespace
    ///
    /// Files of later mounts replace same-path files of earlier ones.
    /// Returns the number of entries added.
    pub fn mount(&self, container: &dyn Container) -> Result<usize> {
        self.inner.mount(container)
    }

    pub fn mount_directory<P: AsRef<Path>>(&self, root: P) -> Result<usize> {
        let container = LooseDirectory::new(root)?;
        self.mount(&container)
    }

    pub fn mount_pak<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let archive = PakArchive::open(path)?;
        self.mount(&archive)
    }

    /// Snapshot of the namespace, sorted by canonical key
    pub fn files(&self) -> Vec<(String, GameFile)> {
        self.inner.index().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.index().is_empty()
    }

    /// Project root folder, discovered from the namespace unless configured
    pub fn project_name(&self) -> String {
        self.inner.project_name().to_string()
    }

    /// Canonical namespace key for an engine or canonical path
    pub fn normalize(&self, path: &str) -> String {
        self.inner.normalize(path)
    }

    pub fn resolve_path(&self, path: &str) -> Result<GameFile> {
        self.inner.resolve_path(path)
    }

    pub fn try_resolve_path(&self, path: &str) -> Option<GameFile> {
        self.resolve_path(path).ok()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.try_resolve_path(path).is_some()
    }

    /// Raw bytes of one file
    pub fn save_asset(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.save_asset(path)
    }

    pub fn try_save_asset(&self, path: &str) -> Option<Vec<u8>> {
        self.save_asset(path).ok()
    }

    pub fn create_reader(&self, path: &str) -> Result<ArchiveReader> {
        self.inner.create_reader(path)
    }

    pub fn try_create_reader(&self, path: &str) -> Option<ArchiveReader> {
        self.create_reader(path).ok()
    }

    /// Raw bytes of a package and every companion file, keyed by path
    pub fn save_package(&self, path: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        self.inner.save_package(path)
    }

    pub fn try_save_package(&self, path: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        self.save_package(path).ok()
    }

    /// Load a package, or return the resident instance
    ///
    /// With lazy serialization off, every export is materialized before this
    /// returns.
    pub fn load_package(&self, path: &str) -> Result<Arc<LoadedPackage>> {
        self.inner.load_package(path)
    }

    pub fn try_load_package(&self, path: &str) -> Option<Arc<LoadedPackage>> {
        self.load_package(path).ok()
    }

    /// Handle to an object without materializing it
    pub fn find_object(&self, object_path: &str) -> Result<ObjectRef> {
        self.inner.find_object(object_path)
    }

    pub fn try_find_object(&self, object_path: &str) -> Option<ObjectRef> {
        self.find_object(object_path).ok()
    }

    /// Load an object by path (`/Game/Hero.Hero`)
    ///
    /// Without an object name the object named like the package is loaded.
    pub fn load_object(&self, object_path: &str) -> Result<Arc<UObject>> {
        self.inner.load_object(object_path)
    }

    pub fn try_load_object(&self, object_path: &str) -> Option<Arc<UObject>> {
        self.load_object(object_path).ok()
    }

    pub fn load_object_named(&self, package_path: &str, object_name: &str) -> Result<Arc<UObject>> {
        self.inner.load_object_named(package_path, object_name)
    }

    pub fn try_load_object_named(&self, package_path: &str, object_name: &str) -> Option<Arc<UObject>> {
        self.load_object_named(package_path, object_name).ok()
    }

    /// Resolve a reference of `package`; `None` when null or unresolvable
    pub fn resolve(&self, package: &Arc<LoadedPackage>, index: PackageIndex) -> Option<ObjectRef> {
        self.inner.resolve(package, index)
    }

    /// Rebuild the virtual mount table; returns the number of mount points
    pub fn load_virtual_paths(&self, cancel: &CancellationFlag) -> Result<usize> {
        self.inner.load_virtual_paths(cancel)
    }

    /// Rebuild the mount table for a specific build version
    pub fn load_virtual_paths_for(
        &self,
        version: PackageFileVersion,
        cancel: &CancellationFlag,
    ) -> Result<usize> {
        self.inner.load_virtual_paths_for(version, cancel)
    }

    pub fn virtual_paths(&self) -> VirtualPaths {
        self.inner.virtual_paths()
    }

    /// Replace the localization table with every `.locres` of `culture`
    ///
    /// Returns the number of pairs inserted across all files.
    pub fn load_locale(&self, culture: &str, cancel: &CancellationFlag) -> Result<usize> {
        self.inner.load_locale(culture, cancel)
    }

    pub fn load_localization(&self, language: Language, cancel: &CancellationFlag) -> Result<usize> {
        self.inner.load_localization(language, cancel)
    }

    /// Localized string, `default` (or empty) when absent
    pub fn localized_string(&self, namespace: &str, key: &str, default: Option<&str>) -> String {
        self.inner.localized_string(namespace, key, default)
    }

    /// Number of pairs in the current localization table
    pub fn localization_len(&self) -> usize {
        self.inner.localization_len()
    }

    /// Drop every mounted file, table and loaded package
    pub fn clear(&self) {
        self.inner.clear();
        info!("Cleared provider");
    }
}

#[cfg(feature = "async")]
impl FileProvider {
    pub async fn mount_async<C>(&self, container: C) -> Result<usize>
    where
        C: Container + 'static,
    {
        let inner = Arc::clone(&self.inner);
        runtime::blocking(move || inner.mount(&container)).await
    }

    pub async fn mount_directory_async<P>(&self, root: P) -> Result<usize>
    where
        P: AsRef<Path> + Send + 'static,
    {
        let provider = self.clone();
        runtime::blocking(move || provider.mount_directory(root)).await
    }

    pub async fn mount_pak_async<P>(&self, path: P) -> Result<usize>
    where
        P: AsRef<Path> + Send + 'static,
    {
        let provider = self.clone();
        runtime::blocking(move || provider.mount_pak(path)).await
    }

    pub async fn resolve_path_async(&self, path: &str) -> Result<GameFile> {
        let (inner, path) = (Arc::clone(&self.inner), path.to_string());
        runtime::blocking(move || inner.resolve_path(&path)).await
    }

    pub async fn try_resolve_path_async(&self, path: &str) -> Option<GameFile> {
        self.resolve_path_async(path).await.ok()
    }

    pub async fn save_asset_async(&self, path: &str) -> Result<Vec<u8>> {
        let (inner, path) = (Arc::clone(&self.inner), path.to_string());
        runtime::blocking(move || inner.save_asset(&path)).await
    }

    pub async fn try_save_asset_async(&self, path: &str) -> Option<Vec<u8>> {
        self.save_asset_async(path).await.ok()
    }

    pub async fn create_reader_async(&self, path: &str) -> Result<ArchiveReader> {
        let (inner, path) = (Arc::clone(&self.inner), path.to_string());
        runtime::blocking(move || inner.create_reader(&path)).await
    }

    pub async fn save_package_async(&self, path: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let (inner, path) = (Arc::clone(&self.inner), path.to_string());
        runtime::blocking(move || inner.save_package(&path)).await
    }

    pub async fn try_save_package_async(&self, path: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        self.save_package_async(path).await.ok()
    }

    pub async fn load_package_async(&self, path: &str) -> Result<Arc<LoadedPackage>> {
        let (inner, path) = (Arc::clone(&self.inner), path.to_string());
        runtime::blocking(move || inner.load_package(&path)).await
    }

    pub async fn try_load_package_async(&self, path: &str) -> Option<Arc<LoadedPackage>> {
        self.load_package_async(path).await.ok()
    }

    pub async fn find_object_async(&self, object_path: &str) -> Result<ObjectRef> {
        let (inner, path) = (Arc::clone(&self.inner), object_path.to_string());
        runtime::blocking(move || inner.find_object(&path)).await
    }

    pub async fn load_object_async(&self, object_path: &str) -> Result<Arc<UObject>> {
        let (inner, path) = (Arc::clone(&self.inner), object_path.to_string());
        runtime::blocking(move || inner.load_object(&path)).await
    }

    pub async fn try_load_object_async(&self, object_path: &str) -> Option<Arc<UObject>> {
        self.load_object_async(object_path).await.ok()
    }

    pub async fn load_object_named_async(
        &self,
        package_path: &str,
        object_name: &str,
    ) -> Result<Arc<UObject>> {
        let inner = Arc::clone(&self.inner);
        let (package_path, object_name) = (package_path.to_string(), object_name.to_string());
        runtime::blocking(move || inner.load_object_named(&package_path, &object_name)).await
    }

    pub async fn load_virtual_paths_async(&self, cancel: &CancellationFlag) -> Result<usize> {
        let (inner, cancel) = (Arc::clone(&self.inner), cancel.clone());
        runtime::blocking(move || inner.load_virtual_paths(&cancel)).await
    }

    pub async fn load_locale_async(&self, culture: &str, cancel: &CancellationFlag) -> Result<usize> {
        let (inner, cancel) = (Arc::clone(&self.inner), cancel.clone());
        let culture = culture.to_string();
        runtime::blocking(move || inner.load_locale(&culture, &cancel)).await
    }

    pub async fn load_localization_async(
        &self,
        language: Language,
        cancel: &CancellationFlag,
    ) -> Result<usize> {
        let (inner, cancel) = (Arc::clone(&self.inner), cancel.clone());
        runtime::blocking(move || inner.load_localization(language, &cancel)).await
    }
}

impl Default for FileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FileProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProvider")
            .field("files", &self.len())
            .field("config", self.config())
            .finish_non_exhaustive()
    }
}

/// Builder for [`FileProvider`]
///
/// # Examples
///
/// ```rust
/// use pakvfs::{FileProvider, PackageFileVersion};
///
/// let provider = FileProvider::builder()
///     .case_insensitive(false)
///     .version(PackageFileVersion::ue4(510))
///     .package_cache_capacity(32)
///     .project_name("ShooterGame")
///     .build();
///
/// assert_eq!(provider.project_name(), "ShooterGame");
/// assert!(provider.is_empty());
/// ```
pub struct FileProviderBuilder {
    config: ProviderConfig,
    deserializer: Option<Arc<dyn PackageDeserializer>>,
}

impl FileProviderBuilder {
    pub fn new() -> Self {
        FileProviderBuilder {
            config: ProviderConfig::default(),
            deserializer: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.config.case_insensitive = case_insensitive;
        self
    }

    pub fn version(mut self, version: PackageFileVersion) -> Self {
        self.config.version = version;
        self
    }

    pub fn lazy_serialization(mut self, lazy: bool) -> Self {
        self.config.lazy_serialization = lazy;
        self
    }

    pub fn package_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.package_cache_capacity = capacity;
        self
    }

    pub fn project_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.project_name = Some(name.into());
        self
    }

    /// Decoder used for package tables and exports
    pub fn deserializer(mut self, deserializer: Arc<dyn PackageDeserializer>) -> Self {
        self.deserializer = Some(deserializer);
        self
    }

    pub fn build(self) -> FileProvider {
        let deserializer = self
            .deserializer
            .unwrap_or_else(|| Arc::new(NoDeserializer));
        FileProvider {
            inner: Namespace::new(self.config, deserializer),
        }
    }
}

impl Default for FileProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
