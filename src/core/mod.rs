//! Provider engine
//!
//! - [`path`] - canonical path normalization
//! - [`index`] - the merged, case-aware file namespace
//! - [`file`] - file descriptors and their readers
//! - [`container`] - pak, IoStore and loose directory backends
//! - [`mount`] / [`plugin`] - virtual mount point discovery
//! - [`payload`] - companion file lookup (`.uexp`, `.ubulk`, `.uptnl`)
//! - [`loader`] / [`package`] / [`deserializer`] - two-phase package loading
//! - [`resolver`] - import and export reference resolution
//! - [`locres`] / [`localization`] - localized string tables
//! - [`namespace`] - the shared state behind a provider

pub mod binary;
pub mod cancel;
pub mod config;
pub mod container;
pub mod deserializer;
pub mod error;
pub mod file;
pub mod index;
pub mod loader;
pub mod localization;
pub mod locres;
pub mod mount;
pub mod namespace;
pub mod package;
pub mod path;
pub mod payload;
pub mod plugin;
pub mod resolver;
#[cfg(feature = "async")]
pub(crate) mod runtime;
pub mod version;

// Re-export commonly used types
pub use cancel::CancellationFlag;
pub use config::ProviderConfig;
pub use container::{
    iostore::{ChunkId, ChunkKind, ChunkStore, ContainerHeader, IoStoreContainer, MemoryChunkStore, PackageId},
    loose::LooseDirectory,
    pak::PakArchive,
    Container,
};
pub use deserializer::{
    ExportContext, NoDeserializer, ObjectData, PackageDeserializer, PackageLayout, PackageSource,
};
pub use error::{ProviderError, Result};
pub use file::{ArchiveReader, CompressionMethod, ContainerKind, FileSource, GameFile, ReadSeek};
pub use index::FileIndex;
pub use localization::{language_code, Language, LocalizationTable};
pub use locres::Locres;
pub use mount::{DiscoveryMode, VirtualPaths};
pub use namespace::Namespace;
pub use package::{
    LazyPayload, LoadedPackage, ObjectExport, ObjectImport, ObjectRef, PackageIndex, PackageTables,
    PackageVariant, UObject,
};
pub use path::{CaseMode, PathNormalizer};
pub use payload::{find_payloads, Payloads};
pub use version::PackageFileVersion;
