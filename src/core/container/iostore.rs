//! Chunk-indexed (IoStore) containers
//!
//! Chunk stores are content addressed: payloads are looked up by [`ChunkId`]
//! and the [`ContainerHeader`] records which packages the container holds and
//! what they import. Block decoding of real `.utoc`/`.ucas` pairs is left to
//! a [`ChunkStore`] implementation; [`MemoryChunkStore`] is the bundled one.

use super::Container;
use crate::error::{ProviderError, Result};
use crate::file::{FileSource, GameFile};
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// 64-bit package identity derived from the package name
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub u64);

impl PackageId {
    /// Hash a package name (`/Game/Maps/Arena`), ignoring case
    pub fn from_name(name: &str) -> Self {
        PackageId(xxh3_64(name.to_lowercase().as_bytes()))
    }
}

impl fmt::Debug for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageId({:016x})", self.0)
    }
}

/// What a chunk holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    ExportBundleData,
    BulkData,
    OptionalBulkData,
    Other(u8),
}

/// Address of a chunk inside a store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub package: PackageId,
    pub index: u16,
    pub kind: ChunkKind,
}

impl ChunkId {
    pub fn new(package: PackageId, index: u16, kind: ChunkKind) -> Self {
        ChunkId {
            package,
            index,
            kind,
        }
    }
}

/// One package stored in a container
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub package_id: PackageId,
    pub package_name: String,
    pub imported_packages: Vec<PackageId>,
}

/// Per-container package directory
#[derive(Debug, Clone, Default)]
pub struct ContainerHeader {
    pub container_id: u64,
    pub entries: Vec<StoreEntry>,
}

impl ContainerHeader {
    pub fn new(container_id: u64) -> Self {
        ContainerHeader {
            container_id,
            entries: Vec::new(),
        }
    }

    pub fn find(&self, package_id: PackageId) -> Option<&StoreEntry> {
        self.entries.iter().find(|e| e.package_id == package_id)
    }

    pub fn imported_packages(&self, package_id: PackageId) -> &[PackageId] {
        self.find(package_id)
            .map(|e| e.imported_packages.as_slice())
            .unwrap_or(&[])
    }
}

/// A chunk as listed by a store: where it sits in the namespace
#[derive(Debug, Clone)]
pub struct ChunkInfo {
    pub id: ChunkId,
    pub path: String,
    pub size: u64,
}

/// Content-addressed chunk storage
pub trait ChunkStore: Send + Sync {
    fn name(&self) -> &str;

    /// Package directory of the container, if it was read
    fn container_header(&self) -> Option<Arc<ContainerHeader>>;

    /// Every chunk the store exposes under a namespace path
    fn chunks(&self) -> Vec<ChunkInfo>;

    fn read_chunk(&self, id: &ChunkId) -> Result<Vec<u8>>;
}

/// In-memory chunk store
///
/// Useful for containers decoded elsewhere and for tests.
pub struct MemoryChunkStore {
    name: String,
    header: Option<Arc<ContainerHeader>>,
    chunks: AHashMap<ChunkId, (String, Arc<[u8]>)>,
}

impl MemoryChunkStore {
    pub fn new(name: impl Into<String>, container_id: u64) -> Self {
        MemoryChunkStore {
            name: name.into(),
            header: Some(Arc::new(ContainerHeader::new(container_id))),
            chunks: AHashMap::new(),
        }
    }

    /// Store without a container header
    pub fn headerless(name: impl Into<String>) -> Self {
        MemoryChunkStore {
            name: name.into(),
            header: None,
            chunks: AHashMap::new(),
        }
    }

    /// Add a package's export chunk under `path` (`MyGame/Content/Hero.uasset`)
    ///
    /// `package_name` is the engine name (`/Game/Hero`) the package id is
    /// derived from.
    pub fn insert_package(
        &mut self,
        path: impl Into<String>,
        package_name: &str,
        imports: &[&str],
        data: impl Into<Vec<u8>>,
    ) -> ChunkId {
        let package_id = PackageId::from_name(package_name);
        let id = ChunkId::new(package_id, 0, ChunkKind::ExportBundleData);

        if let Some(header) = self.header.as_mut() {
            Arc::make_mut(header).entries.push(StoreEntry {
                package_id,
                package_name: package_name.to_string(),
                imported_packages: imports.iter().map(|n| PackageId::from_name(n)).collect(),
            });
        }

        self.insert_chunk(id.clone(), path, data);
        id
    }

    pub fn insert_chunk(&mut self, id: ChunkId, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        self.chunks.insert(id, (path.into(), Arc::from(data)));
    }
}

impl ChunkStore for MemoryChunkStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn container_header(&self) -> Option<Arc<ContainerHeader>> {
        self.header.clone()
    }

    fn chunks(&self) -> Vec<ChunkInfo> {
        let mut chunks: Vec<ChunkInfo> = self
            .chunks
            .iter()
            .map(|(id, (path, data))| ChunkInfo {
                id: id.clone(),
                path: path.clone(),
                size: data.len() as u64,
            })
            .collect();
        chunks.sort_by(|a, b| a.path.cmp(&b.path));
        chunks
    }

    fn read_chunk(&self, id: &ChunkId) -> Result<Vec<u8>> {
        self.chunks
            .get(id)
            .map(|(_, data)| data.to_vec())
            .ok_or_else(|| ProviderError::NotFound(format!("{}:{:?}", self.name, id)))
    }
}

/// Mountable view over a chunk store
#[derive(Clone)]
pub struct IoStoreContainer {
    store: Arc<dyn ChunkStore>,
}

impl IoStoreContainer {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        IoStoreContainer { store }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }
}

impl Container for IoStoreContainer {
    fn name(&self) -> String {
        self.store.name().to_string()
    }

    fn entries(&self) -> Result<Vec<GameFile>> {
        Ok(self
            .store
            .chunks()
            .into_iter()
            .map(|chunk| {
                GameFile::new(
                    chunk.path,
                    chunk.size,
                    FileSource::IoStore {
                        store: Arc::clone(&self.store),
                        chunk: chunk.id,
                    },
                )
            })
            .collect())
    }
}
