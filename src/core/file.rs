//! File descriptors: one discoverable unit of the namespace
//!
//! A [`GameFile`] is cheap to clone and knows how to open itself. The backing
//! store is a closed set of variants ([`FileSource`]) so every consumer that
//! dispatches on it is checked for exhaustiveness by the compiler.

use crate::container::iostore::{ChunkId, ChunkStore};
use crate::container::pak::{PakArchive, PakEntry};
use crate::error::{ProviderError, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Buffer size for sequential reads of loose files
pub const LOOSE_READ_BUFFER: usize = 80 * 1024;

/// Extensions of primary package files
pub const PACKAGE_EXTENSIONS: [&str; 2] = ["uasset", "umap"];

/// Extensions of companion payload files
pub const PAYLOAD_EXTENSIONS: [&str; 3] = ["uexp", "ubulk", "uptnl"];

/// Seekable byte stream handed out by descriptors
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

pub type ArchiveReader = Box<dyn ReadSeek>;

/// Storage format family of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Monolithic archive with an internal offset table (pak)
    ContainerIndexed,
    /// Content-addressed chunk store with a container header (IoStore)
    ChunkIndexed,
    /// Plain file on disk
    LooseFile,
}

/// Compression applied to a stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    None,
    Named(String),
}

impl CompressionMethod {
    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionMethod::None)
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::None => f.write_str("None"),
            CompressionMethod::Named(name) => f.write_str(name),
        }
    }
}

/// Where a descriptor's bytes live
#[derive(Clone)]
pub enum FileSource {
    Pak {
        archive: PakArchive,
        entry: Arc<PakEntry>,
    },
    IoStore {
        store: Arc<dyn ChunkStore>,
        chunk: ChunkId,
    },
    Loose {
        actual: PathBuf,
    },
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSource::Pak { archive, entry } => f
                .debug_struct("Pak")
                .field("archive", &archive.path())
                .field("offset", &entry.offset)
                .finish(),
            FileSource::IoStore { store, chunk } => f
                .debug_struct("IoStore")
                .field("store", &store.name())
                .field("chunk", chunk)
                .finish(),
            FileSource::Loose { actual } => {
                f.debug_struct("Loose").field("actual", actual).finish()
            }
        }
    }
}

/// A file in the virtual namespace
#[derive(Debug, Clone)]
pub struct GameFile {
    path: Arc<str>,
    size: u64,
    source: FileSource,
}

impl GameFile {
    pub fn new(path: impl Into<String>, size: u64, source: FileSource) -> Self {
        let path: String = path.into();
        GameFile {
            path: Arc::from(path),
            size,
            source,
        }
    }

    /// Descriptor for a file on disk
    pub fn loose(path: impl Into<String>, actual: impl Into<PathBuf>, size: u64) -> Self {
        GameFile::new(
            path,
            size,
            FileSource::Loose {
                actual: actual.into(),
            },
        )
    }

    /// Canonical path as the container spelled it
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Uncompressed size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn kind(&self) -> ContainerKind {
        match self.source {
            FileSource::Pak { .. } => ContainerKind::ContainerIndexed,
            FileSource::IoStore { .. } => ContainerKind::ChunkIndexed,
            FileSource::Loose { .. } => ContainerKind::LooseFile,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        match &self.source {
            FileSource::Pak { entry, .. } => entry.encrypted,
            FileSource::IoStore { .. } | FileSource::Loose { .. } => false,
        }
    }

    pub fn compression(&self) -> CompressionMethod {
        match &self.source {
            FileSource::Pak { archive, entry } => archive.compression_method(entry),
            FileSource::IoStore { .. } | FileSource::Loose { .. } => CompressionMethod::None,
        }
    }

    /// Name of the last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Extension of the last segment, without the dot
    pub fn extension(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(idx) => &name[idx + 1..],
            None => "",
        }
    }

    /// Path with the extension of the last segment removed
    pub fn path_without_extension(&self) -> &str {
        let name_start = self.path.len() - self.name().len();
        match self.path[name_start..].rfind('.') {
            Some(idx) => &self.path[..name_start + idx],
            None => &self.path,
        }
    }

    pub fn is_package(&self) -> bool {
        let ext = self.extension();
        PACKAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e))
    }

    pub fn is_payload(&self) -> bool {
        let ext = self.extension();
        PAYLOAD_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e))
    }

    /// Open a seekable reader over the payload
    pub fn create_reader(&self) -> Result<ArchiveReader> {
        match &self.source {
            FileSource::Pak { archive, entry } => archive.open_entry(entry),
            FileSource::IoStore { store, chunk } => {
                let data = store.read_chunk(chunk)?;
                Ok(Box::new(Cursor::new(data)))
            }
            FileSource::Loose { actual } => {
                let file = open_loose(actual, &self.path)?;
                Ok(Box::new(BufReader::with_capacity(LOOSE_READ_BUFFER, file)))
            }
        }
    }

    /// Read the whole payload into memory
    pub fn read(&self) -> Result<Vec<u8>> {
        match &self.source {
            FileSource::Pak { archive, entry } => archive.read_entry(entry),
            FileSource::IoStore { store, chunk } => Ok(store.read_chunk(chunk)?),
            FileSource::Loose { actual } => {
                let mut file = open_loose(actual, &self.path)?;
                let mut data = Vec::with_capacity(self.size as usize);
                file.read_to_end(&mut data)?;
                Ok(data)
            }
        }
    }

    pub fn try_create_reader(&self) -> Option<ArchiveReader> {
        self.create_reader().ok()
    }

    pub fn try_read(&self) -> Option<Vec<u8>> {
        self.read().ok()
    }

    #[cfg(feature = "async")]
    pub async fn read_async(&self) -> Result<Vec<u8>> {
        let file = self.clone();
        crate::runtime::blocking(move || file.read()).await
    }

    #[cfg(feature = "async")]
    pub async fn create_reader_async(&self) -> Result<ArchiveReader> {
        let file = self.clone();
        crate::runtime::blocking(move || file.create_reader()).await
    }
}

fn open_loose(actual: &Path, path: &str) -> Result<File> {
    File::open(actual).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => ProviderError::NotFound(path.to_string()),
        _ => ProviderError::Io(err),
    })
}
