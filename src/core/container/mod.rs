//! Backing containers
//!
//! A container enumerates the files it contributes to the namespace. The
//! provider merges them in mount order; later containers win on collisions.

pub mod iostore;
pub mod loose;
pub mod pak;

use crate::error::Result;
use crate::file::GameFile;

pub use iostore::{
    ChunkId, ChunkInfo, ChunkKind, ChunkStore, ContainerHeader, IoStoreContainer,
    MemoryChunkStore, PackageId, StoreEntry,
};
pub use loose::LooseDirectory;
pub use pak::{PakArchive, PakEntry, PakInfo};

/// Source of namespace entries
pub trait Container: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> String;

    /// Every file this container supplies
    fn entries(&self) -> Result<Vec<GameFile>>;
}
