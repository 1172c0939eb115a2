//! Boundary to the package format decoder
//!
//! The provider finds, opens and wires up package files; turning their bytes
//! into tables and objects is the job of a [`PackageDeserializer`]. Loading
//! happens in two phases:
//!
//! 1. [`read_tables`](PackageDeserializer::read_tables) reads the name, import
//!    and export tables. It only performs I/O on the readers it is given and
//!    never resolves references, so it cannot recurse into other packages.
//! 2. [`read_export`](PackageDeserializer::read_export) turns one export into
//!    an object. It may resolve references through the [`ExportContext`].

use crate::container::iostore::ContainerHeader;
use crate::file::{GameFile, ReadSeek};
use crate::package::{
    LazyPayload, LoadedPackage, ObjectExport, ObjectRef, PackageIndex, PackageTables,
};
use std::any::Any;
use std::io::Cursor;
use std::sync::Arc;

/// Deserialized object payload
pub type ObjectData = Box<dyn Any + Send + Sync>;

/// How the rest of the package is laid out next to the primary reader
pub enum PackageLayout<'a> {
    /// Pak or loose package; `exports` is the `.uexp` reader when present
    Cooked {
        exports: Option<&'a mut dyn ReadSeek>,
    },
    /// Chunk-store package and its container header
    IoStore { header: Arc<ContainerHeader> },
}

/// Inputs of the table phase
pub struct PackageSource<'a> {
    pub name: &'a str,
    pub file: &'a GameFile,
    pub primary: &'a mut dyn ReadSeek,
    pub layout: PackageLayout<'a>,
    pub bulk: &'a LazyPayload,
    pub optional_bulk: &'a LazyPayload,
    /// Nested objects may be deserialized on first use
    pub lazy_serialization: bool,
}

/// Inputs of one export deserialization
pub struct ExportContext<'a> {
    package: &'a Arc<LoadedPackage>,
    index: usize,
    data: Cursor<Vec<u8>>,
}

impl<'a> ExportContext<'a> {
    pub(crate) fn new(package: &'a Arc<LoadedPackage>, index: usize, data: Vec<u8>) -> Self {
        ExportContext {
            package,
            index,
            data: Cursor::new(data),
        }
    }

    pub fn package(&self) -> &Arc<LoadedPackage> {
        self.package
    }

    pub fn export_index(&self) -> usize {
        self.index
    }

    pub fn export(&self) -> &ObjectExport {
        &self.package.exports()[self.index]
    }

    /// Serialized bytes of the export
    pub fn data(&self) -> &[u8] {
        self.data.get_ref()
    }

    /// Reader positioned at the start of the export
    pub fn reader(&mut self) -> &mut Cursor<Vec<u8>> {
        &mut self.data
    }

    pub fn bulk(&self) -> &LazyPayload {
        self.package.bulk()
    }

    pub fn optional_bulk(&self) -> &LazyPayload {
        self.package.optional_bulk()
    }

    pub fn container_header(&self) -> Option<&Arc<ContainerHeader>> {
        self.package.container_header()
    }

    pub fn lazy_serialization(&self) -> bool {
        self.package.lazy_serialization()
    }

    /// Resolve a reference of this package; unresolvable references are `None`
    pub fn resolve(&self, index: PackageIndex) -> Option<ObjectRef> {
        self.package.resolve(index)
    }
}

/// Decoder for one package format
pub trait PackageDeserializer: Send + Sync {
    fn read_tables(&self, source: &mut PackageSource<'_>) -> anyhow::Result<PackageTables>;

    fn read_export(&self, ctx: &mut ExportContext<'_>) -> anyhow::Result<ObjectData>;
}

/// Placeholder for providers that only serve raw files; every package load fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeserializer;

impl PackageDeserializer for NoDeserializer {
    fn read_tables(&self, source: &mut PackageSource<'_>) -> anyhow::Result<PackageTables> {
        anyhow::bail!("no package deserializer configured, cannot load {}", source.name)
    }

    fn read_export(&self, ctx: &mut ExportContext<'_>) -> anyhow::Result<ObjectData> {
        anyhow::bail!("no package deserializer configured, cannot load {}", ctx.package().name())
    }
}
