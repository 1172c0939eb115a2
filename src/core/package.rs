//! Loaded packages and the objects they export
//!
//! A [`LoadedPackage`] owns its readers, including companion payloads that
//! are only opened when a deserializer asks for them, and drops all of them
//! when the package is discarded. Other packages are only referenced weakly
//! through the resolution memo.

use crate::container::iostore::ContainerHeader;
use crate::deserializer::{ExportContext, ObjectData, PackageDeserializer};
use crate::error::{ProviderError, Result};
use crate::file::{ArchiveReader, GameFile, ReadSeek};
use crate::namespace::Namespace;
use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::debug;

/// Signed reference into a package's tables
///
/// `0` is null, `n > 0` is export `n - 1`, `n < 0` is import `-n - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageIndex(pub i32);

impl PackageIndex {
    pub const NULL: PackageIndex = PackageIndex(0);

    pub fn from_import(index: usize) -> Self {
        PackageIndex(-(index as i32) - 1)
    }

    pub fn from_export(index: usize) -> Self {
        PackageIndex(index as i32 + 1)
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn is_import(self) -> bool {
        self.0 < 0
    }

    pub fn is_export(self) -> bool {
        self.0 > 0
    }

    pub fn to_import(self) -> Option<usize> {
        if self.is_import() {
            Some((-(self.0 as i64) - 1) as usize)
        } else {
            None
        }
    }

    pub fn to_export(self) -> Option<usize> {
        if self.is_export() {
            Some(self.0 as usize - 1)
        } else {
            None
        }
    }
}

/// An object owned by another package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectImport {
    pub class_package: String,
    pub class_name: String,
    #[serde(default)]
    pub outer_index: PackageIndex,
    pub object_name: String,
}

impl ObjectImport {
    /// Imports without an outer name a package
    pub fn is_package(&self) -> bool {
        self.outer_index.is_null()
    }
}

/// An object owned by this package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectExport {
    pub object_name: String,
    #[serde(default)]
    pub class_index: PackageIndex,
    #[serde(default)]
    pub outer_index: PackageIndex,
    #[serde(default)]
    pub serial_offset: i64,
    #[serde(default)]
    pub serial_size: i64,
}

/// Name, import and export tables read in the first loading phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTables {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub imports: Vec<ObjectImport>,
    #[serde(default)]
    pub exports: Vec<ObjectExport>,
}

/// Which package flavour the container produced
#[derive(Debug, Clone)]
pub enum PackageVariant {
    /// Pak or loose package with an optional `.uexp` companion
    Cooked,
    /// Chunk-store package described by its container header
    IoStore { header: Arc<ContainerHeader> },
}

enum LazyState {
    Closed,
    Open(ArchiveReader),
    Failed,
}

/// A companion payload opened on first use
pub struct LazyPayload {
    file: Option<GameFile>,
    state: Mutex<LazyState>,
}

impl LazyPayload {
    pub fn new(file: Option<GameFile>) -> Self {
        LazyPayload {
            file,
            state: Mutex::new(LazyState::Closed),
        }
    }

    pub fn empty() -> Self {
        Self::new(None)
    }

    pub fn file(&self) -> Option<&GameFile> {
        self.file.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_opened(&self) -> bool {
        matches!(*self.state.lock(), LazyState::Open(_))
    }

    /// Run `f` against the payload reader, opening it once on first use
    ///
    /// Returns `Ok(None)` when the package has no such payload.
    pub fn with_reader<T, F>(&self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut dyn ReadSeek) -> io::Result<T>,
    {
        let Some(file) = self.file.as_ref() else {
            return Ok(None);
        };

        let mut state = self.state.lock();
        if let LazyState::Closed = *state {
            match file.create_reader() {
                Ok(reader) => *state = LazyState::Open(reader),
                Err(err) => {
                    *state = LazyState::Failed;
                    return Err(err);
                }
            }
        }

        match &mut *state {
            LazyState::Open(reader) => Ok(Some(f(reader.as_mut())?)),
            _ => Err(ProviderError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("payload {} failed to open earlier", file.path()),
            ))),
        }
    }

    /// Read the whole payload
    pub fn read_all(&self) -> Result<Option<Vec<u8>>> {
        self.with_reader(|reader| {
            reader.seek(SeekFrom::Start(0))?;
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            Ok(data)
        })
    }
}

impl fmt::Debug for LazyPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyPayload")
            .field("file", &self.file.as_ref().map(|f| f.path()))
            .field("opened", &self.is_opened())
            .finish()
    }
}

/// A deserialized export
pub struct UObject {
    name: String,
    class: String,
    package: String,
    outer: Option<String>,
    data: ObjectData,
}

impl UObject {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Name of the owning package
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Name of the outer object, if the export is nested
    pub fn outer(&self) -> Option<&str> {
        self.outer.as_deref()
    }

    pub fn data(&self) -> &(dyn Any + Send + Sync) {
        self.data.as_ref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

impl fmt::Debug for UObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UObject")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("package", &self.package)
            .field("outer", &self.outer)
            .finish_non_exhaustive()
    }
}

enum ExportState {
    Unloaded,
    Loading(ThreadId),
    Loaded(Arc<UObject>),
}

struct ExportSlot {
    state: Mutex<ExportState>,
    ready: Condvar,
}

impl ExportSlot {
    fn new() -> Self {
        ExportSlot {
            state: Mutex::new(ExportState::Unloaded),
            ready: Condvar::new(),
        }
    }
}

/// Resets a slot to `Unloaded` if its loader unwinds
struct ExportLoadGuard<'a> {
    slot: &'a ExportSlot,
    armed: bool,
}

impl Drop for ExportLoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.slot.state.lock() = ExportState::Unloaded;
            self.slot.ready.notify_all();
        }
    }
}

/// Which thread waits on which thread's export, per provider
///
/// A wait that would close a cycle is refused, so two threads materializing
/// exports of mutually importing packages cannot block each other forever.
#[derive(Default)]
pub(crate) struct WaitGraph {
    edges: Mutex<AHashMap<ThreadId, ThreadId>>,
}

impl WaitGraph {
    /// Record that `waiter` waits for `owner`; false when that closes a cycle
    fn begin_wait(&self, waiter: ThreadId, owner: ThreadId) -> bool {
        let mut edges = self.edges.lock();
        let mut current = owner;
        for _ in 0..=edges.len() {
            if current == waiter {
                return false;
            }
            match edges.get(&current) {
                Some(next) => current = *next,
                None => break,
            }
        }
        edges.insert(waiter, owner);
        true
    }

    fn end_wait(&self, waiter: ThreadId) {
        self.edges.lock().remove(&waiter);
    }
}

/// Memoized outcome of resolving one package index
#[derive(Clone)]
pub(crate) struct ResolvedTarget {
    pub package: Weak<LoadedPackage>,
    pub export: usize,
}

/// A package whose tables are loaded
pub struct LoadedPackage {
    name: String,
    file: GameFile,
    variant: PackageVariant,
    tables: PackageTables,
    primary: Mutex<ArchiveReader>,
    primary_size: u64,
    exports_reader: Option<Mutex<ArchiveReader>>,
    bulk: LazyPayload,
    optional_bulk: LazyPayload,
    slots: Vec<ExportSlot>,
    memo: Mutex<AHashMap<i32, Option<ResolvedTarget>>>,
    complete: AtomicBool,
    lazy_serialization: bool,
    deserializer: Arc<dyn PackageDeserializer>,
    namespace: Weak<Namespace>,
}

/// Everything the loader hands over once the table phase succeeded
pub(crate) struct PackageParts {
    pub file: GameFile,
    pub variant: PackageVariant,
    pub tables: PackageTables,
    pub primary: ArchiveReader,
    pub exports_reader: Option<ArchiveReader>,
    pub bulk: LazyPayload,
    pub optional_bulk: LazyPayload,
    pub lazy_serialization: bool,
    pub deserializer: Arc<dyn PackageDeserializer>,
    pub namespace: Weak<Namespace>,
}

impl LoadedPackage {
    pub(crate) fn from_parts(parts: PackageParts) -> Self {
        let slots = parts.tables.exports.iter().map(|_| ExportSlot::new()).collect();
        LoadedPackage {
            name: parts.file.path_without_extension().to_string(),
            primary_size: parts.file.size(),
            file: parts.file,
            variant: parts.variant,
            tables: parts.tables,
            primary: Mutex::new(parts.primary),
            exports_reader: parts.exports_reader.map(Mutex::new),
            bulk: parts.bulk,
            optional_bulk: parts.optional_bulk,
            slots,
            memo: Mutex::new(AHashMap::new()),
            complete: AtomicBool::new(false),
            lazy_serialization: parts.lazy_serialization,
            deserializer: parts.deserializer,
            namespace: parts.namespace,
        }
    }

    /// Canonical path without extension
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &GameFile {
        &self.file
    }

    pub fn variant(&self) -> &PackageVariant {
        &self.variant
    }

    pub fn container_header(&self) -> Option<&Arc<ContainerHeader>> {
        match &self.variant {
            PackageVariant::IoStore { header } => Some(header),
            PackageVariant::Cooked => None,
        }
    }

    pub fn tables(&self) -> &PackageTables {
        &self.tables
    }

    pub fn names(&self) -> &[String] {
        &self.tables.names
    }

    pub fn imports(&self) -> &[ObjectImport] {
        &self.tables.imports
    }

    pub fn exports(&self) -> &[ObjectExport] {
        &self.tables.exports
    }

    pub fn has_exports_payload(&self) -> bool {
        self.exports_reader.is_some()
    }

    pub fn bulk(&self) -> &LazyPayload {
        &self.bulk
    }

    pub fn optional_bulk(&self) -> &LazyPayload {
        &self.optional_bulk
    }

    pub fn lazy_serialization(&self) -> bool {
        self.lazy_serialization
    }

    /// Whether every load phase has finished
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub(crate) fn namespace(&self) -> Option<Arc<Namespace>> {
        self.namespace.upgrade()
    }

    /// Handle to the first top-level export named `name` (case-insensitive),
    /// falling back to any export with that name
    pub fn get_export(self: &Arc<Self>, name: &str) -> Option<ObjectRef> {
        let exports = &self.tables.exports;
        let index = exports
            .iter()
            .position(|e| e.outer_index.is_null() && e.object_name.eq_ignore_ascii_case(name))
            .or_else(|| {
                exports
                    .iter()
                    .position(|e| e.object_name.eq_ignore_ascii_case(name))
            })?;
        Some(ObjectRef::new(Arc::clone(self), index))
    }

    pub fn export_refs(self: &Arc<Self>) -> Vec<ObjectRef> {
        (0..self.tables.exports.len())
            .map(|index| ObjectRef::new(Arc::clone(self), index))
            .collect()
    }

    /// Resolve a reference relative to this package
    pub fn resolve(self: &Arc<Self>, index: PackageIndex) -> Option<ObjectRef> {
        crate::resolver::resolve(self, index)
    }

    /// Materialize every export
    pub fn load_all_exports(self: &Arc<Self>) -> Result<Vec<Arc<UObject>>> {
        (0..self.tables.exports.len())
            .map(|index| self.load_export(index))
            .collect()
    }

    pub(crate) fn memo_get(&self, index: PackageIndex) -> Option<Option<ResolvedTarget>> {
        self.memo.lock().get(&index.0).cloned()
    }

    /// Record a resolution; the first recorded target wins
    pub(crate) fn memo_insert(
        &self,
        index: PackageIndex,
        target: Option<ResolvedTarget>,
    ) -> Option<ResolvedTarget> {
        let mut memo = self.memo.lock();
        let entry = memo.entry(index.0).or_insert(target);
        entry.clone()
    }

    pub(crate) fn memo_forget(&self, index: PackageIndex) {
        self.memo.lock().remove(&index.0);
    }

    /// Materialize one export, at most once
    ///
    /// Concurrent callers wait for the thread doing the work. A request that
    /// would wait on itself, directly or through other waiting threads, is a
    /// cycle and fails with [`ProviderError::CyclicExport`].
    pub fn load_export(self: &Arc<Self>, index: usize) -> Result<Arc<UObject>> {
        let export = self.tables.exports.get(index).ok_or_else(|| ProviderError::ExportNotFound {
            package: self.name.clone(),
            object: format!("#{}", index),
        })?;
        let slot = &self.slots[index];
        let me = thread::current().id();
        let namespace = self.namespace();
        let waits = namespace.as_deref().map(Namespace::export_waits);
        let cyclic = || ProviderError::CyclicExport {
            package: self.name.clone(),
            object: export.object_name.clone(),
        };

        {
            let mut state = slot.state.lock();
            loop {
                match &*state {
                    ExportState::Loaded(object) => return Ok(Arc::clone(object)),
                    ExportState::Loading(owner) => {
                        let owner = *owner;
                        if owner == me {
                            return Err(cyclic());
                        }
                        match waits {
                            Some(waits) => {
                                if !waits.begin_wait(me, owner) {
                                    return Err(cyclic());
                                }
                                slot.ready.wait(&mut state);
                                waits.end_wait(me);
                            }
                            None => slot.ready.wait(&mut state),
                        }
                    }
                    ExportState::Unloaded => break,
                }
            }
            *state = ExportState::Loading(me);
        }

        let mut guard = ExportLoadGuard { slot, armed: true };
        let result = self.deserialize_export(index, export);
        guard.armed = false;

        let mut state = slot.state.lock();
        let outcome = match result {
            Ok(object) => {
                let object = Arc::new(object);
                *state = ExportState::Loaded(Arc::clone(&object));
                Ok(object)
            }
            Err(err) => {
                *state = ExportState::Unloaded;
                Err(err)
            }
        };
        slot.ready.notify_all();
        outcome
    }

    fn deserialize_export(self: &Arc<Self>, index: usize, export: &ObjectExport) -> Result<UObject> {
        let data = self.export_bytes(export)?;
        let mut ctx = ExportContext::new(self, index, data);
        let object = self
            .deserializer
            .read_export(&mut ctx)
            .map_err(|source| ProviderError::Deserialize {
                package: self.name.clone(),
                source,
            })?;

        debug!(package = %self.name, export = %export.object_name, "Deserialized export");

        let outer = export
            .outer_index
            .to_export()
            .and_then(|i| self.tables.exports.get(i))
            .map(|e| e.object_name.clone());

        Ok(UObject {
            name: export.object_name.clone(),
            class: self.class_name(export.class_index),
            package: self.name.clone(),
            outer,
            data: object,
        })
    }

    /// Serialized bytes of one export
    ///
    /// Cooked packages address exports in the concatenation of the primary
    /// file and its `.uexp`; everything past the primary lives in the `.uexp`.
    fn export_bytes(&self, export: &ObjectExport) -> Result<Vec<u8>> {
        let (offset, size) = match (u64::try_from(export.serial_offset), u64::try_from(export.serial_size)) {
            (Ok(offset), Ok(size)) => (offset, size),
            _ => {
                return Err(ProviderError::malformed(
                    self.file.path(),
                    format!("export {} has negative bounds", export.object_name),
                ))
            }
        };

        match &self.exports_reader {
            Some(exports) if offset >= self.primary_size => {
                let mut reader = exports.lock();
                let len = reader.seek(SeekFrom::End(0))?;
                self.read_bounded(&mut **reader, offset - self.primary_size, size, len, export)
            }
            _ => {
                let mut reader = self.primary.lock();
                self.read_bounded(&mut **reader, offset, size, self.primary_size, export)
            }
        }
    }

    /// Read `size` bytes at `offset` from a reader holding `len` bytes
    fn read_bounded(
        &self,
        reader: &mut dyn ReadSeek,
        offset: u64,
        size: u64,
        len: u64,
        export: &ObjectExport,
    ) -> Result<Vec<u8>> {
        let out_of_bounds = || {
            ProviderError::malformed(
                self.file.path(),
                format!("export {} lies outside the package data", export.object_name),
            )
        };
        if offset.checked_add(size).map_or(true, |end| end > len) {
            return Err(out_of_bounds());
        }

        reader.seek(SeekFrom::Start(offset))?;
        let mut data = Vec::new();
        reader.take(size).read_to_end(&mut data)?;
        if (data.len() as u64) < size {
            return Err(out_of_bounds());
        }
        Ok(data)
    }

    /// Class name behind a class index (`Class` for null)
    pub fn class_name(&self, index: PackageIndex) -> String {
        if let Some(i) = index.to_import() {
            if let Some(import) = self.tables.imports.get(i) {
                return import.object_name.clone();
            }
        }
        if let Some(i) = index.to_export() {
            if let Some(export) = self.tables.exports.get(i) {
                return export.object_name.clone();
            }
        }
        "Class".to_string()
    }
}

impl fmt::Debug for LoadedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPackage")
            .field("name", &self.name)
            .field("variant", &self.variant)
            .field("imports", &self.tables.imports.len())
            .field("exports", &self.tables.exports.len())
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Handle to an export of a loaded package
#[derive(Clone)]
pub struct ObjectRef {
    package: Arc<LoadedPackage>,
    export: usize,
}

impl ObjectRef {
    pub(crate) fn new(package: Arc<LoadedPackage>, export: usize) -> Self {
        ObjectRef { package, export }
    }

    pub fn package(&self) -> &Arc<LoadedPackage> {
        &self.package
    }

    pub fn export_index(&self) -> usize {
        self.export
    }

    pub fn export(&self) -> &ObjectExport {
        &self.package.tables.exports[self.export]
    }

    pub fn name(&self) -> &str {
        &self.export().object_name
    }

    pub fn class(&self) -> String {
        self.package.class_name(self.export().class_index)
    }

    pub fn outer(&self) -> Option<ObjectRef> {
        let outer = self.export().outer_index;
        crate::resolver::resolve(&self.package, outer)
    }

    /// `Package.Outer.Name`
    pub fn full_name(&self) -> String {
        let exports = &self.package.tables.exports;
        let mut chain = vec![self.name()];
        let mut outer = self.export().outer_index;
        while let Some(export) = outer.to_export().and_then(|i| exports.get(i)) {
            if chain.len() > exports.len() {
                break;
            }
            chain.push(&export.object_name);
            outer = export.outer_index;
        }
        chain.push(self.package.name());
        chain.reverse();
        chain.join(".")
    }

    pub fn load(&self) -> Result<Arc<UObject>> {
        self.package.load_export(self.export)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.package, &other.package) && self.export == other.export
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.full_name()).finish()
    }
}
