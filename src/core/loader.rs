//! Package loading
//!
//! [`open_package`] runs the table phase for one primary file: it finds the
//! companions, opens the readers the container kind requires and hands them
//! to the deserializer. [`PackageRegistry`] makes sure each package path is
//! loaded by at most one thread at a time and keeps recently used packages
//! resident.

use crate::deserializer::{PackageDeserializer, PackageLayout, PackageSource};
use crate::error::{ProviderError, Result};
use crate::file::{ContainerKind, FileSource, GameFile, ReadSeek};
use crate::index::FileIndex;
use crate::namespace::Namespace;
use crate::package::{LazyPayload, LoadedPackage, PackageParts, PackageVariant};
use crate::payload::find_payloads;
use ahash::AHashMap;
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Run the table phase for `file`
pub(crate) fn open_package(
    index: &FileIndex,
    file: GameFile,
    deserializer: Arc<dyn PackageDeserializer>,
    lazy_serialization: bool,
    namespace: Weak<Namespace>,
) -> Result<LoadedPackage> {
    let payloads = find_payloads(index, &file);
    let mut primary = file.create_reader()?;
    let bulk = LazyPayload::new(payloads.bulk);
    let optional_bulk = LazyPayload::new(payloads.optional_bulk);
    let name = file.path_without_extension().to_string();

    let (variant, mut exports_reader) = match file.kind() {
        ContainerKind::ContainerIndexed | ContainerKind::LooseFile => {
            let exports = payloads
                .exports
                .as_ref()
                .map(|exports| exports.create_reader())
                .transpose()?;
            (PackageVariant::Cooked, exports)
        }
        ContainerKind::ChunkIndexed => {
            let header = match file.source() {
                FileSource::IoStore { store, .. } => store.container_header(),
                _ => None,
            };
            let header = header.ok_or_else(|| {
                ProviderError::UnsupportedContainerKind(format!(
                    "{} is chunk-indexed but its store has no container header",
                    file.path()
                ))
            })?;
            (PackageVariant::IoStore { header }, None)
        }
    };

    let layout = match &variant {
        PackageVariant::Cooked => PackageLayout::Cooked {
            exports: exports_reader.as_mut().map(|r| r.as_mut() as &mut dyn ReadSeek),
        },
        PackageVariant::IoStore { header } => PackageLayout::IoStore {
            header: Arc::clone(header),
        },
    };

    let mut source = PackageSource {
        name: &name,
        file: &file,
        primary: primary.as_mut(),
        layout,
        bulk: &bulk,
        optional_bulk: &optional_bulk,
        lazy_serialization,
    };
    let tables = deserializer
        .read_tables(&mut source)
        .map_err(|source| ProviderError::Deserialize {
            package: name.clone(),
            source,
        })?;

    debug!(
        package = %name,
        kind = ?file.kind(),
        imports = tables.imports.len(),
        exports = tables.exports.len(),
        "Loaded package tables"
    );

    Ok(LoadedPackage::from_parts(PackageParts {
        file,
        variant,
        tables,
        primary,
        exports_reader,
        bulk,
        optional_bulk,
        lazy_serialization,
        deserializer,
        namespace,
    }))
}

/// Released once the loading thread finished the table phase
struct LoadLatch {
    done: Mutex<bool>,
    released: Condvar,
}

impl LoadLatch {
    fn new() -> Self {
        LoadLatch {
            done: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.released.wait(&mut done);
        }
    }

    fn release(&self) {
        *self.done.lock() = true;
        self.released.notify_all();
    }
}

/// Frees a loading slot whose loader unwound before publishing a result
struct LoadingGuard<'a> {
    registry: &'a PackageRegistry,
    key: &'a str,
    latch: Arc<LoadLatch>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.slots.lock().remove(self.key);
            self.latch.release();
        }
    }
}

/// Discards a registered package unless disarmed
pub(crate) struct DiscardGuard<'a> {
    registry: &'a PackageRegistry,
    key: &'a str,
    armed: bool,
}

impl DiscardGuard<'_> {
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DiscardGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.discard(self.key);
        }
    }
}

enum Slot {
    Loading(Arc<LoadLatch>),
    /// Present, possibly still materializing exports
    Present(Weak<LoadedPackage>),
}

/// Per-provider table of loading and loaded packages
pub struct PackageRegistry {
    slots: Mutex<AHashMap<String, Slot>>,
    resident: Mutex<LruCache<String, Arc<LoadedPackage>>>,
}

impl PackageRegistry {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        PackageRegistry {
            slots: Mutex::new(AHashMap::new()),
            resident: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Package registered under `key`, if it is still alive
    pub fn get(&self, key: &str) -> Option<Arc<LoadedPackage>> {
        let package = match self.slots.lock().get(key) {
            Some(Slot::Present(weak)) => weak.upgrade(),
            _ => None,
        }?;
        self.resident.lock().get(key);
        Some(package)
    }

    /// Return the registered package or run `load` to create it
    ///
    /// The boolean is true when this call performed the load.
    pub fn get_or_load<F>(&self, key: &str, load: F) -> Result<(Arc<LoadedPackage>, bool)>
    where
        F: FnOnce() -> Result<LoadedPackage>,
    {
        let latch = loop {
            let mut slots = self.slots.lock();
            match slots.get(key) {
                Some(Slot::Present(weak)) => {
                    if let Some(package) = weak.upgrade() {
                        drop(slots);
                        self.resident.lock().put(key.to_string(), Arc::clone(&package));
                        return Ok((package, false));
                    }
                }
                Some(Slot::Loading(latch)) => {
                    let latch = Arc::clone(latch);
                    drop(slots);
                    latch.wait();
                    continue;
                }
                None => {}
            }

            let latch = Arc::new(LoadLatch::new());
            slots.insert(key.to_string(), Slot::Loading(Arc::clone(&latch)));
            break latch;
        };

        let mut guard = LoadingGuard {
            registry: self,
            key,
            latch: Arc::clone(&latch),
            armed: true,
        };
        let result = load().map(Arc::new);
        guard.armed = false;
        drop(guard);

        {
            let mut slots = self.slots.lock();
            match &result {
                Ok(package) => {
                    slots.insert(key.to_string(), Slot::Present(Arc::downgrade(package)));
                }
                Err(_) => {
                    slots.remove(key);
                }
            }
        }
        latch.release();

        let package = result?;
        self.resident.lock().put(key.to_string(), Arc::clone(&package));
        Ok((package, true))
    }

    /// Forget a package, e.g. after its exports failed to materialize
    pub fn discard(&self, key: &str) {
        self.slots.lock().remove(key);
        self.resident.lock().pop(key);
    }

    /// Guard that discards `key` when dropped armed, e.g. while unwinding
    pub(crate) fn discard_on_drop<'a>(&'a self, key: &'a str) -> DiscardGuard<'a> {
        DiscardGuard {
            registry: self,
            key,
            armed: true,
        }
    }

    /// Number of packages kept resident
    pub fn resident_len(&self) -> usize {
        self.resident.lock().len()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
        self.resident.lock().clear();
    }
}
