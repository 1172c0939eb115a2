//! Shared fixtures: a JSON package format and writers for loose trees, pak
//! archives and locale files
//!
//! A package's primary file holds its tables as JSON, padded with spaces to
//! `TABLE_AREA` bytes. Export bodies are JSON blobs stored either in a
//! `.uexp` companion (cooked layout) or after the table area (inline layout).

#![allow(dead_code)]

use pakvfs::{
    ExportContext, ObjectData, ObjectImport, PackageDeserializer, PackageIndex, PackageSource,
    PackageTables, ReadSeek,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const TABLE_AREA: usize = 4096;

/// Export body understood by [`JsonDeserializer`]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportBody {
    value: String,
    refs: Vec<i32>,
    load_refs: bool,
    read_bulk: bool,
    fail: bool,
}

/// What [`JsonDeserializer`] produces for each export
#[derive(Debug)]
pub struct TestObject {
    pub value: String,
    /// Full names of the resolved references, `None` when unresolved
    pub refs: Vec<Option<String>>,
    /// Names of referenced objects that were materialized, `None` on failure
    pub loaded: Vec<Option<String>>,
    pub bulk: Option<Vec<u8>>,
}

#[derive(Default)]
pub struct JsonDeserializer {
    table_reads: Mutex<HashMap<String, usize>>,
    export_reads: AtomicUsize,
    table_delay: Option<Duration>,
}

impl JsonDeserializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep during every table phase to widen race windows
    pub fn with_table_delay(delay: Duration) -> Self {
        JsonDeserializer {
            table_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn table_reads(&self, package: &str) -> usize {
        self.table_reads
            .lock()
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(package))
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn export_reads(&self) -> usize {
        self.export_reads.load(Ordering::SeqCst)
    }
}

impl PackageDeserializer for JsonDeserializer {
    fn read_tables(&self, source: &mut PackageSource<'_>) -> anyhow::Result<PackageTables> {
        *self
            .table_reads
            .lock()
            .entry(source.name.to_string())
            .or_default() += 1;
        if let Some(delay) = self.table_delay {
            std::thread::sleep(delay);
        }

        let primary: &mut dyn ReadSeek = &mut *source.primary;
        primary.seek(SeekFrom::Start(0))?;
        let mut area = Vec::new();
        primary.take(TABLE_AREA as u64).read_to_end(&mut area)?;
        Ok(serde_json::from_slice(&area)?)
    }

    fn read_export(&self, ctx: &mut ExportContext<'_>) -> anyhow::Result<ObjectData> {
        self.export_reads.fetch_add(1, Ordering::SeqCst);

        let body: ExportBody = serde_json::from_slice(ctx.data())?;
        if body.fail {
            anyhow::bail!("export {} is marked as broken", ctx.export().object_name);
        }

        let mut refs = Vec::new();
        let mut loaded = Vec::new();
        for index in body.refs {
            let resolved = ctx.resolve(PackageIndex(index));
            refs.push(resolved.as_ref().map(|r| r.full_name()));
            if body.load_refs {
                loaded.push(resolved.and_then(|r| r.load().ok()).map(|o| o.name().to_string()));
            }
        }

        let bulk = if body.read_bulk {
            ctx.bulk().read_all()?
        } else {
            None
        };

        Ok(Box::new(TestObject {
            value: body.value,
            refs,
            loaded,
            bulk,
        }))
    }
}

/// Which phase [`PanicOnce`] crashes in
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PanicPhase {
    Tables,
    Export,
}

/// Panics the first time `phase` runs, then behaves like [`JsonDeserializer`]
pub struct PanicOnce {
    pub inner: JsonDeserializer,
    phase: PanicPhase,
    fired: AtomicBool,
}

impl PanicOnce {
    pub fn new(phase: PanicPhase) -> Self {
        PanicOnce {
            inner: JsonDeserializer::new(),
            phase,
            fired: AtomicBool::new(false),
        }
    }

    fn fire(&self, phase: PanicPhase) {
        if self.phase == phase && !self.fired.swap(true, Ordering::SeqCst) {
            panic!("deserializer crashed");
        }
    }
}

impl PackageDeserializer for PanicOnce {
    fn read_tables(&self, source: &mut PackageSource<'_>) -> anyhow::Result<PackageTables> {
        self.fire(PanicPhase::Tables);
        self.inner.read_tables(source)
    }

    fn read_export(&self, ctx: &mut ExportContext<'_>) -> anyhow::Result<ObjectData> {
        self.fire(PanicPhase::Export);
        self.inner.read_export(ctx)
    }
}

/// One export of a fixture package
pub struct ExportFixture {
    pub name: String,
    pub class_index: i32,
    pub outer_index: i32,
    /// Recorded size instead of the body length
    pub serial_size: Option<i64>,
    pub body: Value,
}

pub fn export(name: &str, body: Value) -> ExportFixture {
    ExportFixture {
        name: name.to_string(),
        class_index: 0,
        outer_index: 0,
        serial_size: None,
        body,
    }
}

/// Export whose table entry claims `serial_size` bytes
pub fn sized_export(name: &str, serial_size: i64, body: Value) -> ExportFixture {
    ExportFixture {
        serial_size: Some(serial_size),
        ..export(name, body)
    }
}

pub fn nested_export(name: &str, outer_index: i32, body: Value) -> ExportFixture {
    ExportFixture {
        outer_index,
        ..export(name, body)
    }
}

/// Import of a whole package (`/Game/Foo`)
pub fn package_import(name: &str) -> ObjectImport {
    ObjectImport {
        class_package: "/Script/CoreUObject".to_string(),
        class_name: "Package".to_string(),
        outer_index: PackageIndex::NULL,
        object_name: name.to_string(),
    }
}

/// Import of an object whose outer is import `outer`
pub fn object_import(class_name: &str, outer: i32, name: &str) -> ObjectImport {
    ObjectImport {
        class_package: "/Script/Engine".to_string(),
        class_name: class_name.to_string(),
        outer_index: PackageIndex(outer),
        object_name: name.to_string(),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Bodies in a `.uexp` companion
    Split,
    /// Bodies after the table area of the primary
    Inline,
}

pub struct CookedPackage {
    pub primary: Vec<u8>,
    pub exports: Option<Vec<u8>>,
}

pub fn cook(imports: Vec<ObjectImport>, exports: Vec<ExportFixture>, layout: Layout) -> CookedPackage {
    let mut bodies = Vec::new();
    let mut records = Vec::new();
    for fixture in &exports {
        let body = serde_json::to_vec(&fixture.body).unwrap();
        records.push(json!({
            "object_name": fixture.name,
            "class_index": fixture.class_index,
            "outer_index": fixture.outer_index,
            "serial_offset": (TABLE_AREA + bodies.len()) as i64,
            "serial_size": fixture.serial_size.unwrap_or(body.len() as i64),
        }));
        bodies.extend_from_slice(&body);
    }

    let tables = json!({
        "names": exports.iter().map(|e| e.name.clone()).collect::<Vec<_>>(),
        "imports": imports,
        "exports": records,
    });
    let mut primary = serde_json::to_vec(&tables).unwrap();
    assert!(primary.len() <= TABLE_AREA, "fixture tables too large");
    primary.resize(TABLE_AREA, b' ');

    match layout {
        Layout::Split => CookedPackage {
            primary,
            exports: Some(bodies),
        },
        Layout::Inline => {
            primary.extend_from_slice(&bodies);
            CookedPackage {
                primary,
                exports: None,
            }
        }
    }
}

/// Write `stem.uasset` (and `stem.uexp`) under `root`
pub fn write_cooked(root: &Path, stem: &str, package: &CookedPackage) {
    write_file(root, &format!("{}.uasset", stem), &package.primary);
    if let Some(exports) = &package.exports {
        write_file(root, &format!("{}.uexp", stem), exports);
    }
}

pub fn write_file(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

// Little-endian writers shared by the pak and locres fixtures

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_i64(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_fstring(buf: &mut Vec<u8>, value: &str) {
    if value.is_empty() {
        put_i32(buf, 0);
        return;
    }
    put_i32(buf, value.len() as i32 + 1);
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

/// Version 3 pak archive with stored (uncompressed) entries
pub fn build_pak(mount_point: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    fn entry_record(offset: i64, size: i64) -> Vec<u8> {
        let mut record = Vec::new();
        put_i64(&mut record, offset);
        put_i64(&mut record, size);
        put_i64(&mut record, size);
        put_u32(&mut record, 0);
        record.extend_from_slice(&[0u8; 20]);
        record.push(0);
        put_u32(&mut record, 0);
        record
    }

    let mut out = Vec::new();
    let mut records = Vec::new();
    for (name, data) in files {
        let offset = out.len() as i64;
        out.extend_from_slice(&entry_record(0, data.len() as i64));
        out.extend_from_slice(data);
        records.push((name.to_string(), entry_record(offset, data.len() as i64)));
    }

    let index_offset = out.len() as i64;
    let mut index = Vec::new();
    put_fstring(&mut index, mount_point);
    put_i32(&mut index, records.len() as i32);
    for (name, record) in &records {
        put_fstring(&mut index, name);
        index.extend_from_slice(record);
    }
    out.extend_from_slice(&index);

    put_u32(&mut out, 0x5A6F_12E1);
    put_u32(&mut out, 3);
    put_i64(&mut out, index_offset);
    put_i64(&mut out, index.len() as i64);
    out.extend_from_slice(&[0u8; 20]);
    out
}

/// Legacy (unversioned) locale resource
pub fn build_locres(namespaces: &[(&str, Vec<(&str, &str)>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_u32(&mut buf, namespaces.len() as u32);
    for (namespace, keys) in namespaces {
        put_fstring(&mut buf, namespace);
        put_u32(&mut buf, keys.len() as u32);
        for &(key, value) in keys {
            put_fstring(&mut buf, key);
            put_u32(&mut buf, 0);
            put_fstring(&mut buf, value);
        }
    }
    buf
}
