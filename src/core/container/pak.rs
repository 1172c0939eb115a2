//! Legacy pak archives (versions 1 through 9)
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ [entry header][payload]  (per entry)     │
//! ├──────────────────────────────────────────┤
//! │ Index                                    │
//! │  - mount point (FString)                 │
//! │  - entry count (i32)                     │
//! │  - per entry: file name + entry record   │
//! ├──────────────────────────────────────────┤
//! │ Footer                                   │
//! │  - [v7+] encryption key guid (16)        │
//! │  - [v4+] encrypted index flag (1)        │
//! │  - magic 0x5A6F12E1, version             │
//! │  - index offset, index size, index hash  │
//! │  - [v9] frozen index flag (1)            │
//! │  - [v8+] compression method names (32n)  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Only stored (uncompressed, unencrypted) entries can be opened; the rest
//! are still listed so the namespace stays complete.

use super::Container;
use crate::binary::ByteReader;
use crate::error::{ProviderError, Result};
use crate::file::{ArchiveReader, CompressionMethod, FileSource, GameFile};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const PAK_MAGIC: u32 = 0x5A6F_12E1;

pub const PAK_VERSION_INITIAL: u32 = 1;
pub const PAK_VERSION_NO_TIMESTAMPS: u32 = 2;
pub const PAK_VERSION_COMPRESSION_ENCRYPTION: u32 = 3;
pub const PAK_VERSION_INDEX_ENCRYPTION: u32 = 4;
pub const PAK_VERSION_ENCRYPTION_KEY_GUID: u32 = 7;
pub const PAK_VERSION_FNAME_BASED_COMPRESSION: u32 = 8;
pub const PAK_VERSION_FROZEN_INDEX: u32 = 9;
pub const PAK_VERSION_PATH_HASH_INDEX: u32 = 10;

const SHA1_SIZE: u64 = 20;
const COMPRESSION_NAME_LEN: usize = 32;
const MOUNT_POINT_PREFIX: &str = "../../../";

/// Legacy compression flags used before method names were stored
const LEGACY_COMPRESSION_NAMES: [(u32, &str); 3] = [(0x01, "Zlib"), (0x02, "Gzip"), (0x04, "Custom")];

/// (footer length, magic offset within footer, accepted versions)
const FOOTER_LAYOUTS: [(usize, usize, std::ops::RangeInclusive<u32>); 6] = [
    (44, 0, 1..=3),
    (45, 1, 4..=6),
    (61, 17, 7..=7),
    (189, 17, 8..=8),
    (221, 17, 8..=u32::MAX),
    (222, 17, 9..=9),
];

const MAX_FOOTER_LEN: usize = 222;

/// Parsed pak footer
#[derive(Debug, Clone)]
pub struct PakInfo {
    pub version: u32,
    pub index_offset: u64,
    pub index_size: u64,
    pub encrypted_index: bool,
    /// Compression method names, index 0 is always "None"
    pub compression_methods: Vec<String>,
}

/// One entry of the pak index
#[derive(Debug, Clone)]
pub struct PakEntry {
    /// Canonical path (mount point applied)
    pub path: String,
    /// Offset of the serialized entry header preceding the payload
    pub offset: u64,
    pub size: u64,
    pub uncompressed_size: u64,
    /// Method index (v8+) or legacy method flags
    pub compression: u32,
    pub encrypted: bool,
    /// Length of the serialized entry header in front of the payload
    pub header_size: u64,
}

impl PakEntry {
    pub fn data_offset(&self) -> u64 {
        self.offset.saturating_add(self.header_size)
    }

    /// End of the payload, or `None` if it does not fit in a `u64`
    pub fn data_end(&self) -> Option<u64> {
        self.offset.checked_add(self.header_size)?.checked_add(self.size)
    }
}

struct PakInner {
    path: PathBuf,
    info: PakInfo,
    mount_point: String,
    entries: Vec<Arc<PakEntry>>,
}

/// An opened pak archive (cheap to clone)
#[derive(Clone)]
pub struct PakArchive {
    inner: Arc<PakInner>,
}

impl PakArchive {
    /// Open a pak file and parse its footer and index
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pak_name = path.display().to_string();
        let mut file = File::open(&path)?;
        let len = file.seek(SeekFrom::End(0))?;

        let info = read_info(&mut file, len).map_err(|e| ProviderError::malformed(&pak_name, e))?;

        if info.encrypted_index {
            return Err(ProviderError::malformed(&pak_name, "index is encrypted"));
        }
        if info.index_offset.saturating_add(info.index_size) > len {
            return Err(ProviderError::malformed(&pak_name, "index lies outside the archive"));
        }

        file.seek(SeekFrom::Start(info.index_offset))?;
        let mut index = vec![0u8; info.index_size as usize];
        file.read_exact(&mut index)?;

        let (mount_point, entries) = read_index(&index, info.version)
            .map_err(|e| ProviderError::malformed(&pak_name, e.to_string()))?;

        if let Some(entry) = entries.iter().find(|e| e.data_end().map_or(true, |end| end > len)) {
            return Err(ProviderError::malformed(
                &pak_name,
                format!("entry {} lies outside the archive", entry.path),
            ));
        }

        debug!(
            pak = %pak_name,
            version = info.version,
            entries = entries.len(),
            "Opened pak archive"
        );

        Ok(PakArchive {
            inner: Arc::new(PakInner {
                path,
                info,
                mount_point,
                entries: entries.into_iter().map(Arc::new).collect(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn info(&self) -> &PakInfo {
        &self.inner.info
    }

    /// Mount point as stored in the index
    pub fn mount_point(&self) -> &str {
        &self.inner.mount_point
    }

    /// Raw index records in index order
    pub fn records(&self) -> &[Arc<PakEntry>] {
        &self.inner.entries
    }

    pub fn compression_method(&self, entry: &PakEntry) -> CompressionMethod {
        if entry.compression == 0 {
            return CompressionMethod::None;
        }

        if self.inner.info.version >= PAK_VERSION_FNAME_BASED_COMPRESSION {
            let name = self
                .inner
                .info
                .compression_methods
                .get(entry.compression as usize)
                .cloned()
                .unwrap_or_else(|| format!("Unknown({})", entry.compression));
            return CompressionMethod::Named(name);
        }

        let name = LEGACY_COMPRESSION_NAMES
            .iter()
            .find(|(flag, _)| entry.compression & flag != 0)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("Unknown({})", entry.compression));
        CompressionMethod::Named(name)
    }

    /// Open a bounded reader over a stored entry
    pub fn open_entry(&self, entry: &PakEntry) -> Result<ArchiveReader> {
        self.check_readable(entry)?;
        let file = BufReader::new(File::open(&self.inner.path)?);
        let reader = EntryReader::new(file, entry.data_offset(), entry.size)?;
        Ok(Box::new(reader))
    }

    /// Read a stored entry fully
    pub fn read_entry(&self, entry: &PakEntry) -> Result<Vec<u8>> {
        self.check_readable(entry)?;
        let mut file = File::open(&self.inner.path)?;
        file.seek(SeekFrom::Start(entry.data_offset()))?;
        let mut data = Vec::new();
        file.take(entry.size).read_to_end(&mut data)?;
        if (data.len() as u64) < entry.size {
            return Err(ProviderError::malformed(
                self.inner.path.display().to_string(),
                format!("entry {} is truncated", entry.path),
            ));
        }
        Ok(data)
    }

    fn check_readable(&self, entry: &PakEntry) -> Result<()> {
        if entry.encrypted {
            return Err(ProviderError::Encrypted(entry.path.clone()));
        }
        if entry.compression != 0 {
            return Err(ProviderError::UnsupportedCompression {
                path: entry.path.clone(),
                method: entry.compression,
            });
        }
        Ok(())
    }
}

impl Container for PakArchive {
    fn name(&self) -> String {
        self.inner.path.display().to_string()
    }

    fn entries(&self) -> Result<Vec<GameFile>> {
        Ok(self
            .inner
            .entries
            .iter()
            .map(|entry| {
                GameFile::new(
                    entry.path.clone(),
                    entry.uncompressed_size,
                    FileSource::Pak {
                        archive: self.clone(),
                        entry: Arc::clone(entry),
                    },
                )
            })
            .collect())
    }
}

fn read_info<R: Read + Seek>(file: &mut R, len: u64) -> std::result::Result<PakInfo, String> {
    let footer_len = (len as usize).min(MAX_FOOTER_LEN);
    file.seek(SeekFrom::Start(len - footer_len as u64))
        .map_err(|e| e.to_string())?;
    let mut tail = vec![0u8; footer_len];
    file.read_exact(&mut tail).map_err(|e| e.to_string())?;

    for (size, magic_at, versions) in FOOTER_LAYOUTS.iter() {
        if *size > tail.len() {
            continue;
        }
        let footer = &tail[tail.len() - size..];
        let magic = u32::from_le_bytes(footer[*magic_at..*magic_at + 4].try_into().unwrap_or_default());
        if magic != PAK_MAGIC {
            continue;
        }

        let mut reader = ByteReader::new(Cursor::new(&footer[*magic_at + 4..]));
        let version = reader.read_u32().map_err(|e| e.to_string())?;
        if !versions.contains(&version) {
            continue;
        }
        if version >= PAK_VERSION_PATH_HASH_INDEX {
            return Err(format!("pak version {} (path hash index) is not supported", version));
        }

        let index_offset = reader.read_i64().map_err(|e| e.to_string())?;
        let index_size = reader.read_i64().map_err(|e| e.to_string())?;
        if index_offset < 0 || index_size < 0 {
            return Err("negative index bounds".to_string());
        }

        let encrypted_index = *magic_at > 0 && footer[*magic_at - 1] != 0;

        let mut compression_methods = vec!["None".to_string()];
        if version >= PAK_VERSION_FNAME_BASED_COMPRESSION {
            let mut names_at = *magic_at + 4 + 4 + 8 + 8 + SHA1_SIZE as usize;
            if version == PAK_VERSION_FROZEN_INDEX {
                names_at += 1;
            }
            for slot in footer[names_at..].chunks_exact(COMPRESSION_NAME_LEN) {
                let name: String = slot
                    .iter()
                    .take_while(|&&b| b != 0)
                    .map(|&b| char::from(b))
                    .collect();
                if !name.is_empty() {
                    compression_methods.push(name);
                }
            }
        }

        return Ok(PakInfo {
            version,
            index_offset: index_offset as u64,
            index_size: index_size as u64,
            encrypted_index,
            compression_methods,
        });
    }

    Err("no pak footer found".to_string())
}

fn read_index(index: &[u8], version: u32) -> io::Result<(String, Vec<PakEntry>)> {
    let mut reader = ByteReader::new(Cursor::new(index));
    let mount_point = reader.read_fstring()?;
    let prefix = canonical_mount_point(&mount_point);
    let count = reader.read_count()?;

    let mut entries = Vec::with_capacity(count.min(index.len() / 8));
    for _ in 0..count {
        let name = reader.read_fstring()?;
        let mut entry = read_entry_record(&mut reader, version)?;
        entry.path = format!("{}{}", prefix, name.trim_start_matches('/'));
        entries.push(entry);
    }

    Ok((mount_point, entries))
}

/// Parse one serialized entry record; the same layout precedes each payload
fn read_entry_record<R: Read + Seek>(reader: &mut ByteReader<R>, version: u32) -> io::Result<PakEntry> {
    let start = reader.position()?;

    let offset = read_non_negative(reader)?;
    let size = read_non_negative(reader)?;
    let uncompressed_size = read_non_negative(reader)?;
    let compression = reader.read_u32()?;
    if version == PAK_VERSION_INITIAL {
        reader.skip(8)?; // timestamp
    }
    reader.skip(SHA1_SIZE)?;

    let mut encrypted = false;
    if version >= PAK_VERSION_COMPRESSION_ENCRYPTION {
        if compression != 0 {
            let blocks = reader.read_count()?;
            reader.skip(blocks as u64 * 16)?;
        }
        encrypted = reader.read_u8()? & 0x01 != 0;
        reader.skip(4)?; // compression block size
    }

    let header_size = reader.position()? - start;

    Ok(PakEntry {
        path: String::new(),
        offset,
        size,
        uncompressed_size,
        compression,
        encrypted,
        header_size,
    })
}

fn read_non_negative<R: Read>(reader: &mut ByteReader<R>) -> io::Result<u64> {
    let value = reader.read_i64()?;
    u64::try_from(value).map_err(|_| crate::binary::invalid_data("negative offset or size"))
}

/// Turn a stored mount point into a canonical path prefix
fn canonical_mount_point(mount_point: &str) -> String {
    let mut prefix = mount_point.replace('\\', "/");
    while let Some(rest) = prefix.strip_prefix(MOUNT_POINT_PREFIX) {
        prefix = rest.to_string();
    }
    let prefix = prefix.trim_start_matches('/');
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

/// Seekable view over `len` bytes starting at `start`
struct EntryReader<R> {
    inner: R,
    start: u64,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> EntryReader<R> {
    fn new(mut inner: R, start: u64, len: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(start))?;
        Ok(EntryReader {
            inner,
            start,
            len,
            pos: 0,
        })
    }
}

impl<R: Read + Seek> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(remaining as usize);
        let read = self.inner.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for EntryReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(delta) => self.len as i128 + delta as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of entry",
            ));
        }
        let target = target as u64;
        let absolute = self.start.checked_add(target).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek past the addressable range")
        })?;
        self.inner.seek(SeekFrom::Start(absolute))?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::binary::test_support::*;

    /// Build a version 3 pak with stored entries
    pub fn build_pak_v3(mount_point: &str, files: &[(&str, &[u8])], encrypted_index: bool) -> Vec<u8> {
        let mut out = Vec::new();
        let mut records = Vec::new();

        for (name, data) in files {
            let offset = out.len() as i64;
            let record = entry_record(offset, data.len() as i64);
            out.extend_from_slice(&entry_record(0, data.len() as i64));
            out.extend_from_slice(data);
            records.push((name.to_string(), record));
        }

        finish_pak_v3(out, mount_point, &records, encrypted_index)
    }

    /// Append an index of arbitrary `(name, offset, size)` records to `body`
    pub fn build_pak_v3_with_records(mount_point: &str, body: &[u8], records: &[(&str, i64, i64)]) -> Vec<u8> {
        let records: Vec<_> = records
            .iter()
            .map(|(name, offset, size)| (name.to_string(), entry_record(*offset, *size)))
            .collect();
        finish_pak_v3(body.to_vec(), mount_point, &records, false)
    }

    fn finish_pak_v3(
        mut out: Vec<u8>,
        mount_point: &str,
        records: &[(String, Vec<u8>)],
        encrypted_index: bool,
    ) -> Vec<u8> {
        let index_offset = out.len() as i64;
        let mut index = Vec::new();
        put_fstring(&mut index, mount_point);
        put_i32(&mut index, records.len() as i32);
        for (name, record) in records {
            put_fstring(&mut index, name);
            index.extend_from_slice(record);
        }
        out.extend_from_slice(&index);

        // v3 footer has no encryption byte; emulate v4 when one is requested
        if encrypted_index {
            out.push(1);
        }
        put_u32(&mut out, super::PAK_MAGIC);
        put_u32(&mut out, if encrypted_index { 4 } else { 3 });
        put_i64(&mut out, index_offset);
        put_i64(&mut out, index.len() as i64);
        out.extend_from_slice(&[0u8; 20]);
        out
    }

    fn entry_record(offset: i64, size: i64) -> Vec<u8> {
        let mut record = Vec::new();
        put_i64(&mut record, offset);
        put_i64(&mut record, size);
        put_i64(&mut record, size);
        put_u32(&mut record, 0); // stored
        record.extend_from_slice(&[0u8; 20]); // hash
        record.push(0); // flags
        put_u32(&mut record, 0); // block size
        record
    }
}
