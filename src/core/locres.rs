//! Localization resource files (`.locres`)
//!
//! ```text
//! [magic guid (16)][version (1)]          absent in legacy files
//! [string array offset (i64)]             compact and later
//! [entry count (u32)]                     optimized and later
//! [namespace count (u32)]
//!   [namespace hash (u32)]                optimized and later
//!   [namespace (FString)][key count (u32)]
//!     [key hash (u32)]                    optimized and later
//!     [key (FString)][source hash (u32)]
//!     [string index (i32)]                compact and later
//!     [localized string (FString)]        legacy only
//! [string count (i32)]                    at string array offset
//!   [string (FString)][ref count (i32)]   ref count optimized and later
//! ```

use crate::binary::{invalid_data, ByteReader};
use std::collections::BTreeMap;
use std::io::{self, Read, Seek};

/// Magic GUID opening every non-legacy locres file
pub const LOCRES_MAGIC: [u32; 4] = [0x7574_140E, 0xFC03_4A67, 0x9D90_154A, 0x1B7F_37C3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LocresVersion {
    Legacy = 0,
    Compact = 1,
    OptimizedCrc32 = 2,
    OptimizedCityHash64Utf16 = 3,
}

impl LocresVersion {
    fn from_u8(value: u8) -> io::Result<Self> {
        match value {
            0 => Ok(LocresVersion::Legacy),
            1 => Ok(LocresVersion::Compact),
            2 => Ok(LocresVersion::OptimizedCrc32),
            3 => Ok(LocresVersion::OptimizedCityHash64Utf16),
            other => Err(invalid_data(format!("unknown locres version {}", other))),
        }
    }
}

/// One localized entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocresEntry {
    pub localized: String,
    pub source_hash: u32,
}

/// Parsed contents: namespace -> key -> entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locres {
    pub version: Option<LocresVersion>,
    pub namespaces: BTreeMap<String, BTreeMap<String, LocresEntry>>,
}

impl Locres {
    /// Total number of (namespace, key) pairs
    pub fn entry_count(&self) -> usize {
        self.namespaces.values().map(|keys| keys.len()).sum()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .map(|entry| entry.localized.as_str())
    }

    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        Self::read(&mut io::Cursor::new(bytes))
    }

    pub fn read<R: Read + Seek>(reader: &mut R) -> io::Result<Self> {
        let mut r = ByteReader::new(reader);

        let start = r.position()?;
        let magic: [u8; 16] = match r.read_array() {
            Ok(magic) => magic,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => [0; 16],
            Err(e) => return Err(e),
        };

        let version = if magic_matches(&magic) {
            LocresVersion::from_u8(r.read_u8()?)?
        } else {
            r.seek_to(start)?;
            LocresVersion::Legacy
        };

        let mut locres = Locres {
            version: Some(version),
            namespaces: BTreeMap::new(),
        };

        if version == LocresVersion::Legacy {
            read_legacy(&mut r, &mut locres)?;
        } else {
            read_compact(&mut r, version, &mut locres)?;
        }
        Ok(locres)
    }
}

fn magic_matches(bytes: &[u8; 16]) -> bool {
    bytes
        .chunks_exact(4)
        .zip(LOCRES_MAGIC.iter())
        .all(|(chunk, word)| chunk == word.to_le_bytes())
}

fn read_legacy<R: Read + Seek>(r: &mut ByteReader<R>, locres: &mut Locres) -> io::Result<()> {
    let namespace_count = r.read_u32()?;
    for _ in 0..namespace_count {
        let namespace = r.read_fstring()?;
        let key_count = r.read_u32()?;
        let keys = locres.namespaces.entry(namespace).or_default();
        for _ in 0..key_count {
            let key = r.read_fstring()?;
            let source_hash = r.read_u32()?;
            let localized = r.read_fstring()?;
            keys.insert(
                key,
                LocresEntry {
                    localized,
                    source_hash,
                },
            );
        }
    }
    Ok(())
}

fn read_compact<R: Read + Seek>(
    r: &mut ByteReader<R>,
    version: LocresVersion,
    locres: &mut Locres,
) -> io::Result<()> {
    let optimized = version >= LocresVersion::OptimizedCrc32;

    let strings_offset = r.read_i64()?;
    let strings_offset =
        u64::try_from(strings_offset).map_err(|_| invalid_data("negative string array offset"))?;

    // Read the string array first, then come back for the namespaces
    let body = r.position()?;
    r.seek_to(strings_offset)?;
    let string_count = r.read_count()?;
    let mut strings = Vec::with_capacity(string_count.min(1 << 16));
    for _ in 0..string_count {
        strings.push(r.read_fstring()?);
        if optimized {
            r.read_i32()?; // ref count
        }
    }
    r.seek_to(body)?;

    if optimized {
        r.read_u32()?; // entry count
    }

    let namespace_count = r.read_u32()?;
    for _ in 0..namespace_count {
        if optimized {
            r.read_u32()?; // namespace hash
        }
        let namespace = r.read_fstring()?;
        let key_count = r.read_u32()?;
        let keys = locres.namespaces.entry(namespace).or_default();

        for _ in 0..key_count {
            if optimized {
                r.read_u32()?; // key hash
            }
            let key = r.read_fstring()?;
            let source_hash = r.read_u32()?;
            let string_index = r.read_i32()?;
            let localized = usize::try_from(string_index)
                .ok()
                .and_then(|i| strings.get(i))
                .cloned()
                .ok_or_else(|| invalid_data(format!("string index {} out of range", string_index)))?;
            keys.insert(
                key,
                LocresEntry {
                    localized,
                    source_hash,
                },
            );
        }
    }
    Ok(())
}
