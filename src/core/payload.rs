//! Companion payload discovery
//!
//! A cooked package `Hero.uasset` may be accompanied by `Hero.uexp` (export
//! data), `Hero.ubulk` (bulk data) and `Hero.uptnl` (optional bulk data).
//! Bulk data can also be segmented by cook index: `Hero.1.ubulk`,
//! `Hero.2.ubulk`, ... in which case the lowest index is the entry point.

use crate::file::GameFile;
use crate::index::FileIndex;

pub const EXPORTS_EXTENSION: &str = "uexp";
pub const BULK_EXTENSION: &str = "ubulk";
pub const OPTIONAL_BULK_EXTENSION: &str = "uptnl";

/// Companions of one primary package file
#[derive(Debug, Clone, Default)]
pub struct Payloads {
    pub exports: Option<GameFile>,
    pub bulk: Option<GameFile>,
    pub optional_bulk: Option<GameFile>,
}

impl Payloads {
    pub fn is_empty(&self) -> bool {
        self.exports.is_none() && self.bulk.is_none() && self.optional_bulk.is_none()
    }
}

/// Look up the companions of `primary` through the index's reverse lookup
pub fn find_payloads(index: &FileIndex, primary: &GameFile) -> Payloads {
    let stem = primary.path_without_extension();
    let mut payloads = Payloads::default();
    let mut segmented_bulk: Option<(u32, GameFile)> = None;

    for (key, file) in index.payloads_of(stem) {
        let ext = file.extension();
        let slot = if ext.eq_ignore_ascii_case(EXPORTS_EXTENSION) {
            &mut payloads.exports
        } else if ext.eq_ignore_ascii_case(OPTIONAL_BULK_EXTENSION) {
            &mut payloads.optional_bulk
        } else if ext.eq_ignore_ascii_case(BULK_EXTENSION) {
            match cook_index(&key, ext) {
                None => &mut payloads.bulk,
                Some(n) => {
                    if segmented_bulk.as_ref().map_or(true, |(best, _)| n < *best) {
                        segmented_bulk = Some((n, file));
                    }
                    continue;
                }
            }
        } else {
            continue;
        };

        // Plain names beat segmented ones for exports and optional bulk
        if slot.is_none() || cook_index(&key, ext).is_none() {
            *slot = Some(file);
        }
    }

    if payloads.bulk.is_none() {
        payloads.bulk = segmented_bulk.map(|(_, file)| file);
    }
    payloads
}

/// `stem.<n>.ext` -> `n`
fn cook_index(key: &str, extension: &str) -> Option<u32> {
    let stem = &key[..key.len().checked_sub(extension.len() + 1)?];
    let (_, index) = stem.rsplit_once('.')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::CaseMode;

    fn index_of(paths: &[&str]) -> FileIndex {
        let index = FileIndex::new(CaseMode::Insensitive);
        index.insert_batch(
            paths
                .iter()
                .map(|p| GameFile::loose(*p, "/nonexistent", 0))
                .collect(),
        );
        index
    }

    #[test]
    fn test_all_companions() {
        let index = index_of(&[
            "G/Content/Hero.uasset",
            "G/Content/Hero.uexp",
            "G/Content/Hero.ubulk",
            "G/Content/Hero.uptnl",
            "G/Content/HeroB.uexp",
        ]);
        let primary = index.get("G/Content/Hero.uasset").unwrap();
        let payloads = find_payloads(&index, &primary);

        assert_eq!(payloads.exports.unwrap().path(), "G/Content/Hero.uexp");
        assert_eq!(payloads.bulk.unwrap().path(), "G/Content/Hero.ubulk");
        assert_eq!(payloads.optional_bulk.unwrap().path(), "G/Content/Hero.uptnl");
    }

    #[test]
    fn test_segmented_bulk_lowest_index() {
        let index = index_of(&[
            "G/Content/Hero.uasset",
            "G/Content/Hero.3.ubulk",
            "G/Content/Hero.10.ubulk",
            "G/Content/Hero.1.ubulk",
        ]);
        let primary = index.get("G/Content/Hero.uasset").unwrap();
        let payloads = find_payloads(&index, &primary);

        assert!(payloads.exports.is_none());
        assert_eq!(payloads.bulk.unwrap().path(), "G/Content/Hero.1.ubulk");
    }

    #[test]
    fn test_plain_bulk_preferred() {
        let index = index_of(&[
            "G/Content/Hero.umap",
            "G/Content/Hero.0.ubulk",
            "G/Content/Hero.ubulk",
        ]);
        let primary = index.get("G/Content/Hero.umap").unwrap();
        assert_eq!(
            find_payloads(&index, &primary).bulk.unwrap().path(),
            "G/Content/Hero.ubulk"
        );
    }

    #[test]
    fn test_no_companions() {
        let index = index_of(&["G/Content/Lonely.uasset"]);
        let primary = index.get("G/Content/Lonely.uasset").unwrap();
        assert!(find_payloads(&index, &primary).is_empty());
    }
}
