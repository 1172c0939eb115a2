//! Virtual namespace index
//!
//! Maps canonical paths (case-folded when insensitive) to descriptors and keeps
//! a reverse lookup from companion payloads to the stem of their primary file.
//! Every mutation happens under one write lock, so readers never observe a
//! half-applied mount.

use crate::file::GameFile;
use crate::path::CaseMode;
use ahash::AHashMap;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::BTreeSet;

#[derive(Default)]
struct IndexState {
    files: AHashMap<String, GameFile>,
    /// folded payload path -> folded primary stem
    payload_owner: AHashMap<String, String>,
    /// folded primary stem -> folded payload paths
    payloads: AHashMap<String, BTreeSet<String>>,
}

impl IndexState {
    fn insert(&mut self, key: String, file: GameFile) {
        if file.is_payload() {
            let stem = payload_stem(&key, file.extension()).to_string();
            self.payloads
                .entry(stem.clone())
                .or_default()
                .insert(key.clone());
            self.payload_owner.insert(key.clone(), stem);
        }
        self.files.insert(key, file);
    }
}

/// Case-configurable path index over every mounted container
pub struct FileIndex {
    case: CaseMode,
    state: RwLock<IndexState>,
}

impl FileIndex {
    pub fn new(case: CaseMode) -> Self {
        FileIndex {
            case,
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn case(&self) -> CaseMode {
        self.case
    }

    /// Fold a canonical path into an index key
    pub fn key(&self, path: &str) -> String {
        self.case.fold(path)
    }

    /// Insert a batch atomically; later descriptors replace earlier ones
    pub fn insert_batch(&self, files: Vec<GameFile>) -> usize {
        let count = files.len();
        let mut state = self.state.write();
        state.files.reserve(count);
        for file in files {
            let key = self.case.fold(file.path());
            state.insert(key, file);
        }
        count
    }

    pub fn get(&self, path: &str) -> Option<GameFile> {
        let key = self.case.fold(path);
        self.state.read().files.get(&key).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        let key = self.case.fold(path);
        self.state.read().files.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.state.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.state.read().files.keys().cloned().collect();
        paths.sort_unstable();
        paths
    }

    /// Point-in-time copy of the index, sorted by key
    pub fn snapshot(&self) -> Vec<(String, GameFile)> {
        let mut entries: Vec<(String, GameFile)> = self
            .state
            .read()
            .files
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// First entry in key order satisfying `pred`
    pub fn find_first<F>(&self, mut pred: F) -> Option<(String, GameFile)>
    where
        F: FnMut(&str, &GameFile) -> bool,
    {
        let state = self.state.read();
        let mut best: Option<(&String, &GameFile)> = None;
        for (key, file) in state.files.iter() {
            if best.map_or(true, |(k, _)| key < k) && pred(key, file) {
                best = Some((key, file));
            }
        }
        best.map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Entries whose key matches `pattern`, sorted by key
    pub fn filter(&self, pattern: &Regex) -> Vec<(String, GameFile)> {
        let mut matches: Vec<(String, GameFile)> = self
            .state
            .read()
            .files
            .iter()
            .filter(|(k, _)| pattern.is_match(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        matches.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        matches
    }

    /// Stem of the primary file a payload belongs to
    pub fn payload_owner(&self, payload_path: &str) -> Option<String> {
        let key = self.case.fold(payload_path);
        self.state.read().payload_owner.get(&key).cloned()
    }

    /// Payload descriptors registered under a primary stem, sorted by key
    pub fn payloads_of(&self, stem: &str) -> Vec<(String, GameFile)> {
        let key = self.case.fold(stem);
        let state = self.state.read();
        let Some(paths) = state.payloads.get(&key) else {
            return Vec::new();
        };
        paths
            .iter()
            .filter_map(|p| state.files.get(p).map(|f| (p.clone(), f.clone())))
            .collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = IndexState::default();
    }
}

/// Strip a payload's extension and any `.N` cook-index suffix
pub(crate) fn payload_stem<'a>(key: &'a str, extension: &str) -> &'a str {
    let stem = &key[..key.len() - extension.len() - 1];
    match stem.rsplit_once('.') {
        Some((base, index))
            if !index.is_empty()
                && index.bytes().all(|b| b.is_ascii_digit())
                && !base.ends_with('/') =>
        {
            base
        }
        _ => stem,
    }
}
