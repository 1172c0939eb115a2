//! Localized string aggregation
//!
//! Every `.locres` of one culture under the project is merged into a single
//! namespace -> key -> string table. Rebuilds always start from scratch.

use crate::cancel::CancellationFlag;
use crate::error::{ProviderError, Result};
use crate::index::FileIndex;
use crate::locres::Locres;
use ahash::AHashMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const LOCRES_EXTENSION: &str = "locres";

/// Languages with known culture codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    AustralianEnglish,
    BritishEnglish,
    French,
    German,
    Italian,
    Spanish,
    SpanishLatin,
    SpanishMexico,
    Arabic,
    Japanese,
    Korean,
    Polish,
    Portuguese,
    PortugueseBrazil,
    Russian,
    Turkish,
    Chinese,
    TraditionalChinese,
    Swedish,
    Thai,
    Indonesian,
    VietnameseVietnam,
    Zulu,
}

/// Culture code a project uses for `language`
///
/// Projects name their culture folders differently; unknown projects use the
/// plain ISO codes.
pub fn language_code(project_name: &str, language: Language) -> &'static str {
    use Language::*;

    match project_name.to_lowercase().as_str() {
        "fortnitegame" => match language {
            French => "fr",
            German => "de",
            Italian => "it",
            Spanish => "es",
            SpanishLatin => "es-419",
            Arabic => "ar",
            Japanese => "ja",
            Korean => "ko",
            Polish => "pl",
            PortugueseBrazil => "pt-BR",
            Russian => "ru",
            Turkish => "tr",
            Chinese => "zh-CN",
            TraditionalChinese => "zh-Hant",
            _ => "en",
        },
        "worldexplorers" => match language {
            French => "fr",
            German => "de",
            Italian => "it",
            Spanish => "es",
            Japanese => "ja",
            Korean => "ko",
            PortugueseBrazil => "pt-BR",
            Russian => "ru",
            Chinese => "zh-Hans",
            _ => "en",
        },
        "shootergame" => match language {
            French => "fr-FR",
            German => "de-DE",
            Italian => "it-IT",
            Spanish => "es-ES",
            SpanishMexico => "es-MX",
            Arabic => "ar-AE",
            Japanese => "ja-JP",
            Korean => "ko-KR",
            Polish => "pl-PL",
            PortugueseBrazil => "pt-BR",
            Russian => "ru-RU",
            Turkish => "tr-TR",
            Chinese => "zh-CN",
            TraditionalChinese => "zh-TW",
            Indonesian => "id-ID",
            Thai => "th-TH",
            VietnameseVietnam => "vi-VN",
            _ => "en-US",
        },
        "stateofdecay2" => match language {
            AustralianEnglish => "en-AU",
            French => "fr-FR",
            German => "de-DE",
            Italian => "it-IT",
            SpanishMexico => "es-MX",
            PortugueseBrazil => "pt-BR",
            Russian => "ru-RU",
            Chinese => "zh-CN",
            _ => "en-US",
        },
        "oakgame" => match language {
            French => "fr",
            German => "de",
            Italian => "it",
            Spanish => "es",
            Japanese => "ja",
            Korean => "ko",
            PortugueseBrazil => "pt-BR",
            Russian => "ru",
            Chinese => "zh-Hans-CN",
            TraditionalChinese => "zh-Hant-TW",
            _ => "en",
        },
        "multiversus" => match language {
            French => "fr",
            German => "de",
            Italian => "it",
            Spanish => "es",
            SpanishLatin => "es-419",
            Polish => "pl",
            PortugueseBrazil => "pt-BR",
            Russian => "ru",
            Chinese => "zh-Hans",
            _ => "en",
        },
        _ => match language {
            English => "en",
            AustralianEnglish => "en-AU",
            BritishEnglish => "en-GB",
            French => "fr",
            German => "de",
            Italian => "it",
            Spanish => "es",
            SpanishLatin => "es-419",
            SpanishMexico => "es-MX",
            Arabic => "ar",
            Japanese => "ja",
            Korean => "ko",
            Polish => "pl",
            Portuguese => "pt",
            PortugueseBrazil => "pt-BR",
            Russian => "ru",
            Turkish => "tr",
            Chinese => "zh",
            TraditionalChinese => "zh-Hant",
            Swedish => "sv",
            Thai => "th",
            Indonesian => "id",
            VietnameseVietnam => "vi-VN",
            Zulu => "zu",
        },
    }
}

/// namespace -> key -> localized string
#[derive(Debug, Clone, Default)]
pub struct LocalizationTable {
    namespaces: AHashMap<String, AHashMap<String, String>>,
}

impl LocalizationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .and_then(|keys| keys.get(key))
            .map(String::as_str)
    }

    /// Insert or overwrite one pair
    pub fn insert(&mut self, namespace: &str, key: &str, value: String) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Number of distinct (namespace, key) pairs
    pub fn len(&self) -> usize {
        self.namespaces.values().map(|keys| keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }
}

/// Build a fresh table from every `.locres` of `culture` under the project
///
/// Returns the table and the number of pairs inserted across all files.
/// Unreadable or malformed files are skipped with a warning.
pub fn build_table(
    index: &FileIndex,
    project_name: &str,
    culture: &str,
    cancel: &CancellationFlag,
) -> Result<(LocalizationTable, usize)> {
    let pattern = locale_pattern(project_name, culture)?;
    let mut table = LocalizationTable::new();
    let mut inserted = 0;
    let mut files = 0;

    for (_, file) in index.filter(&pattern) {
        cancel.check()?;

        let locres = match file.read().and_then(|bytes| Ok(Locres::from_bytes(&bytes)?)) {
            Ok(locres) => locres,
            Err(err) => {
                warn!(path = file.path(), error = %err, "Skipping unreadable locale resource");
                continue;
            }
        };
        files += 1;

        for (namespace, keys) in locres.namespaces {
            cancel.check()?;
            for (key, entry) in keys {
                table.insert(&namespace, &key, entry.localized);
                inserted += 1;
            }
        }
    }

    info!(culture, files, entries = inserted, "Rebuilt localization table");
    Ok((table, inserted))
}

fn locale_pattern(project_name: &str, culture: &str) -> Result<Regex> {
    RegexBuilder::new(&format!(
        "^{}/.+/{}/.+\\.{}$",
        regex::escape(project_name),
        regex::escape(culture),
        LOCRES_EXTENSION
    ))
    .case_insensitive(true)
    .build()
    .map_err(|e| ProviderError::InvalidPath(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::GameFile;
    use crate::locres::test_support;
    use crate::path::CaseMode;
    use std::fs;
    use tempfile::TempDir;

    fn locres_file(dir: &TempDir, path: &str, bytes: &[u8]) -> GameFile {
        let actual = dir.path().join(path.replace('/', "_"));
        fs::write(&actual, bytes).unwrap();
        GameFile::loose(path, actual, bytes.len() as u64)
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(language_code("FortniteGame", Language::Chinese), "zh-CN");
        assert_eq!(language_code("ShooterGame", Language::English), "en-US");
        assert_eq!(language_code("MyGame", Language::BritishEnglish), "en-GB");
        assert_eq!(language_code("fortnitegame", Language::Zulu), "en");
    }

    #[test]
    fn test_build_counts_pairs_across_files() {
        let dir = TempDir::new().unwrap();
        let index = FileIndex::new(CaseMode::Insensitive);
        index.insert_batch(vec![
            locres_file(
                &dir,
                "MyGame/Content/Localization/Game/de/Game.locres",
                &test_support::legacy(&[("UI", vec![("A", "1"), ("B", "2"), ("C", "3")])]),
            ),
            locres_file(
                &dir,
                "MyGame/Content/Localization/Engine/de/Engine.locres",
                &test_support::optimized(&[("Core", vec![("D", "4"), ("E", "5")])]),
            ),
            locres_file(
                &dir,
                "MyGame/Content/Localization/Game/fr/Game.locres",
                &test_support::legacy(&[("UI", vec![("A", "un")])]),
            ),
            locres_file(&dir, "MyGame/Content/Localization/Broken/de/Broken.locres", b"\x01"),
        ]);

        let (table, inserted) =
            build_table(&index, "MyGame", "de", &CancellationFlag::new()).unwrap();
        assert_eq!(inserted, 5);
        assert_eq!(table.len(), 5);
        assert_eq!(table.get("UI", "A"), Some("1"));
        assert_eq!(table.get("Core", "E"), Some("5"));
        assert_eq!(table.get("UI", "Z"), None);
    }

    #[test]
    fn test_build_cancelled() {
        let dir = TempDir::new().unwrap();
        let index = FileIndex::new(CaseMode::Insensitive);
        index.insert_batch(vec![locres_file(
            &dir,
            "MyGame/Content/Localization/Game/de/Game.locres",
            &test_support::legacy(&[("UI", vec![("A", "1")])]),
        )]);

        let cancel = CancellationFlag::new();
        cancel.cancel();
        assert!(matches!(
            build_table(&index, "MyGame", "de", &cancel),
            Err(ProviderError::Cancelled)
        ));
    }
}
