//! Canonical path rewriting
//!
//! User input arrives in many shapes: `/Game/Characters/Hero`,
//! `Game\Characters\Hero.Hero`, `MyGame/Content/Characters/Hero.uasset`,
//! `ShooterCore/Maps/L_Expanse`. [`PathNormalizer`] turns all of them into
//! the key the namespace index is built on. It performs no I/O: the project
//! name and the mount table are inputs.

use crate::mount::VirtualPaths;

/// Extension appended to extension-less input paths
pub const DEFAULT_PACKAGE_EXTENSION: &str = "uasset";

/// Project whose unknown roots are game-feature plugins
pub const GAME_FEATURE_PROJECT: &str = "FortniteGame";

const GAME_ALIAS: &str = "Game";
const ENGINE_ALIAS: &str = "Engine";

/// Second-level segments that already make a path root-relative
const ROOT_RELATIVE_SEGMENTS: [&str; 3] = ["Config", "Content", "Plugins"];

/// How canonical paths compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseMode {
    Sensitive,
    Insensitive,
}

impl CaseMode {
    pub fn from_insensitive(insensitive: bool) -> Self {
        if insensitive {
            CaseMode::Insensitive
        } else {
            CaseMode::Sensitive
        }
    }

    pub fn is_insensitive(self) -> bool {
        self == CaseMode::Insensitive
    }

    /// Compare two path segments under this mode
    pub fn segment_eq(self, a: &str, b: &str) -> bool {
        match self {
            CaseMode::Sensitive => a == b,
            CaseMode::Insensitive => a.eq_ignore_ascii_case(b),
        }
    }

    /// Fold a key for index lookups
    pub fn fold(self, path: &str) -> String {
        match self {
            CaseMode::Sensitive => path.to_string(),
            CaseMode::Insensitive => path.to_lowercase(),
        }
    }
}

/// Rewrites arbitrary input paths into canonical namespace paths
#[derive(Debug, Clone, Copy)]
pub struct PathNormalizer<'a> {
    project_name: &'a str,
    virtual_paths: &'a VirtualPaths,
    case: CaseMode,
}

impl<'a> PathNormalizer<'a> {
    pub fn new(project_name: &'a str, virtual_paths: &'a VirtualPaths, case: CaseMode) -> Self {
        PathNormalizer {
            project_name,
            virtual_paths,
            case,
        }
    }

    /// Normalize `path` into its canonical form
    ///
    /// # Examples
    ///
    /// ```
    /// use pakvfs::{CaseMode, PathNormalizer, VirtualPaths};
    ///
    /// let mounts = VirtualPaths::new();
    /// let normalizer = PathNormalizer::new("MyGame", &mounts, CaseMode::Insensitive);
    /// assert_eq!(
    ///     normalizer.normalize("Game/Characters/Hero"),
    ///     "mygame/content/characters/hero.uasset"
    /// );
    /// ```
    pub fn normalize(&self, path: &str) -> String {
        let mut path = path.replace('\\', "/");
        if path.starts_with('/') {
            path.remove(0);
        }
        if path.is_empty() {
            return path;
        }

        // "Hero.Hero" is the object-path form of "Hero"
        let (dir, last) = split_last_segment(&path);
        if let Some((before, after)) = last.split_once('.') {
            if before == after {
                path = format!("{}{}", dir, before);
            }
        }

        let (_, last) = split_last_segment(&path);
        if !path.ends_with('/') && !last.contains('.') {
            path.push('.');
            path.push_str(DEFAULT_PACKAGE_EXTENSION);
        }

        let rewritten = match path.split_once('/') {
            Some((root, tail)) => self.rewrite_root(root, tail),
            None => None,
        };

        self.case.fold(rewritten.as_deref().unwrap_or(&path))
    }

    fn rewrite_root(&self, root: &str, tail: &str) -> Option<String> {
        if self.case.segment_eq(root, GAME_ALIAS) || self.case.segment_eq(root, ENGINE_ALIAS) {
            let target = if self.case.segment_eq(root, ENGINE_ALIAS) {
                ENGINE_ALIAS
            } else {
                self.project_name
            };
            let second = tail.split('/').next().unwrap_or("");
            let root_relative = ROOT_RELATIVE_SEGMENTS
                .iter()
                .any(|segment| self.case.segment_eq(second, segment));

            return Some(if root_relative {
                format!("{}/{}", target, tail)
            } else {
                format!("{}/Content/{}", target, tail)
            });
        }

        if root.eq_ignore_ascii_case(self.project_name) {
            return None;
        }

        if let Some(target) = self.virtual_paths.get(root) {
            return Some(format!("{}/Content/{}", target, tail));
        }

        if self.project_name.eq_ignore_ascii_case(GAME_FEATURE_PROJECT) {
            return Some(format!(
                "{}/Plugins/GameFeatures/{}/Content/{}",
                self.project_name, root, tail
            ));
        }

        None
    }
}

/// Split into (directory including trailing separator, last segment)
fn split_last_segment(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    }
}
