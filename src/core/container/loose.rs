//! Loose cooked files on disk

use super::Container;
use crate::error::{ProviderError, Result};
use crate::file::GameFile;
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// A directory tree whose files are mounted as-is
///
/// Canonical paths are relative to the root with `/` separators, so mounting
/// the directory that contains `MyGame/` yields `MyGame/Content/...` keys.
#[derive(Debug, Clone)]
pub struct LooseDirectory {
    root: PathBuf,
}

impl LooseDirectory {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ProviderError::NotFound(root.display().to_string()));
        }
        Ok(LooseDirectory { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Container for LooseDirectory {
    fn name(&self) -> String {
        self.root.display().to_string()
    }

    fn entries(&self) -> Result<Vec<GameFile>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %self.root.display(), error = %err, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(relative) => forward_slash(relative),
                Err(_) => continue,
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

            files.push(GameFile::loose(relative, entry.path(), size));
        }

        Ok(files)
    }
}

fn forward_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
