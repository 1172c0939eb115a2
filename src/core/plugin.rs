//! Plugin descriptors (`.uplugin`) and cooked plugin manifests (`.upluginmanifest`)

use crate::error::Result;
use serde::{Deserialize, Serialize};

pub const PLUGIN_EXTENSION: &str = "uplugin";
pub const PLUGIN_MANIFEST_EXTENSION: &str = "upluginmanifest";

/// Relative prefix manifests put in front of plugin paths
pub const MANIFEST_RELATIVE_PREFIX: &str = "../../../";

/// The subset of a `.uplugin` document discovery cares about
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginDescriptor {
    #[serde(rename = "CanContainContent")]
    pub can_contain_content: bool,

    #[serde(rename = "FriendlyName", skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    #[serde(rename = "VersionName", skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,

    #[serde(rename = "EnabledByDefault", skip_serializing_if = "Option::is_none")]
    pub enabled_by_default: Option<bool>,
}

impl PluginDescriptor {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(strip_bom(bytes))?)
    }
}

/// One plugin listed in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifestEntry {
    #[serde(rename = "File")]
    pub file: String,

    #[serde(rename = "Descriptor")]
    pub descriptor: PluginDescriptor,
}

impl PluginManifestEntry {
    /// Mount name: the descriptor file name without extension
    pub fn mount_name(&self) -> &str {
        let name = self.file.rsplit('/').next().unwrap_or(&self.file);
        name.rsplit_once('.').map_or(name, |(stem, _)| stem)
    }

    /// Plugin root in the namespace (relative prefix removed)
    pub fn mount_target(&self) -> String {
        let path = self.file.replace(MANIFEST_RELATIVE_PREFIX, "");
        match path.rfind('/') {
            Some(idx) => path[..idx].to_string(),
            None => path,
        }
    }
}

/// Cooked list of every plugin of a project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(rename = "Contents", default)]
    pub contents: Vec<PluginManifestEntry>,
}

impl PluginManifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(strip_bom(bytes))?)
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// Cooked JSON frequently carries a UTF-8 byte order mark
fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}
