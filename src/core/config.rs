//! Provider configuration
//!
//! Loadable from TOML:
//!
//! ```toml
//! case_insensitive = true
//! lazy_serialization = false
//! package_cache_capacity = 64
//! project_name = "MyGame"
//!
//! [version]
//! ue4 = 522
//! ue5 = 1008
//! ```

use crate::error::Result;
use crate::version::PackageFileVersion;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of fully loaded packages kept resident
pub const DEFAULT_PACKAGE_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Fold canonical paths to lower case
    pub case_insensitive: bool,

    /// Object versions of the cooked build
    pub version: PackageFileVersion,

    /// Let the deserializer defer export deserialization until first use
    pub lazy_serialization: bool,

    /// Resident package cache size (clamped to at least 1)
    pub package_cache_capacity: usize,

    /// Explicit project name, bypassing discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            case_insensitive: true,
            version: PackageFileVersion::default(),
            lazy_serialization: true,
            package_cache_capacity: DEFAULT_PACKAGE_CACHE_CAPACITY,
            project_name: None,
        }
    }
}

impl ProviderConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_when_empty() {
        let config = ProviderConfig::from_toml_str("").unwrap();
        assert!(config.case_insensitive);
        assert!(config.lazy_serialization);
        assert_eq!(config.package_cache_capacity, DEFAULT_PACKAGE_CACHE_CAPACITY);
        assert_eq!(config.version, PackageFileVersion::default());
        assert!(config.project_name.is_none());
    }

    #[test]
    fn test_partial_override() {
        let config = ProviderConfig::from_toml_str(
            r#"
            case_insensitive = false
            project_name = "MyGame"

            [version]
            ue4 = 510
            "#,
        )
        .unwrap();

        assert!(!config.case_insensitive);
        assert_eq!(config.project_name.as_deref(), Some("MyGame"));
        assert_eq!(config.version, PackageFileVersion::ue4(510));
        assert!(config.lazy_serialization);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "package_cache_capacity = 8").unwrap();

        let config = ProviderConfig::load(file.path()).unwrap();
        assert_eq!(config.package_cache_capacity, 8);
    }

    #[test]
    fn test_invalid_toml() {
        let result = ProviderConfig::from_toml_str("case_insensitive = \"yes\"");
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }
}
