//! Provider error taxonomy and the crate-wide `Result` alias

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("File not found in namespace: {0}")]
    NotFound(String),

    #[error("Malformed container {path}: {reason}")]
    MalformedContainer { path: String, reason: String },

    #[error("Unsupported container kind: {0}")]
    UnsupportedContainerKind(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("Export {object} not found in package {package}")]
    ExportNotFound { package: String, object: String },

    #[error("Export {object} of package {package} is already being deserialized on this thread")]
    CyclicExport { package: String, object: String },

    #[error("Failed to deserialize package {package}: {source}")]
    Deserialize {
        package: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Entry {path} uses unsupported compression method {method}")]
    UnsupportedCompression { path: String, method: u32 },

    #[error("Entry {0} is encrypted")]
    Encrypted(String),

    #[error("Async runtime error: {0}")]
    AsyncRuntime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl ProviderError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ProviderError::MalformedContainer {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller can reasonably continue after this error.
    ///
    /// Only an unsupported container kind is fatal: it means the dispatcher
    /// has no package variant for a descriptor, which no retry will fix.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProviderError::UnsupportedContainerKind(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
