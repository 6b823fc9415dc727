//! Error types shared across the resolution and acquisition layers.

use thiserror::Error;

/// Input rejected before any matching or network work happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("entity name is empty")]
    EmptyName,
    #[error("entity name is {len} characters long (max {max})")]
    NameTooLong { len: usize, max: usize },
    #[error("entity name contains control characters")]
    ControlCharacters,
    #[error("stable id is invalid: {0}")]
    InvalidStableId(String),
}

/// How a failed source call should be treated by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Source throttled us; back off exponentially.
    RateLimited,
    /// Network hiccup or timeout; retry after a short fixed delay.
    Transient,
    /// Do not retry.
    Terminal,
}

/// Failure reported by a catalog source adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl SourceError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::RateLimited(_) => RetryClass::RateLimited,
            Self::Transient(_) => RetryClass::Transient,
            Self::Unavailable(_) | Self::Invalid(_) => RetryClass::Terminal,
        }
    }
}

/// Failure loading or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config document error: {0}")]
    Document(#[from] toml_edit::TomlError),
}

/// Failure reading or writing the persisted record cache.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("cache record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure parsing override data.
#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("override table parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("override table for '{name}' has invalid year '{year}'")]
    InvalidYear { name: String, year: String },
    #[error("override file io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure loading the local curated dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("curated dataset parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("curated dataset io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure assembling the lookup pipeline from configuration.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Overrides(#[from] OverrideError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_class_separates_terminal_failures() {
        assert_eq!(
            SourceError::RateLimited("429".into()).retry_class(),
            RetryClass::RateLimited
        );
        assert_eq!(
            SourceError::Transient("timed out".into()).retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            SourceError::Unavailable("404".into()).retry_class(),
            RetryClass::Terminal
        );
        assert_eq!(
            SourceError::Invalid("400".into()).retry_class(),
            RetryClass::Terminal
        );
    }
}
