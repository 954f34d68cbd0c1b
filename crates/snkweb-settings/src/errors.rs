//! Settings errors.

use std::path::PathBuf;

/// Why settings could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON or does not match the schema.
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },

    /// A value parsed but is unusable (bad endpoint, poll interval too short).
    #[error("invalid setting: {0}")]
    InvalidValue(String),
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
