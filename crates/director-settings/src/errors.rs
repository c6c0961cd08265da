//! Settings error types.

use std::path::PathBuf;

/// Why settings could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not JSON.
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The merged document does not fit [`DirectorSettings`](crate::DirectorSettings).
    #[error("settings have the wrong shape: {0}")]
    Shape(#[source] serde_json::Error),

    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted camelCase path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl SettingsError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "SETTINGS_READ",
            Self::Parse { .. } => "SETTINGS_PARSE",
            Self::Shape(_) => "SETTINGS_SHAPE",
            Self::Invalid { .. } => "SETTINGS_INVALID",
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
