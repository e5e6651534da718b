//! Ways loading relay settings can fail.

use std::path::PathBuf;

use thiserror::Error;

/// A settings file that could not be used, or a value the hub cannot run with.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON.
    #[error("settings file {} is not valid JSON: {source}", path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Parser error with line and column.
        #[source]
        source: serde_json::Error,
    },
    /// The merged JSON does not fit the settings types, e.g. a string port.
    #[error("settings have the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A field holds a value the hub cannot run with.
    #[error("invalid setting {field}: {requirement}")]
    Invalid {
        /// camelCase path of the field, as written in the settings file.
        field: &'static str,
        /// What the value must satisfy.
        requirement: &'static str,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, requirement: &'static str) -> Self {
        Self::Invalid { field, requirement }
    }

    /// The offending field for [`SettingsError::Invalid`].
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
