//! Why a NAL2 settings load was refused.
//!
//! A missing `settings.json` is not an error (defaults apply), and bad
//! `NAL2_*` variables are logged and skipped, so every variant here points
//! at the file itself or at a value the server cannot run with.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    /// `settings.json` exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// `settings.json` is not valid JSON.
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The merged document does not fit the settings schema,
    /// e.g. `"server": {"port": "eighty"}`.
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value that deserializes but would stop the server from running.
    #[error("{key} {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, SettingsError>;
