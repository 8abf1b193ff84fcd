use std::path::{Path, PathBuf};

use thiserror::Error;

/// Library error type for frame-server operations.
///
/// Lower layers work in `anyhow::Result`; errors are folded into one of these
/// kinds at the component boundary so callers can pick a response.
#[derive(Debug, Error)]
pub enum Error {
    /// No source image or directory is available right now.
    #[error("no image available: {0}")]
    Unavailable(String),

    /// The pipeline failed on a corrupt or unreadable source.
    #[error("failed to process {}: {source:#}", path.display())]
    Processing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The rotation state file could not be read or written.
    #[error("rotation state at {} unusable: {source:#}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    ConfigValidation(String),
}

impl Error {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Short description for devices. Names the file but never the
    /// server-side path; the full error belongs in the log.
    pub fn client_message(&self) -> String {
        match self {
            Self::Unavailable(_) => "no image available".to_string(),
            Self::Processing { path, source } => {
                format!("failed to process {}: {}", file_label(path), source.root_cause())
            }
            Self::Persistence { source, .. } => {
                format!("rotation state unusable: {}", source.root_cause())
            }
            Self::ConfigValidation(msg) => format!("invalid configuration: {msg}"),
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}
