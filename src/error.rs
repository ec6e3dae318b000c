use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgendaError>;

#[derive(Debug, Error)]
pub enum AgendaError {
    /// A required structural marker (header line, section boundary, roster
    /// boundary) is absent, or the document violates an item invariant.
    #[error("malformed document {}: {reason}", path.display())]
    MalformedDocument { path: PathBuf, reason: String },

    /// The backing file vanished or changed between stat and read.
    #[error("stale read {}: {reason}", path.display())]
    StaleRead { path: PathBuf, reason: String },

    #[error("failed to persist approval state for {user}: {source}")]
    ApprovalWriteFailed {
        user: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid minutes {}: {source}", path.display())]
    Minutes {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("io error {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AgendaError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn stale(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StaleRead {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for conditions a caller may treat as "no such document".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::MalformedDocument { .. } | Self::StaleRead { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
