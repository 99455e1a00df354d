//! Error types for backlog materialization.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the materialization engine.
#[derive(Debug, Error)]
pub enum BacklogError {
    /// The backlog shape was rejected before any write.
    #[error("Invalid backlog: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A directory or file operation failed mid-walk.
    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Wraps a failure together with how far the walk got.
    #[error("{source} ({written} files written before the failure)")]
    Partial {
        written: usize,
        #[source]
        source: Box<BacklogError>,
    },
}

impl BacklogError {
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Partial { source, .. } => source.is_validation(),
            _ => false,
        }
    }

    /// Validation messages, empty for every other kind.
    pub fn validation_errors(&self) -> &[String] {
        match self {
            Self::Validation(errors) => errors,
            Self::Partial { source, .. } => source.validation_errors(),
            _ => &[],
        }
    }
}

/// Path arithmetic failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Unsupported link source '{0}'. Must be: mvp or iteration")]
    UnsupportedLinkSource(String),
}
