//! The only place the backlog engine touches the disk.

use std::fs;
use std::path::Path;

use crate::error::BacklogError;

/// Idempotent directory and file primitives.
///
/// Failures are returned as-is; there is no retry.
#[derive(Debug, Default)]
pub struct FileManager {
    written: usize,
}

impl FileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `path` and its parents. Existing directories are fine.
    pub fn ensure_dir(&self, path: &Path) -> Result<(), BacklogError> {
        fs::create_dir_all(path).map_err(|source| BacklogError::Io {
            action: "create directory",
            path: path.to_path_buf(),
            source,
        })
    }

    /// Create or overwrite `path` with `contents`.
    pub fn write_file(&mut self, path: &Path, contents: &str) -> Result<(), BacklogError> {
        fs::write(path, contents).map_err(|source| BacklogError::Io {
            action: "write",
            path: path.to_path_buf(),
            source,
        })?;
        self.written += 1;
        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Files written through this manager so far.
    pub fn written(&self) -> usize {
        self.written
    }
}
