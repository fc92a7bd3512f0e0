//! Lifecycle of the local CSV file produced by one request.
//!
//! Each artifact lives in its own scratch directory under the work dir, so
//! two requests can never touch each other's files. `remove` is the normal
//! exit; `Drop` only covers unwinding.

use crate::domain::errors::{ExportError, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug)]
pub struct LocalArtifact {
    dir: Option<TempDir>,
    path: PathBuf,
    table: String,
    created_at: DateTime<Utc>,
}

impl LocalArtifact {
    /// Reserves `<work_dir>/<scratch>/<name>`. The file itself is created by
    /// the streamer.
    pub fn create(
        work_dir: &Path,
        table: &str,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let write_err = |source: std::io::Error| ExportError::WriteFailed {
            path: work_dir.display().to_string(),
            source,
        };
        std::fs::create_dir_all(work_dir).map_err(write_err)?;
        let dir = tempfile::Builder::new()
            .prefix(".backfill-")
            .tempdir_in(work_dir)
            .map_err(write_err)?;
        let path = dir.path().join(name);
        debug!("Reserved local artifact {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
            table: table.to_string(),
            created_at,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file, if any, and its scratch directory.
    pub fn remove(mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        dir.close().map_err(|source| ExportError::CleanupFailed {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(
            "Removed local artifact for `{}` (captured {}, held {}ms)",
            self.table,
            self.created_at.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            (Utc::now() - self.created_at).num_milliseconds()
        );
        Ok(())
    }
}

impl Drop for LocalArtifact {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!(
                    "Could not remove artifact for `{}` at {}: {}",
                    self.table,
                    self.path.display(),
                    e
                );
            }
        }
    }
}
