//! Upload file layout and cleanup guard.

use std::path::{Path, PathBuf};

use swimlens_core::types::JobId;

/// `{uploads}/{id}.{ext}`
pub fn upload_path(upload_dir: &Path, id: JobId, ext: &str) -> PathBuf {
    upload_dir.join(format!("{id}.{ext}"))
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Deleted raw upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to delete raw upload"),
    }
}

/// Owns a raw upload on disk.
///
/// Normal paths call [`UploadGuard::remove`], which deletes without blocking
/// the runtime, or [`UploadGuard::keep`] to hand the file on. A guard that
/// is simply dropped (error return, panic unwind) deletes synchronously.
#[derive(Debug)]
pub struct UploadGuard {
    path: PathBuf,
    armed: bool,
}

impl UploadGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the upload now.
    pub async fn remove(mut self) {
        self.armed = false;
        log_removal(&self.path, tokio::fs::remove_file(&self.path).await);
    }

    /// Give up ownership without deleting; returns the path.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if self.armed {
            log_removal(&self.path, std::fs::remove_file(&self.path));
        }
    }
}
