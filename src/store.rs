//! Artifact storage
//!
//! Outputs are written once under a fresh UUID and served back by identity.
//! Uploads live in a separate directory for the duration of one request and
//! are removed by [`TransientUpload`] on every exit path.

use crate::{
    config::StorageConfig,
    error::{BgRemovalError, Result},
    types::{ArtifactId, CompositedImage},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactStore {
    /// Create both directories if needed
    ///
    /// # Errors
    /// - A directory cannot be created
    pub async fn open(config: StorageConfig) -> Result<Self> {
        for dir in [&config.upload_dir, &config.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| BgRemovalError::file_io_error("create directory", dir, &e))?;
        }

        info!(
            upload_dir = %config.upload_dir.display(),
            output_dir = %config.output_dir.display(),
            "📁 Artifact store ready"
        );

        Ok(Self {
            upload_dir: config.upload_dir,
            output_dir: config.output_dir,
        })
    }

    #[must_use]
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Location of an artifact, derived only from its id
    #[must_use]
    pub fn artifact_path(&self, id: &ArtifactId) -> PathBuf {
        self.output_dir.join(id.file_name())
    }

    /// Encode `image` as PNG and store it under a fresh identity
    ///
    /// The file is written to a `.part` sibling and renamed into place, so
    /// readers never observe a partial artifact.
    ///
    /// # Errors
    /// - PNG encoding fails
    /// - The file cannot be written or renamed
    #[instrument(skip(self, image), fields(width = image.dimensions().0, height = image.dimensions().1))]
    pub async fn persist(&self, image: &CompositedImage) -> Result<ArtifactId> {
        let owned = image.clone();
        let png = tokio::task::spawn_blocking(move || owned.to_png_bytes())
            .await
            .map_err(|e| BgRemovalError::processing(format!("PNG encoding task failed: {e}")))??;

        let id = ArtifactId::new();
        let final_path = self.artifact_path(&id);
        let part_path = self.output_dir.join(format!("{}.part", id.file_name()));

        if let Err(e) = tokio::fs::write(&part_path, &png).await {
            remove_quietly(&part_path).await;
            return Err(BgRemovalError::file_io_error("write artifact", &part_path, &e));
        }
        if let Err(e) = tokio::fs::rename(&part_path, &final_path).await {
            remove_quietly(&part_path).await;
            return Err(BgRemovalError::file_io_error("finalize artifact", &final_path, &e));
        }

        debug!(artifact = %id, size_bytes = png.len(), "💾 Artifact persisted");
        Ok(id)
    }

    /// Read an artifact by `{uuid}` or `{uuid}.png`
    ///
    /// # Errors
    /// - `NotFound` when the name is not an artifact identity, or no readable
    ///   artifact file exists under it
    pub async fn resolve(&self, name: &str) -> Result<Vec<u8>> {
        let id = ArtifactId::parse(name).ok_or_else(|| BgRemovalError::not_found(name))?;
        let path = self.artifact_path(&id);

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Artifact unreadable, reporting as missing");
                }
                Err(BgRemovalError::not_found(id.file_name()))
            },
        }
    }

    /// Write uploaded bytes to `{upload_dir}/{uuid}` for the duration of one request
    ///
    /// # Errors
    /// - The upload cannot be written
    pub async fn stage_upload(&self, bytes: &[u8]) -> Result<TransientUpload> {
        let path = self.upload_dir.join(Uuid::new_v4().to_string());
        // Guard first so a partial write is also cleaned up
        let upload = TransientUpload::new(path);

        tokio::fs::write(upload.path(), bytes)
            .await
            .map_err(|e| BgRemovalError::file_io_error("stage upload", upload.path(), &e))?;

        debug!(path = %upload.path().display(), size_bytes = bytes.len(), "📤 Upload staged");
        Ok(upload)
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
        }
    }
}

/// Scoped ownership of a staged upload file
///
/// The file is deleted by [`TransientUpload::release`] or, failing that, when
/// the guard is dropped.
#[derive(Debug)]
pub struct TransientUpload {
    path: PathBuf,
    released: bool,
}

impl TransientUpload {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the upload now
    pub async fn release(mut self) {
        remove_quietly(&self.path).await;
        self.released = true;
    }
}

fn remove_staged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

impl Drop for TransientUpload {
    /// Inside a runtime the removal runs on the blocking pool; outside one it runs inline
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_staged(&path));
            },
            Err(_) => remove_staged(&path),
        }
    }
}
