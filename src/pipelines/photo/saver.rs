// SPDX-License-Identifier: GPL-3.0-only

//! Persisting still images

use crate::backends::camera::types::StillImage;
use crate::errors::{CameraError, CameraResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes an encoded still image to `path`
#[async_trait]
pub trait ImageSaver: Send + Sync {
    async fn save(&self, image: &StillImage, path: &Path) -> CameraResult<PathBuf>;
}

/// Saves images to the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSaver;

#[async_trait]
impl ImageSaver for FileImageSaver {
    async fn save(&self, image: &StillImage, path: &Path) -> CameraResult<PathBuf> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &image.data[..])
            .await
            .map_err(|e| CameraError::Storage(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), bytes = image.data.len(), "Photo saved successfully");
        Ok(path.to_path_buf())
    }
}
