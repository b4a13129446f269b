//! Upload storage on the local filesystem

use image::{GenericImageView, ImageFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::imaging;

/// Metadata returned after an upload is stored
#[derive(Debug, Clone, Serialize)]
pub struct StoredUpload {
    pub file_id: String,
    /// Stored file name, `<file_id>.<ext>`
    pub filename: String,
    pub original_filename: Option<String>,
    pub size: usize,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Saves uploaded images under a single directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the storage directory exists
    pub async fn ensure_dir(&self) -> Result<()> {
        if fs::metadata(&self.root).await.is_err() {
            fs::create_dir_all(&self.root).await?;
            debug!(path = ?self.root, "Created upload directory");
        }
        Ok(())
    }

    /// Validate and store an uploaded image
    pub async fn save(&self, data: &[u8], original_filename: Option<String>) -> Result<StoredUpload> {
        let format = imaging::guess_format(data).ok_or_else(|| {
            AppError::InvalidRequest("File must be a PNG, JPEG or WebP image".to_string())
        })?;
        let (width, height) = imaging::decode(data)?.dimensions();

        self.ensure_dir().await?;

        let extension = extension_for(format);
        let file_id = Uuid::new_v4().to_string();
        let filename = format!("{}.{}", file_id, extension);
        let path = self.root.join(&filename);
        fs::write(&path, data).await?;

        debug!(path = ?path, size = data.len(), "Saved upload");

        Ok(StoredUpload {
            file_id,
            filename,
            original_filename,
            size: data.len(),
            width,
            height,
            format: extension.to_string(),
        })
    }

    /// Read a previously stored upload
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        if filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(AppError::InvalidRequest(format!("Invalid file name '{}'", filename)));
        }
        match fs::read(self.root.join(filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Upload '{}' not found", filename)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        other => other.extensions_str().first().copied().unwrap_or("bin"),
    }
}
