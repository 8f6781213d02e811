//! Upload directory: stored images and generated documents live side by side
//! and are addressed by `/uploads/{file}` URLs.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::CoreResult;

pub const URL_PREFIX: &str = "/uploads";

/// A file written into the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub url: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Uploads {
    root: PathBuf,
}

impl Uploads {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dir(&self) -> CoreResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", URL_PREFIX, file_name)
    }

    /// Map an `/uploads/...` URL back to a path inside the upload directory.
    /// URLs that point elsewhere or try to climb out are rejected.
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix(URL_PREFIX)?.strip_prefix('/')?;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return None;
        }
        Some(self.root.join(name))
    }

    /// Write `bytes` under a `{unix_millis}-{name}` file name.
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> CoreResult<StoredUpload> {
        let name = sanitize_file_name(original_name);
        let mut file_name = format!("{}-{}", Utc::now().timestamp_millis(), name);

        let file = match open_new(&self.root.join(&file_name)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                file_name = format!(
                    "{}-{}-{}",
                    Utc::now().timestamp_millis(),
                    &Uuid::new_v4().simple().to_string()[..8],
                    name
                );
                open_new(&self.root.join(&file_name)).await?
            }
            Err(e) => return Err(e.into()),
        };

        let mut file = file;
        file.write_all(bytes).await?;
        file.flush().await?;

        let path = self.root.join(&file_name);
        tracing::debug!("Stored upload {}", path.display());
        Ok(StoredUpload {
            url: self.url_for(&file_name),
            path,
        })
    }

    /// Remove the file behind `url`. A file that is already gone is not an
    /// error.
    pub async fn remove(&self, url: &str) {
        let Some(path) = self.resolve(url) else {
            tracing::warn!("Refusing to remove file outside uploads: {}", url);
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

async fn open_new(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

fn sanitize_file_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
