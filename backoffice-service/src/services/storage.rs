use async_trait::async_trait;
use service_core::error::AppError;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Blob store for product images and user photos.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(AppError::bad_request(format!("Invalid storage key: {}", key)));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}

/// Storage key for an uploaded blob: `<prefix>/<owner>/<uuid>.<ext>`.
pub fn blob_key(prefix: &str, owner_id: &str, file_name: Option<&str>) -> String {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());

    format!("{}/{}/{}.{}", prefix, owner_id, uuid::Uuid::new_v4(), extension)
}

/// Remove a blob without blocking the caller. Failures are logged and dropped.
pub fn delete_blob_detached(storage: Arc<dyn Storage>, key: String) {
    tokio::spawn(async move {
        match storage.delete(&key).await {
            Ok(()) => tracing::debug!(key = %key, "Deleted blob"),
            Err(e) => {
                metrics::counter!("blob_delete_failures_total").increment(1);
                tracing::warn!(key = %key, error = %e, "Failed to delete blob");
            }
        }
    });
}
