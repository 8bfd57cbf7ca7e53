pub mod auth;
pub mod customers;
pub mod health;
pub mod invoices;
pub mod products;
pub mod users;

use axum::extract::Multipart;
use mongodb::{bson::doc, Collection};
use serde::{de::DeserializeOwned, Serialize};
use service_core::error::{is_duplicate_key, AppError};

use crate::services::metrics;

/// Load one document by `_id` or fail with 404 naming the resource.
pub(crate) async fn find_by_id<T>(
    collection: &Collection<T>,
    id: &str,
    resource: &str,
) -> Result<T, AppError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    collection
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} not found", resource)))
}

/// Replace a document only if nobody else changed it since it was read.
///
/// `expected_version` is the version that was loaded; the caller must have
/// already bumped the entity's own `version`.
pub(crate) async fn save_versioned<T>(
    collection: &Collection<T>,
    id: &str,
    expected_version: i64,
    entity: &T,
    resource: &'static str,
    duplicate_message: &str,
) -> Result<(), AppError>
where
    T: Serialize + Send + Sync,
{
    match collection
        .replace_one(doc! { "_id": id, "version": expected_version }, entity, None)
        .await
    {
        Ok(result) if result.matched_count == 1 => Ok(()),
        Ok(_) => {
            metrics::record_conflict(resource);
            Err(AppError::conflict(format!(
                "The {} was modified by another request, reload and retry",
                resource
            )))
        }
        Err(e) if is_duplicate_key(&e) => Err(AppError::conflict(duplicate_message)),
        Err(e) => Err(e.into()),
    }
}

/// An uploaded image read from a multipart body.
pub(crate) struct Upload {
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

/// Read the first file part, accepting only images up to `max_bytes`.
pub(crate) async fn read_image(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<Upload, AppError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Failed to read multipart field: {}", e)))?
        .ok_or_else(|| AppError::bad_request("No file uploaded"))?;

    let content_type = field.content_type().unwrap_or_default().to_string();
    if !content_type.starts_with("image/") {
        return Err(AppError::bad_request("Please upload an image file"));
    }

    let file_name = field.file_name().map(str::to_string);
    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::bad_request(format!("Failed to read file bytes: {}", e)))?
        .to_vec();

    if data.is_empty() {
        return Err(AppError::bad_request("Uploaded file is empty"));
    }
    if data.len() > max_bytes {
        return Err(AppError::bad_request(format!(
            "Image too large (max {} bytes)",
            max_bytes
        )));
    }

    Ok(Upload { file_name, data })
}
