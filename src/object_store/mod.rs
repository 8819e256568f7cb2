mod handle;
mod memory;
mod s3;

pub use handle::StorageHandle;
pub use memory::MemoryStore;
pub use s3::S3Store;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Presign error: {0}")]
    Presign(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A part the backend holds for an open multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPart {
    pub part_number: i32,
    pub etag: String,
}

/// Abstraction over S3-compatible backends. Clients move bytes directly
/// through presigned URLs; the server only ever brokers URLs and manages
/// object lifecycle.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError>;

    /// The URL must make the backend answer with a Content-Disposition
    /// carrying `filename`.
    async fn presign_download(
        &self,
        key: &str,
        filename: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError>;

    /// Open a multipart session and return its upload id.
    async fn initiate_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, ObjectStoreError>;

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError>;

    /// Parts actually present in the session, ordered by part number.
    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, ObjectStoreError>;

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<(), ObjectStoreError>;

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), ObjectStoreError>;

    /// Deleting a missing object is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError>;

    async fn test_connectivity(&self) -> Result<(), ObjectStoreError>;
}

/// `attachment` disposition per RFC 6266: an ASCII `filename` fallback plus
/// the exact name as a UTF-8 `filename*`.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect();
    let escaped = fallback.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "attachment; filename=\"{escaped}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
        assert_eq!(
            content_disposition("say \"hi\".txt"),
            "attachment; filename=\"say \\\"hi\\\".txt\"; filename*=UTF-8''say%20%22hi%22.txt"
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
    }
}
