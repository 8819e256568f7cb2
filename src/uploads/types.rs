use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object_store::UploadedPart;
use crate::state_machine::UploadStatus;
use crate::storage::models::{ExpiresIn, StorageStats};

// ============================================================================
// Requests
// ============================================================================

/// Parameters shared by single-shot and multipart creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUpload {
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    pub size: u64,
    /// Lifetime code; anything unrecognised becomes seven days.
    #[serde(default)]
    pub expires_in: ExpiresIn,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartRequest {
    pub file_id: String,
    pub upload_id: String,
    pub part_number: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub file_id: String,
    pub upload_id: String,
    /// What the client believes it uploaded. Only logged; the manifest comes
    /// from the backend.
    #[serde(default)]
    pub parts: Vec<UploadedPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    pub file_id: String,
    #[serde(default)]
    pub upload_id: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PresignedUpload {
    pub file_id: String,
    pub upload_url: String,
    pub download_url: String,
    pub short_url: String,
    pub short_code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedUpload {
    pub file_id: String,
    pub download_url: String,
    pub short_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultipartSession {
    pub file_id: String,
    pub upload_id: String,
    pub part_size: u64,
    pub total_parts: u64,
    pub short_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresignedPart {
    pub part_number: i32,
    pub upload_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub size_display: String,
    pub content_type: String,
    pub expires_in: ExpiresIn,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub upload_status: UploadStatus,
    pub short_code: String,
    pub short_url: String,
    pub remaining: String,
    /// Direct link for completed, unexpired files.
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileListing {
    pub files: Vec<FileEntry>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    #[serde(flatten)]
    pub stats: StorageStats,
    pub used_display: String,
    pub total_display: String,
}
