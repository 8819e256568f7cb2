//! Upload lifecycle coordinator.
//!
//! Owns every transition of a [`FileRecord`]: creation with a unique short
//! code, single-shot and multipart uploads, confirmation, listing, download
//! brokering and deletion. Bytes never pass through the server; the
//! coordinator only hands out presigned URLs.

mod format;
mod types;

pub use format::{format_bytes, format_remaining};
pub use types::*;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::config::LimitsConfig;
use crate::error::{Error, Result};
use crate::keys::{is_valid_short_code, ShortCodeSource};
use crate::object_store::{ObjectStore, StorageHandle};
use crate::state_machine::{Deletion, UploadStatus};
use crate::storage::models::FileRecord;
use crate::storage::{Database, DatabaseError};

/// Insert attempts before giving up on finding a free short code.
pub const MAX_SHORT_CODE_ATTEMPTS: usize = 10;

/// Lifetime of presigned upload and part URLs.
pub const UPLOAD_URL_TTL: StdDuration = StdDuration::from_secs(3600);

/// Upper bound for presigned download URLs handed out by the download route.
pub const DOWNLOAD_URL_TTL: StdDuration = StdDuration::from_secs(24 * 3600);

pub const PART_SIZE: u64 = 20 * 1024 * 1024;

/// S3 part numbers run from 1 to 10000.
const MAX_PART_NUMBER: i32 = 10_000;

const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;

/// Backend-proxied download path. Handed out whenever a direct link cannot
/// be produced.
pub fn download_path(file_id: &str) -> String {
    format!("/api/files/{file_id}/download")
}

pub fn short_url(code: &str) -> String {
    format!("/s/{code}")
}

/// Delete a file's object, then drop (`Hard`) or retire (`Soft`) its record.
/// The record is left alone when the backend call fails.
pub async fn remove_file(
    db: &Database,
    store: &dyn ObjectStore,
    file: &FileRecord,
    deletion: Deletion,
) -> Result<()> {
    store.delete_object(&file.storage_key).await?;

    if deletion.keeps_record() {
        db.update_status(&file.id, UploadStatus::Deleted)?;
    } else {
        db.delete_file(&file.id)?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct UploadCoordinator {
    db: Database,
    storage: StorageHandle,
    codes: Arc<dyn ShortCodeSource>,
    limits: LimitsConfig,
}

impl UploadCoordinator {
    pub fn new(
        db: Database,
        storage: StorageHandle,
        codes: Arc<dyn ShortCodeSource>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            db,
            storage,
            codes,
            limits,
        }
    }

    async fn store(&self) -> Result<Arc<dyn ObjectStore>> {
        self.storage
            .current()
            .await
            .ok_or_else(Error::storage_not_configured)
    }

    fn require_file(&self, file_id: &str) -> Result<FileRecord> {
        self.db.get_file(file_id)?.ok_or(Error::NotFound("File"))
    }

    fn validate(&self, req: &NewUpload) -> Result<()> {
        if req.filename.trim().is_empty() {
            return Err(Error::validation("filename is required"));
        }
        if req.size > self.limits.max_file_size {
            return Err(Error::validation(format!(
                "File exceeds maximum size of {}",
                format_bytes(self.limits.max_file_size)
            )));
        }
        Ok(())
    }

    /// Build and persist a pending record, retrying on short-code collisions.
    fn create_record(&self, req: &NewUpload, now: DateTime<Utc>) -> Result<FileRecord> {
        let content_type = if req.content_type.trim().is_empty() {
            mime_guess::from_path(&req.filename)
                .first_or_octet_stream()
                .to_string()
        } else {
            req.content_type.clone()
        };

        let mut record =
            FileRecord::new_pending(&req.filename, &content_type, req.size, req.expires_in, now);

        for attempt in 1..=MAX_SHORT_CODE_ATTEMPTS {
            record.short_code = self.codes.next_code()?;
            match self.db.insert_file(&record) {
                Ok(()) => return Ok(record),
                Err(DatabaseError::ShortCodeTaken(code)) => {
                    tracing::debug!(attempt, code = %code, "Short code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            attempts = MAX_SHORT_CODE_ATTEMPTS,
            "Could not allocate a unique short code"
        );
        Err(Error::Conflict(format!(
            "could not allocate a unique short code after {MAX_SHORT_CODE_ATTEMPTS} attempts"
        )))
    }

    /// Drop a record whose backend setup failed so it does not linger.
    fn discard(&self, file: &FileRecord) {
        if let Err(e) = self.db.delete_file(&file.id) {
            tracing::warn!(file_id = %file.id, error = %e, "Failed to discard record");
        }
    }

    /// Direct download link valid until the file expires, or the proxied
    /// path when one cannot be produced.
    async fn direct_download_url(&self, file: &FileRecord, now: DateTime<Utc>) -> String {
        let Ok(remaining) = file.remaining_at(now).to_std() else {
            return download_path(&file.id);
        };
        if remaining.is_zero() {
            return download_path(&file.id);
        }
        let Some(store) = self.storage.current().await else {
            return download_path(&file.id);
        };

        match store
            .presign_download(&file.storage_key, &file.filename, remaining)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(file_id = %file.id, error = %e, "Falling back to proxied download");
                download_path(&file.id)
            }
        }
    }

    // ========================================================================
    // Single-shot uploads
    // ========================================================================

    pub async fn create_presigned(&self, req: NewUpload) -> Result<PresignedUpload> {
        self.validate(&req)?;
        let store = self.store().await?;
        let file = self.create_record(&req, Utc::now())?;

        let upload_url = match store
            .presign_upload(&file.storage_key, &file.content_type, UPLOAD_URL_TTL)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                self.discard(&file);
                return Err(e.into());
            }
        };

        tracing::info!(
            file_id = %file.id,
            size = file.size,
            expires_in = file.expires_in.code(),
            "Created upload"
        );

        Ok(PresignedUpload {
            download_url: download_path(&file.id),
            short_url: short_url(&file.short_code),
            file_id: file.id,
            upload_url,
            short_code: file.short_code,
            expires_at: file.expires_at,
        })
    }

    /// Mark a single-shot upload as done. The client's word is taken for it;
    /// the backend is not asked whether the object exists.
    pub async fn confirm(&self, file_id: &str) -> Result<CompletedUpload> {
        let file = self
            .db
            .update_status(file_id, UploadStatus::Completed)?
            .ok_or(Error::NotFound("File"))?;

        tracing::info!(file_id = %file.id, "Upload confirmed");

        Ok(CompletedUpload {
            download_url: self.direct_download_url(&file, Utc::now()).await,
            short_url: short_url(&file.short_code),
            file_id: file.id,
            expires_at: file.expires_at,
        })
    }

    // ========================================================================
    // Multipart uploads
    // ========================================================================

    pub async fn initiate_multipart(&self, req: NewUpload) -> Result<MultipartSession> {
        self.validate(&req)?;
        if req.size == 0 {
            return Err(Error::validation("multipart uploads need at least one byte"));
        }
        let store = self.store().await?;
        let file = self.create_record(&req, Utc::now())?;

        let upload_id = match store
            .initiate_multipart(&file.storage_key, &file.content_type)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.discard(&file);
                return Err(e.into());
            }
        };

        self.db.update_status(&file.id, UploadStatus::Uploading)?;

        let total_parts = file.size.div_ceil(PART_SIZE);
        tracing::info!(
            file_id = %file.id,
            upload_id = %upload_id,
            total_parts,
            "Started multipart upload"
        );

        Ok(MultipartSession {
            short_url: short_url(&file.short_code),
            file_id: file.id,
            upload_id,
            part_size: PART_SIZE,
            total_parts,
            expires_at: file.expires_at,
        })
    }

    /// Presign one part. Nothing is recorded locally, so asking twice is fine.
    pub async fn presign_part(&self, req: PartRequest) -> Result<PresignedPart> {
        if !(1..=MAX_PART_NUMBER).contains(&req.part_number) {
            return Err(Error::validation(format!(
                "part_number must be between 1 and {MAX_PART_NUMBER}"
            )));
        }
        if req.upload_id.trim().is_empty() {
            return Err(Error::validation("upload_id is required"));
        }

        let file = self.require_file(&req.file_id)?;
        let store = self.store().await?;
        let upload_url = store
            .presign_upload_part(
                &file.storage_key,
                &req.upload_id,
                req.part_number,
                UPLOAD_URL_TTL,
            )
            .await?;

        Ok(PresignedPart {
            part_number: req.part_number,
            upload_url,
        })
    }

    /// Assemble the object from the parts the backend actually holds.
    pub async fn complete_multipart(&self, req: CompleteRequest) -> Result<CompletedUpload> {
        let file = self.require_file(&req.file_id)?;
        let store = self.store().await?;

        let parts = store.list_parts(&file.storage_key, &req.upload_id).await?;
        if parts.is_empty() {
            return Err(Error::validation("no uploaded parts found for this upload"));
        }
        if parts.len() != req.parts.len() {
            tracing::debug!(
                file_id = %file.id,
                claimed = req.parts.len(),
                stored = parts.len(),
                "Claimed part list differs from backend"
            );
        }

        store
            .complete_multipart(&file.storage_key, &req.upload_id, &parts)
            .await?;

        let file = self
            .db
            .update_status(&file.id, UploadStatus::Completed)?
            .ok_or(Error::NotFound("File"))?;

        tracing::info!(file_id = %file.id, parts = parts.len(), "Multipart upload completed");

        Ok(CompletedUpload {
            download_url: self.direct_download_url(&file, Utc::now()).await,
            short_url: short_url(&file.short_code),
            file_id: file.id,
            expires_at: file.expires_at,
        })
    }

    /// Abandon an upload that has not completed yet. The multipart session is
    /// aborted when its id is given, and the record is removed.
    pub async fn cancel_upload(&self, req: CancelRequest) -> Result<()> {
        let file = self.require_file(&req.file_id)?;
        if !file.upload_status.is_in_flight() {
            return Err(Error::Conflict(format!(
                "cannot cancel a {} upload",
                file.upload_status
            )));
        }

        let store = self.store().await?;
        match req.upload_id.as_deref().filter(|id| !id.is_empty()) {
            Some(upload_id) => {
                store.abort_multipart(&file.storage_key, upload_id).await?;
                self.db.delete_file(&file.id)?;
            }
            // a single-shot PUT may already have landed
            None => remove_file(&self.db, store.as_ref(), &file, Deletion::Hard).await?,
        }

        tracing::info!(file_id = %file.id, "Upload cancelled");
        Ok(())
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Permanently remove a file: object first, then the record.
    pub async fn delete(&self, file_id: &str) -> Result<()> {
        let file = self.require_file(file_id)?;
        let store = self.store().await?;
        remove_file(&self.db, store.as_ref(), &file, Deletion::Hard).await?;

        tracing::info!(file_id = %file.id, "File deleted");
        Ok(())
    }

    /// Resolve a short code to the proxied download path.
    pub fn resolve_short_code(&self, code: &str) -> Result<String> {
        if !is_valid_short_code(code) {
            return Err(Error::NotFound("Short link"));
        }
        let file = self
            .db
            .get_file_by_short_code(code)?
            .ok_or(Error::NotFound("Short link"))?;
        Ok(download_path(&file.id))
    }

    pub async fn list(&self, page: u32, limit: u32) -> Result<FileListing> {
        self.list_at(page, limit, Utc::now()).await
    }

    pub async fn list_at(&self, page: u32, limit: u32, now: DateTime<Utc>) -> Result<FileListing> {
        let page = page.max(1);
        let limit = if (1..=MAX_PAGE_LIMIT).contains(&limit) {
            limit
        } else {
            DEFAULT_PAGE_LIMIT
        };

        let (records, total) = self.db.list_page(page, limit)?;

        let mut files = Vec::with_capacity(records.len());
        for file in records {
            let download_url = if file.upload_status == UploadStatus::Completed
                && !file.is_expired_at(now)
            {
                Some(self.direct_download_url(&file, now).await)
            } else {
                None
            };

            files.push(FileEntry {
                size_display: format_bytes(file.size),
                short_url: short_url(&file.short_code),
                remaining: format_remaining(file.remaining_at(now)),
                download_url,
                id: file.id,
                filename: file.filename,
                size: file.size,
                content_type: file.content_type,
                expires_in: file.expires_in,
                created_at: file.created_at,
                expires_at: file.expires_at,
                upload_status: file.upload_status,
                short_code: file.short_code,
            });
        }

        Ok(FileListing {
            files,
            total,
            page,
            limit,
        })
    }

    /// Presigned GET for the proxied download route.
    pub async fn download(&self, file_id: &str) -> Result<String> {
        self.download_at(file_id, Utc::now()).await
    }

    pub async fn download_at(&self, file_id: &str, now: DateTime<Utc>) -> Result<String> {
        let file = self.require_file(file_id)?;
        if file.upload_status == UploadStatus::Deleted || file.is_expired_at(now) {
            return Err(Error::Expired);
        }
        if file.upload_status != UploadStatus::Completed {
            return Err(Error::Conflict("upload has not completed".to_string()));
        }

        let ttl = file
            .remaining_at(now)
            .to_std()
            .map(|remaining| remaining.min(DOWNLOAD_URL_TTL))
            .map_err(|_| Error::Expired)?;

        let store = self.store().await?;
        let url = store
            .presign_download(&file.storage_key, &file.filename, ttl)
            .await?;

        tracing::debug!(file_id = %file.id, "Issued download URL");
        Ok(url)
    }

    pub fn stats(&self) -> Result<StatsSummary> {
        let stats = self
            .db
            .compute_stats(self.limits.total_storage, Utc::now())?;
        Ok(StatsSummary {
            used_display: format_bytes(stats.used_bytes),
            total_display: format_bytes(stats.total_bytes),
            stats,
        })
    }
}
