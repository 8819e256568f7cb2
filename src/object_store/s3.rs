use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;

use super::{content_disposition, ObjectStore, ObjectStoreError, UploadedPart};
use crate::config::StorageSettings;

const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// S3-compatible object store (Cloudflare R2, MinIO, AWS).
pub struct S3Store {
    bucket: String,
    client: Client,
}

impl S3Store {
    pub fn new(settings: &StorageSettings) -> Self {
        let credentials = Credentials::new(
            &settings.access_key_id,
            &settings.secret_access_key,
            None,
            None,
            "file-drop",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&settings.endpoint)
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            bucket: settings.bucket_name.clone(),
            client: Client::from_conf(s3_config),
        }
    }

    /// S3 refuses signatures valid for longer than seven days. Longer
    /// lifetimes are an error so callers can fall back to the proxied path.
    fn presigning(ttl: Duration) -> Result<PresigningConfig, ObjectStoreError> {
        if ttl > MAX_PRESIGN_TTL {
            return Err(ObjectStoreError::Presign(format!(
                "lifetime of {}s exceeds the S3 maximum of {}s",
                ttl.as_secs(),
                MAX_PRESIGN_TTL.as_secs()
            )));
        }
        let ttl = ttl.max(Duration::from_secs(1));
        PresigningConfig::expires_in(ttl).map_err(|e| ObjectStoreError::Presign(e.to_string()))
    }
}

fn backend_error<E>(context: &str, e: E) -> ObjectStoreError
where
    E: std::error::Error,
{
    ObjectStoreError::Backend(format!("{context}: {}", DisplayErrorContext(e)))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| ObjectStoreError::Presign(DisplayErrorContext(e).to_string()))?;

        tracing::debug!(key = %key, "Presigned upload URL");
        Ok(request.uri().to_string())
    }

    async fn presign_download(
        &self,
        key: &str,
        filename: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(content_disposition(filename))
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| ObjectStoreError::Presign(DisplayErrorContext(e).to_string()))?;

        Ok(request.uri().to_string())
    }

    async fn initiate_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| backend_error("create multipart upload", e))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| ObjectStoreError::Backend("no upload id returned".to_string()))?;

        tracing::info!(key = %key, upload_id = %upload_id, "Opened multipart upload");
        Ok(upload_id.to_string())
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| ObjectStoreError::Presign(DisplayErrorContext(e).to_string()))?;

        Ok(request.uri().to_string())
    }

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, ObjectStoreError> {
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_parts()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .set_part_number_marker(marker.take())
                .send()
                .await
                .map_err(|e| backend_error("list parts", e))?;

            for part in output.parts() {
                if let (Some(part_number), Some(etag)) = (part.part_number(), part.e_tag()) {
                    parts.push(UploadedPart {
                        part_number,
                        etag: etag.to_string(),
                    });
                }
            }

            if output.is_truncated() != Some(true) {
                break;
            }
            marker = output.next_part_number_marker().map(str::to_string);
            if marker.is_none() {
                break;
            }
        }

        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<(), ObjectStoreError> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| backend_error("complete multipart upload", e))?;

        tracing::info!(key = %key, parts = parts.len(), "Completed multipart upload");
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), ObjectStoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| backend_error("abort multipart upload", e))?;

        tracing::info!(key = %key, upload_id = %upload_id, "Aborted multipart upload");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend_error("delete object", e))?;

        tracing::debug!(key = %key, "Deleted object");
        Ok(())
    }

    async fn test_connectivity(&self) -> Result<(), ObjectStoreError> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| backend_error("list objects", e))?;
        Ok(())
    }
}
