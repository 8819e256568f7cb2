use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{content_disposition, ObjectStore, ObjectStoreError, UploadedPart};

#[derive(Debug, Clone)]
struct MultipartSession {
    key: String,
    parts: BTreeMap<i32, String>,
}

/// In-process backend for tests and local development.
///
/// Presigned URLs point at a fake host and cannot be fetched. Uploads that a
/// real client would perform through those URLs are simulated with
/// [`MemoryStore::put_object`] and [`MemoryStore::upload_part`].
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<HashMap<String, String>>,
    sessions: Mutex<HashMap<String, MultipartSession>>,
    manifests: Mutex<HashMap<String, Vec<UploadedPart>>>,
    delete_calls: AtomicUsize,
    fail_deletes: AtomicBool,
    fail_download_presign: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            manifests: Mutex::new(HashMap::new()),
            delete_calls: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
            fail_download_presign: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }

    fn url(&self, key: &str, query: &str) -> String {
        format!("https://memory.invalid/{}/{}?{}", self.bucket, key, query)
    }

    fn check_available(&self) -> Result<(), ObjectStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Test controls
    // ------------------------------------------------------------------

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_download_presign(&self, fail: bool) {
        self.fail_download_presign.store(fail, Ordering::SeqCst);
    }

    /// Make every call fail as if the backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Simulate a client PUT through a presigned upload URL.
    pub async fn put_object(&self, key: &str, content_type: &str) {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), content_type.to_string());
    }

    /// Simulate a client PUT of one part. Returns the part's etag.
    pub async fn upload_part(
        &self,
        upload_id: &str,
        part_number: i32,
    ) -> Result<String, ObjectStoreError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(upload_id)
            .ok_or_else(|| ObjectStoreError::NotFound(format!("upload {upload_id}")))?;
        let etag = format!("\"{}\"", uuid::Uuid::new_v4().simple());
        session.parts.insert(part_number, etag.clone());
        Ok(etag)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    pub async fn has_session(&self, upload_id: &str) -> bool {
        self.sessions.lock().await.contains_key(upload_id)
    }

    /// The part list a multipart object was assembled from.
    pub async fn manifest(&self, key: &str) -> Option<Vec<UploadedPart>> {
        self.manifests.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        self.check_available()?;
        Ok(self.url(
            key,
            &format!("op=put&content-type={content_type}&expires={}", ttl.as_secs()),
        ))
    }

    async fn presign_download(
        &self,
        key: &str,
        filename: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        self.check_available()?;
        if self.fail_download_presign.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Presign(
                "download presign disabled".to_string(),
            ));
        }
        Ok(self.url(
            key,
            &format!(
                "op=get&disposition={}&expires={}",
                content_disposition(filename),
                ttl.as_secs()
            ),
        ))
    }

    async fn initiate_multipart(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        self.check_available()?;
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.sessions.lock().await.insert(
            upload_id.clone(),
            MultipartSession {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        self.check_available()?;
        Ok(self.url(
            key,
            &format!(
                "op=part&uploadId={upload_id}&partNumber={part_number}&expires={}",
                ttl.as_secs()
            ),
        ))
    }

    async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, ObjectStoreError> {
        self.check_available()?;
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(upload_id)
            .filter(|s| s.key == key)
            .ok_or_else(|| ObjectStoreError::NotFound(format!("upload {upload_id}")))?;

        Ok(session
            .parts
            .iter()
            .map(|(&part_number, etag)| UploadedPart {
                part_number,
                etag: etag.clone(),
            })
            .collect())
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<(), ObjectStoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get(upload_id)
            .filter(|s| s.key == key)
            .ok_or_else(|| ObjectStoreError::NotFound(format!("upload {upload_id}")))?;

        if parts.is_empty() {
            return Err(ObjectStoreError::Backend(
                "multipart upload has no parts".to_string(),
            ));
        }
        for part in parts {
            if session.parts.get(&part.part_number) != Some(&part.etag) {
                return Err(ObjectStoreError::Backend(format!(
                    "invalid part {}",
                    part.part_number
                )));
            }
        }

        sessions.remove(upload_id);
        drop(sessions);

        self.objects
            .lock()
            .await
            .insert(key.to_string(), "application/octet-stream".to_string());
        self.manifests
            .lock()
            .await
            .insert(key.to_string(), parts.to_vec());
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), ObjectStoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.lock().await;
        match sessions.get(upload_id) {
            Some(s) if s.key == key => {
                sessions.remove(upload_id);
                Ok(())
            }
            _ => Err(ObjectStoreError::NotFound(format!("upload {upload_id}"))),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Backend(format!("delete of {key} refused")));
        }
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn test_connectivity(&self) -> Result<(), ObjectStoreError> {
        self.check_available()
    }
}
