use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use file_drop::config::LimitsConfig;
use file_drop::error::Error;
use file_drop::guard::{GuardPolicy, RateLimitGuard};
use file_drop::keys::{is_valid_short_code, RandomUnavailable, SecureShortCodes, ShortCodeSource};
use file_drop::object_store::{MemoryStore, ObjectStore, StorageHandle};
use file_drop::state_machine::UploadStatus;
use file_drop::storage::models::ExpiresIn;
use file_drop::storage::Database;
use file_drop::sweeper::ExpirationSweeper;
use file_drop::uploads::{download_path, NewUpload, UploadCoordinator, MAX_SHORT_CODE_ATTEMPTS};

struct Harness {
    _dir: tempfile::TempDir,
    db: Database,
    store: Arc<MemoryStore>,
    uploads: UploadCoordinator,
    sweeper: ExpirationSweeper,
}

fn harness_with(codes: Arc<dyn ShortCodeSource>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path()).unwrap();
    let store = Arc::new(MemoryStore::new("drops"));
    let handle = StorageHandle::new(Some(store.clone() as Arc<dyn ObjectStore>));

    let uploads = UploadCoordinator::new(
        db.clone(),
        handle.clone(),
        codes,
        LimitsConfig::default(),
    );
    let guard = RateLimitGuard::new(db.clone(), GuardPolicy::default());
    let sweeper = ExpirationSweeper::new(db.clone(), handle, guard, StdDuration::from_secs(3600));

    Harness {
        _dir: dir,
        db,
        store,
        uploads,
        sweeper,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(SecureShortCodes::new()))
}

fn new_upload(size: u64, expires_in: i64) -> NewUpload {
    NewUpload {
        filename: "hello.txt".to_string(),
        content_type: "text/plain".to_string(),
        size,
        expires_in: ExpiresIn::from(expires_in),
    }
}

/// Always returns the same code.
struct StuckCodes(Mutex<usize>);

impl ShortCodeSource for StuckCodes {
    fn next_code(&self) -> Result<String, RandomUnavailable> {
        *self.0.lock().unwrap() += 1;
        Ok("Stuck1".to_string())
    }
}

#[tokio::test]
async fn test_upload_confirm_list_expire_sweep() {
    let h = harness();

    let created = h.uploads.create_presigned(new_upload(100, 1)).await.unwrap();
    assert!(is_valid_short_code(&created.short_code));
    let record = h.db.get_file(&created.file_id).unwrap().unwrap();
    h.store.put_object(&record.storage_key, "text/plain").await;

    h.uploads.confirm(&created.file_id).await.unwrap();

    let listing = h.uploads.list(1, 20).await.unwrap();
    assert_eq!(listing.total, 1);
    let entry = &listing.files[0];
    assert_eq!(entry.id, created.file_id);
    assert_eq!(entry.upload_status, UploadStatus::Completed);
    assert_ne!(entry.remaining, "expired");
    assert!(entry.remaining.starts_with("23h"), "{}", entry.remaining);
    let direct = entry.download_url.as_deref().unwrap();
    assert_ne!(direct, download_path(&created.file_id));

    // force the expiry into the past
    let mut record = h.db.get_file(&created.file_id).unwrap().unwrap();
    assert_eq!(record.upload_status, UploadStatus::Completed);
    record.expires_at = Utc::now() - Duration::minutes(1);
    h.db.put_file(&record).unwrap();

    let report = h.sweeper.run_cycle().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(!h.store.contains(&record.storage_key).await);

    let swept = h.db.get_file(&created.file_id).unwrap().unwrap();
    assert_eq!(swept.upload_status, UploadStatus::Deleted);

    let listing = h.uploads.list(1, 20).await.unwrap();
    let entry = &listing.files[0];
    assert_eq!(entry.upload_status, UploadStatus::Deleted);
    assert_eq!(entry.remaining, "expired");
    assert!(entry.download_url.is_none());

    let err = h.uploads.download(&created.file_id).await.unwrap_err();
    assert!(matches!(err, Error::Expired));
}

#[tokio::test]
async fn test_expiry_codes() {
    let h = harness();
    for (code, expected) in [
        (1, Duration::days(1)),
        (3, Duration::days(3)),
        (7, Duration::days(7)),
        (30, Duration::days(30)),
        (-30, Duration::seconds(30)),
        (2, Duration::days(7)),
        (0, Duration::days(7)),
        (365, Duration::days(7)),
    ] {
        let created = h
            .uploads
            .create_presigned(new_upload(10, code))
            .await
            .unwrap();
        let record = h.db.get_file(&created.file_id).unwrap().unwrap();
        assert_eq!(record.expires_at - record.created_at, expected, "code {code}");
    }
}

#[tokio::test]
async fn test_short_codes_unique_across_uploads() {
    let h = harness();
    let mut codes = std::collections::HashSet::new();
    for _ in 0..50 {
        let created = h.uploads.create_presigned(new_upload(1, 7)).await.unwrap();
        assert!(codes.insert(created.short_code));
    }
}

#[tokio::test]
async fn test_collision_exhaustion_fails_predictably() {
    let stuck = Arc::new(StuckCodes(Mutex::new(0)));
    let h = harness_with(stuck.clone());

    h.uploads.create_presigned(new_upload(1, 7)).await.unwrap();
    assert_eq!(*stuck.0.lock().unwrap(), 1);

    let err = h
        .uploads
        .create_presigned(new_upload(1, 7))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(*stuck.0.lock().unwrap(), 1 + MAX_SHORT_CODE_ATTEMPTS);
    assert_eq!(h.db.get_all_files().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sweep_only_deletes_after_backend_success() {
    let h = harness();
    let created = h.uploads.create_presigned(new_upload(10, 1)).await.unwrap();
    h.uploads.confirm(&created.file_id).await.unwrap();

    let later = Utc::now() + Duration::days(2);
    h.store.set_fail_deletes(true);
    let report = h.sweeper.run_cycle_at(later).await.unwrap();
    assert_eq!((report.candidates, report.deleted, report.failed), (1, 0, 1));
    assert_eq!(
        h.db.get_file(&created.file_id).unwrap().unwrap().upload_status,
        UploadStatus::Completed
    );
    assert_eq!(h.db.list_expired(later).unwrap().len(), 1);

    h.store.set_fail_deletes(false);
    let report = h.sweeper.run_cycle_at(later).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(h.db.list_expired(later).unwrap().is_empty());
}

#[tokio::test]
async fn test_user_delete_is_hard() {
    let h = harness();
    let created = h.uploads.create_presigned(new_upload(10, 1)).await.unwrap();
    h.uploads.confirm(&created.file_id).await.unwrap();

    h.uploads.delete(&created.file_id).await.unwrap();
    assert!(h.db.get_file(&created.file_id).unwrap().is_none());
    assert!(matches!(
        h.uploads.resolve_short_code(&created.short_code),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        h.uploads.delete(&created.file_id).await,
        Err(Error::NotFound(_))
    ));
}
