use std::sync::Arc;
use std::time::Duration;

use file_drop::object_store::{
    MemoryStore, ObjectStore, ObjectStoreError, StorageHandle, UploadedPart,
};

const TTL: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_memory_store_presign_urls() {
    let store = MemoryStore::new("bucket");

    let put = store
        .presign_upload("filedrop/a.txt", "text/plain", TTL)
        .await
        .unwrap();
    assert!(put.contains("/bucket/filedrop/a.txt"));
    assert!(put.contains("op=put"));

    let get = store
        .presign_download("filedrop/a.txt", "report.txt", TTL)
        .await
        .unwrap();
    assert!(get.contains("filename=\"report.txt\""));
    assert!(get.contains("expires=3600"));
}

#[tokio::test]
async fn test_memory_store_delete() {
    let store = MemoryStore::new("bucket");
    store.put_object("key", "text/plain").await;
    assert!(store.contains("key").await);

    store.delete_object("key").await.unwrap();
    assert!(!store.contains("key").await);

    // Deleting a nonexistent key should not error
    store.delete_object("key").await.unwrap();
    assert_eq!(store.delete_calls(), 2);
}

#[tokio::test]
async fn test_memory_store_failing_deletes() {
    let store = MemoryStore::new("bucket");
    store.put_object("key", "text/plain").await;
    store.set_fail_deletes(true);

    let result = store.delete_object("key").await;
    assert!(matches!(result, Err(ObjectStoreError::Backend(_))));
    assert!(store.contains("key").await);
}

#[tokio::test]
async fn test_multipart_lists_parts_in_order() {
    let store = MemoryStore::new("bucket");
    let upload_id = store
        .initiate_multipart("big.bin", "application/octet-stream")
        .await
        .unwrap();

    let third = store.upload_part(&upload_id, 3).await.unwrap();
    let first = store.upload_part(&upload_id, 1).await.unwrap();

    let parts = store.list_parts("big.bin", &upload_id).await.unwrap();
    assert_eq!(
        parts,
        vec![
            UploadedPart {
                part_number: 1,
                etag: first
            },
            UploadedPart {
                part_number: 3,
                etag: third
            },
        ]
    );

    store
        .complete_multipart("big.bin", &upload_id, &parts)
        .await
        .unwrap();
    assert!(store.contains("big.bin").await);
    assert_eq!(store.manifest("big.bin").await.unwrap(), parts);
    assert!(!store.has_session(&upload_id).await);
}

#[tokio::test]
async fn test_multipart_rejects_unknown_etag() {
    let store = MemoryStore::new("bucket");
    let upload_id = store
        .initiate_multipart("big.bin", "application/octet-stream")
        .await
        .unwrap();
    store.upload_part(&upload_id, 1).await.unwrap();

    let bogus = vec![UploadedPart {
        part_number: 1,
        etag: "\"made-up\"".to_string(),
    }];
    let result = store.complete_multipart("big.bin", &upload_id, &bogus).await;
    assert!(result.is_err());
    assert!(store.has_session(&upload_id).await);
}

#[tokio::test]
async fn test_abort_multipart() {
    let store = MemoryStore::new("bucket");
    let upload_id = store
        .initiate_multipart("big.bin", "application/octet-stream")
        .await
        .unwrap();

    store.abort_multipart("big.bin", &upload_id).await.unwrap();
    assert!(!store.has_session(&upload_id).await);

    let again = store.abort_multipart("big.bin", &upload_id).await;
    assert!(matches!(again, Err(ObjectStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_unavailable_store_fails_connectivity() {
    let store = MemoryStore::new("bucket");
    store.test_connectivity().await.unwrap();

    store.set_unavailable(true);
    assert!(store.test_connectivity().await.is_err());
    assert!(store
        .presign_upload("k", "text/plain", TTL)
        .await
        .is_err());
}

#[tokio::test]
async fn test_handle_swap_is_visible_to_all_clones() {
    let handle = StorageHandle::default();
    let reader = handle.clone();
    assert!(reader.current().await.is_none());

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new("bucket"));
    handle.replace(store).await;

    let current = reader.current().await.expect("store configured");
    current.test_connectivity().await.unwrap();
}
