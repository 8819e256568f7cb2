//! Background removal of expired files.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::guard::RateLimitGuard;
use crate::object_store::StorageHandle;
use crate::state_machine::Deletion;
use crate::storage::Database;
use crate::uploads::remove_file;

/// Outcome of one sweep cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub deleted: usize,
    /// Left `completed`; picked up again next cycle.
    pub failed: usize,
    pub pruned_rate_limits: u64,
}

pub struct ExpirationSweeper {
    db: Database,
    storage: StorageHandle,
    guard: RateLimitGuard,
    rate_limit_ttl: chrono::Duration,
}

impl ExpirationSweeper {
    pub fn new(
        db: Database,
        storage: StorageHandle,
        guard: RateLimitGuard,
        rate_limit_ttl: Duration,
    ) -> Self {
        Self {
            db,
            storage,
            guard,
            rate_limit_ttl: chrono::Duration::from_std(rate_limit_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    pub async fn run_cycle(&self) -> Result<SweepReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Soft-delete every completed file that expired before `now`. A record
    /// only changes status after its object was removed.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        match self.guard.prune_at(now, self.rate_limit_ttl) {
            Ok(pruned) => report.pruned_rate_limits = pruned,
            Err(e) => tracing::warn!(error = %e, "Failed to prune rate limits"),
        }

        let Some(store) = self.storage.current().await else {
            tracing::debug!("Storage not configured, skipping sweep");
            return Ok(report);
        };

        let expired = self.db.list_expired(now)?;
        report.candidates = expired.len();

        for file in &expired {
            match remove_file(&self.db, store.as_ref(), file, Deletion::Soft).await {
                Ok(()) => {
                    report.deleted += 1;
                    tracing::info!(file_id = %file.id, key = %file.storage_key, "Expired file removed");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(file_id = %file.id, error = %e, "Failed to remove expired file");
                }
            }
        }

        Ok(report)
    }

    /// Run a cycle now and then every `every` until `cancel` fires.
    pub fn spawn(self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Expiration sweeper stopped");
                        break;
                    }
                    // the first tick completes immediately
                    _ = ticker.tick() => {
                        match self.run_cycle().await {
                            Ok(report) if report.candidates > 0 || report.pruned_rate_limits > 0 => {
                                tracing::info!(
                                    candidates = report.candidates,
                                    deleted = report.deleted,
                                    failed = report.failed,
                                    pruned_rate_limits = report.pruned_rate_limits,
                                    "Sweep finished"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "Sweep failed"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::guard::GuardPolicy;
    use crate::object_store::{MemoryStore, ObjectStore};
    use crate::state_machine::UploadStatus;
    use crate::storage::models::{ExpiresIn, FileRecord};

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Database,
        store: Arc<MemoryStore>,
        sweeper: ExpirationSweeper,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let store = Arc::new(MemoryStore::new("sweep"));
        let handle = StorageHandle::new(Some(store.clone() as Arc<dyn ObjectStore>));
        let guard = RateLimitGuard::new(db.clone(), GuardPolicy::default());
        let sweeper =
            ExpirationSweeper::new(db.clone(), handle, guard, Duration::from_secs(3600));
        Fixture {
            _dir: dir,
            db,
            store,
            sweeper,
        }
    }

    fn completed(db: &Database, code: &str, created: DateTime<Utc>) -> FileRecord {
        let mut file = FileRecord::new_pending(
            "a.bin",
            "application/octet-stream",
            10,
            ExpiresIn::OneDay,
            created,
        );
        file.short_code = code.to_string();
        file.upload_status = UploadStatus::Completed;
        db.put_file(&file).unwrap();
        file
    }

    #[tokio::test]
    async fn test_sweep_soft_deletes_expired() {
        let f = fixture();
        let now = Utc::now();
        let old = completed(&f.db, "old001", now - chrono::Duration::days(2));
        let fresh = completed(&f.db, "new001", now);
        f.store.put_object(&old.storage_key, "application/octet-stream").await;

        let report = f.sweeper.run_cycle_at(now).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);

        let swept = f.db.get_file(&old.id).unwrap().unwrap();
        assert_eq!(swept.upload_status, UploadStatus::Deleted);
        assert!(!f.store.contains(&old.storage_key).await);
        assert_eq!(
            f.db.get_file(&fresh.id).unwrap().unwrap().upload_status,
            UploadStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_failed_delete_is_retried_next_cycle() {
        let f = fixture();
        let now = Utc::now();
        let old = completed(&f.db, "old001", now - chrono::Duration::days(2));

        f.store.set_fail_deletes(true);
        let report = f.sweeper.run_cycle_at(now).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(
            f.db.get_file(&old.id).unwrap().unwrap().upload_status,
            UploadStatus::Completed
        );

        f.store.set_fail_deletes(false);
        let report = f.sweeper.run_cycle_at(now).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(f.store.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_prune_failure_does_not_block_file_sweep() {
        let f = fixture();
        let now = Utc::now();
        let old = completed(&f.db, "old001", now - chrono::Duration::days(2));

        // an undecodable entry makes the prune fail
        let write_txn = f.db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(crate::storage::RATE_LIMITS).unwrap();
            table.insert("10.0.0.9", [0xc1u8].as_slice()).unwrap();
        }
        write_txn.commit().unwrap();

        let report = f.sweeper.run_cycle_at(now).await.unwrap();
        assert_eq!(report.pruned_rate_limits, 0);
        assert_eq!(report.deleted, 1);
        assert_eq!(
            f.db.get_file(&old.id).unwrap().unwrap().upload_status,
            UploadStatus::Deleted
        );
    }

    #[tokio::test]
    async fn test_no_storage_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let guard = RateLimitGuard::new(db.clone(), GuardPolicy::default());
        let sweeper = ExpirationSweeper::new(
            db.clone(),
            StorageHandle::default(),
            guard,
            Duration::from_secs(3600),
        );
        let now = Utc::now();
        let old = completed(&db, "old001", now - chrono::Duration::days(2));

        let report = sweeper.run_cycle_at(now).await.unwrap();
        assert_eq!(report.candidates, 0);
        assert_eq!(
            db.get_file(&old.id).unwrap().unwrap().upload_status,
            UploadStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_spawned_loop_runs_immediately_and_stops() {
        let f = fixture();
        let old = completed(&f.db, "old001", Utc::now() - chrono::Duration::days(2));
        let db = f.db.clone();

        let cancel = CancellationToken::new();
        let handle = f.sweeper.spawn(Duration::from_secs(3600), cancel.clone());

        for _ in 0..50 {
            if db.get_file(&old.id).unwrap().unwrap().upload_status == UploadStatus::Deleted {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            db.get_file(&old.id).unwrap().unwrap().upload_status,
            UploadStatus::Deleted
        );

        cancel.cancel();
        handle.await.unwrap();
    }
}
