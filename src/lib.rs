//! file-drop - A self-hosted file drop backed by an S3-compatible bucket
//!
//! This crate brokers presigned URLs so clients move bytes straight to the
//! bucket, with:
//! - Single-shot and multipart uploads, short links and expiring files
//! - redb embedded database for file records, rate limits and settings
//! - Per-IP rate limiting with lockout after repeated login failures
//! - A background sweeper that removes expired objects

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod keys;
pub mod object_store;
pub mod state_machine;
pub mod storage;
pub mod sweeper;
#[cfg(test)]
pub mod testutil;
pub mod uploads;

use std::sync::Arc;

use config::Config;
use guard::{GuardPolicy, RateLimitGuard};
use keys::SecureShortCodes;
use object_store::StorageHandle;
use storage::Database;
use uploads::UploadCoordinator;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub storage: StorageHandle,
    pub uploads: UploadCoordinator,
    pub guard: RateLimitGuard,
}

impl AppState {
    pub fn new(config: Config, db: Database, storage: StorageHandle) -> Arc<Self> {
        let uploads = UploadCoordinator::new(
            db.clone(),
            storage.clone(),
            Arc::new(SecureShortCodes::new()),
            config.limits.clone(),
        );
        let guard = RateLimitGuard::new(db.clone(), GuardPolicy::default());

        Arc::new(Self {
            config,
            db,
            storage,
            uploads,
            guard,
        })
    }
}
