//! Shared test helpers for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{Config, LimitsConfig, NodeConfig, SweeperConfig};
use crate::keys::{RandomUnavailable, SecureShortCodes, ShortCodeSource};
use crate::object_store::{MemoryStore, ObjectStore, StorageHandle};
use crate::storage::Database;
use crate::AppState;

/// Hands out a fixed sequence of codes, then falls back to random ones.
pub struct ScriptedCodes {
    script: Mutex<VecDeque<String>>,
    fallback: SecureShortCodes,
    drawn: AtomicUsize,
}

impl ScriptedCodes {
    pub fn new(script: Vec<String>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: SecureShortCodes::new(),
            drawn: AtomicUsize::new(0),
        }
    }

    pub fn drawn(&self) -> usize {
        self.drawn.load(Ordering::SeqCst)
    }
}

impl ShortCodeSource for ScriptedCodes {
    fn next_code(&self) -> Result<String, RandomUnavailable> {
        self.drawn.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(code) => Ok(code),
            None => self.fallback.next_code(),
        }
    }
}

/// Create a test AppState with a temporary database and an in-memory store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> (Arc<AppState>, Arc<MemoryStore>) {
    let data_dir = temp_dir.path().join("data");

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        limits: LimitsConfig {
            max_file_size: 10 * 1024 * 1024, // 10MB for tests
            total_storage: 100 * 1024 * 1024,
        },
        sweeper: SweeperConfig::default(),
        test_mode: true,
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let store = Arc::new(MemoryStore::new("test"));
    let storage = StorageHandle::new(Some(store.clone() as Arc<dyn ObjectStore>));

    (AppState::new(config, db, storage), store)
}
