
use super::db::{Database, DatabaseError};
use super::tables::*;

/// Well-known setting keys.
pub mod keys {
    pub const PASSWORD_HASH: &str = "password_hash";
    pub const STORAGE_CONFIGURED: &str = "storage_configured";
    pub const STORAGE_ENDPOINT: &str = "storage_endpoint";
    pub const STORAGE_ACCESS_KEY_ID: &str = "storage_access_key_id";
    pub const STORAGE_SECRET_ACCESS_KEY: &str = "storage_secret_access_key";
    pub const STORAGE_BUCKET_NAME: &str = "storage_bucket_name";
}

impl Database {
    // ========================================================================
    // Settings
    // ========================================================================

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Write several settings atomically.
    pub fn set_settings(&self, entries: &[(&str, &str)]) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS)?;
            for (key, value) in entries {
                table.insert(*key, *value)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.set_settings(&[(key, value)])
    }
}
