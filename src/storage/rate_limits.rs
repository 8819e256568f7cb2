use redb::{Durability, ReadableTable};

use super::db::{Database, DatabaseError};
use super::models::RateLimitEntry;
use super::tables::*;

impl Database {
    // ========================================================================
    // Rate-limit operations
    // ========================================================================

    pub fn get_rate_limit(&self, ip: &str) -> Result<Option<RateLimitEntry>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(RATE_LIMITS)?;

        match table.get(ip)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write of one entry inside a single write transaction.
    ///
    /// `apply` receives the current entry (if any) and returns the entry to
    /// store, or `None` to leave the table untouched, along with a result that
    /// is handed back to the caller.
    pub fn update_rate_limit<T, F>(&self, ip: &str, apply: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(Option<RateLimitEntry>) -> (Option<RateLimitEntry>, T),
    {
        // runs on every request; losing the last few counters in a crash is fine
        let mut write_txn = self.begin_write()?;
        write_txn.set_durability(Durability::Eventual);
        let result = {
            let mut table = write_txn.open_table(RATE_LIMITS)?;
            let current: Option<RateLimitEntry> = match table.get(ip)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            let (next, result) = apply(current);
            if let Some(entry) = next {
                let data = rmp_serde::to_vec_named(&entry)?;
                table.insert(ip, data.as_slice())?;
            }
            result
        };
        write_txn.commit()?;
        Ok(result)
    }

    /// Overwrite an entry, e.g. to seed fixtures.
    pub fn put_rate_limit(&self, entry: &RateLimitEntry) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(RATE_LIMITS)?;
            let data = rmp_serde::to_vec_named(entry)?;
            table.insert(entry.ip.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove every entry for which `should_remove` returns true. Returns the
    /// number of entries removed.
    pub fn prune_rate_limits<F>(&self, should_remove: F) -> Result<u64, DatabaseError>
    where
        F: Fn(&RateLimitEntry) -> bool,
    {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(RATE_LIMITS)?;
            let mut stale = Vec::new();
            for result in table.iter()? {
                let (key, value) = result?;
                let entry: RateLimitEntry = rmp_serde::from_slice(value.value())?;
                if should_remove(&entry) {
                    stale.push(key.value().to_string());
                }
            }
            for ip in &stale {
                table.remove(ip.as_str())?;
            }
            stale.len() as u64
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
