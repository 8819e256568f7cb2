use chrono::{DateTime, Duration, Utc};
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::{FileRecord, StorageStats};
use super::tables::*;
use crate::state_machine::UploadStatus;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Insert a new file record. Fails with `ShortCodeTaken` or
    /// `StorageKeyTaken` if either unique column is already in use; nothing is
    /// written in that case.
    pub fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");
        debug_assert!(!file.short_code.is_empty(), "short code must not be empty");

        let write_txn = self.begin_write()?;
        let conflict = {
            let codes = write_txn.open_table(FILE_SHORT_CODES)?;
            let keys = write_txn.open_table(FILE_STORAGE_KEYS)?;
            if codes.get(file.short_code.as_str())?.is_some() {
                Some(DatabaseError::ShortCodeTaken(file.short_code.clone()))
            } else if keys.get(file.storage_key.as_str())?.is_some() {
                Some(DatabaseError::StorageKeyTaken(file.storage_key.clone()))
            } else {
                None
            }
        };
        if let Some(err) = conflict {
            write_txn.abort()?;
            return Err(err);
        }

        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(file)?;
            table.insert(file.id.as_str(), data.as_slice())?;

            let mut codes = write_txn.open_table(FILE_SHORT_CODES)?;
            codes.insert(file.short_code.as_str(), file.id.as_str())?;

            let mut keys = write_txn.open_table(FILE_STORAGE_KEYS)?;
            keys.insert(file.storage_key.as_str(), file.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Store a file record as-is and refresh its index rows. No uniqueness or
    /// transition checks; meant for restores and fixtures.
    pub fn put_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(file)?;
            table.insert(file.id.as_str(), data.as_slice())?;

            if !file.short_code.is_empty() {
                let mut codes = write_txn.open_table(FILE_SHORT_CODES)?;
                codes.insert(file.short_code.as_str(), file.id.as_str())?;
            }

            let mut keys = write_txn.open_table(FILE_STORAGE_KEYS)?;
            keys.insert(file.storage_key.as_str(), file.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Get a file by its short code (resolves code -> uuid -> file)
    pub fn get_file_by_short_code(&self, code: &str) -> Result<Option<FileRecord>, DatabaseError> {
        if code.is_empty() {
            return Ok(None);
        }

        let read_txn = self.begin_read()?;
        let codes = read_txn.open_table(FILE_SHORT_CODES)?;

        let id = match codes.get(code)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let files_table = read_txn.open_table(FILES)?;
        match files_table.get(id.as_str())? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Move a file to `status`. Returns the updated record, or `None` if the
    /// file does not exist. Backward moves fail with `InvalidTransition`.
    pub fn update_status(
        &self,
        id: &str,
        status: UploadStatus,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let existing = {
            let table = write_txn.open_table(FILES)?;
            let result = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };
            result
        };

        let Some(mut file) = existing else {
            write_txn.abort()?;
            return Ok(None);
        };

        if !file.upload_status.can_transition_to(status) {
            let from = file.upload_status;
            write_txn.abort()?;
            return Err(DatabaseError::InvalidTransition { from, to: status });
        }

        if file.upload_status != status {
            file.upload_status = status;
            let data = rmp_serde::to_vec_named(&file)?;
            let mut table = write_txn.open_table(FILES)?;
            table.insert(id, data.as_slice())?;
        }

        write_txn.commit()?;
        Ok(Some(file))
    }

    /// Hard-delete a file and its index rows.
    pub fn delete_file(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let file = {
            let table = write_txn.open_table(FILES)?;
            let result = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<FileRecord>(data.value())?),
                None => None,
            };
            result
        };

        let deleted = match file {
            Some(file) => {
                {
                    let mut table = write_txn.open_table(FILES)?;
                    table.remove(id)?;
                }
                if !file.short_code.is_empty() {
                    let mut codes = write_txn.open_table(FILE_SHORT_CODES)?;
                    codes.remove(file.short_code.as_str())?;
                }
                {
                    let mut keys = write_txn.open_table(FILE_STORAGE_KEYS)?;
                    keys.remove(file.storage_key.as_str())?;
                }
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    /// Get all files, in no particular order
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            files.push(file);
        }

        Ok(files)
    }

    /// One page of listed files (completed or deleted), newest first, plus the
    /// total number of listed files. `page` is 1-based.
    pub fn list_page(&self, page: u32, limit: u32) -> Result<(Vec<FileRecord>, u64), DatabaseError> {
        let mut listed: Vec<FileRecord> = self
            .get_all_files()?
            .into_iter()
            .filter(|f| f.upload_status.is_listed())
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = listed.len() as u64;
        let offset = (page.max(1) as usize - 1) * limit as usize;
        let items = listed
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok((items, total))
    }

    /// Completed files whose expiry lies strictly before `now`.
    pub fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<FileRecord>, DatabaseError> {
        Ok(self
            .get_all_files()?
            .into_iter()
            .filter(|f| f.upload_status == UploadStatus::Completed && f.expires_at < now)
            .collect())
    }

    /// Usage figures over completed files. The expiring counters include
    /// files already past their expiry that have not been swept yet.
    pub fn compute_stats(
        &self,
        total_capacity: u64,
        now: DateTime<Utc>,
    ) -> Result<StorageStats, DatabaseError> {
        let day = now + Duration::hours(24);
        let week = now + Duration::days(7);

        let mut stats = StorageStats {
            used_bytes: 0,
            total_bytes: total_capacity,
            file_count: 0,
            expiring_within_24h: 0,
            expiring_within_7d: 0,
            usage_percent: 0.0,
        };

        for file in self.get_all_files()? {
            if file.upload_status != UploadStatus::Completed {
                continue;
            }
            stats.used_bytes += file.size;
            stats.file_count += 1;
            if file.expires_at < day {
                stats.expiring_within_24h += 1;
            }
            if file.expires_at < week {
                stats.expiring_within_7d += 1;
            }
        }

        if total_capacity > 0 {
            stats.usage_percent = stats.used_bytes as f64 / total_capacity as f64 * 100.0;
        }
        Ok(stats)
    }
}
