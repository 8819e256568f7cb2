use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::derive_storage_key;
use crate::state_machine::UploadStatus;

/// How long an uploaded file lives. Stored and sent over the wire as its
/// numeric code: days for the regular values, `-30` for the 30-second test
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ExpiresIn {
    OneDay,
    ThreeDays,
    #[default]
    SevenDays,
    ThirtyDays,
    /// Short lifetime for exercising the expiry path by hand.
    ThirtySeconds,
}

impl ExpiresIn {
    pub const ALL: [ExpiresIn; 5] = [
        ExpiresIn::OneDay,
        ExpiresIn::ThreeDays,
        ExpiresIn::SevenDays,
        ExpiresIn::ThirtyDays,
        ExpiresIn::ThirtySeconds,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ExpiresIn::OneDay),
            3 => Some(ExpiresIn::ThreeDays),
            7 => Some(ExpiresIn::SevenDays),
            30 => Some(ExpiresIn::ThirtyDays),
            -30 => Some(ExpiresIn::ThirtySeconds),
            _ => None,
        }
    }

    /// Unknown codes fall back to seven days.
    pub fn normalize(code: i64) -> Self {
        Self::from_code(code).unwrap_or_default()
    }

    pub fn code(self) -> i64 {
        match self {
            ExpiresIn::OneDay => 1,
            ExpiresIn::ThreeDays => 3,
            ExpiresIn::SevenDays => 7,
            ExpiresIn::ThirtyDays => 30,
            ExpiresIn::ThirtySeconds => -30,
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            ExpiresIn::OneDay => Duration::days(1),
            ExpiresIn::ThreeDays => Duration::days(3),
            ExpiresIn::SevenDays => Duration::days(7),
            ExpiresIn::ThirtyDays => Duration::days(30),
            ExpiresIn::ThirtySeconds => Duration::seconds(30),
        }
    }
}

impl From<i64> for ExpiresIn {
    fn from(code: i64) -> Self {
        Self::normalize(code)
    }
}

impl From<ExpiresIn> for i64 {
    fn from(value: ExpiresIn) -> Self {
        value.code()
    }
}

/// A file record stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    /// Client-supplied name, only used for display and Content-Disposition.
    pub filename: String,
    pub storage_key: String,
    /// Declared by the client, never checked against the stored bytes.
    pub size: u64,
    pub content_type: String,
    pub expires_in: ExpiresIn,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub upload_status: UploadStatus,
    #[serde(default)]
    pub short_code: String,
}

impl FileRecord {
    /// Build a fresh `pending` record. The short code is left empty; it is
    /// assigned when the record is inserted.
    pub fn new_pending(
        filename: &str,
        content_type: &str,
        size: u64,
        expires_in: ExpiresIn,
        now: DateTime<Utc>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let storage_key = derive_storage_key(&id, filename);
        Self {
            id,
            filename: filename.to_string(),
            storage_key,
            size,
            content_type: content_type.to_string(),
            expires_in,
            created_at: now,
            expires_at: now + expires_in.duration(),
            upload_status: UploadStatus::Pending,
            short_code: String::new(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry; negative once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// Per-IP admission state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub ip: String,
    pub request_count: u32,
    pub window_start: DateTime<Utc>,
    pub failed_attempts: u32,
    #[serde(default)]
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    pub fn new(ip: &str, now: DateTime<Utc>) -> Self {
        Self {
            ip: ip.to_string(),
            request_count: 0,
            window_start: now,
            failed_attempts: 0,
            blocked_until: None,
        }
    }
}

/// Aggregate over completed files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub file_count: u64,
    pub expiring_within_24h: u64,
    pub expiring_within_7d: u64,
    pub usage_percent: f64,
}
