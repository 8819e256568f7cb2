//! Upload status state machine for file records.
//!
//! A record moves along `pending → uploading → completed → deleted` or skips
//! `uploading` for single-shot uploads. Nothing ever moves backwards.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Deleted,
}

impl UploadStatus {
    fn rank(self) -> u8 {
        match self {
            UploadStatus::Pending => 0,
            UploadStatus::Uploading => 1,
            UploadStatus::Completed => 2,
            UploadStatus::Deleted => 3,
        }
    }

    /// Whether `self → next` is a legal transition. Re-applying the current
    /// status is allowed and treated as a no-op by the store.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        if self == next {
            return true;
        }
        match (self, next) {
            // deleted is only reachable from completed
            (_, UploadStatus::Deleted) => self == UploadStatus::Completed,
            _ => next.rank() > self.rank(),
        }
    }

    /// Records in these states show up in the file listing.
    pub fn is_listed(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Deleted)
    }

    /// An upload still in flight; it can be cancelled.
    pub fn is_in_flight(self) -> bool {
        matches!(self, UploadStatus::Pending | UploadStatus::Uploading)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two ways a file leaves the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// User-initiated: the object and the record row are both removed.
    Hard,
    /// Expiry sweep: the object is removed, the row stays with status `deleted`.
    Soft,
}

impl Deletion {
    pub fn keeps_record(self) -> bool {
        matches!(self, Deletion::Soft)
    }
}

#[cfg(test)]
mod tests {
    use super::UploadStatus::*;
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(Pending.can_transition_to(Uploading));
        assert!(Pending.can_transition_to(Completed));
        assert!(Uploading.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Deleted));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!Uploading.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Uploading));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Deleted.can_transition_to(Completed));
        assert!(!Deleted.can_transition_to(Pending));
    }

    #[test]
    fn test_deleted_only_from_completed() {
        assert!(!Pending.can_transition_to(Deleted));
        assert!(!Uploading.can_transition_to(Deleted));
    }

    #[test]
    fn test_same_state_is_noop() {
        for s in [Pending, Uploading, Completed, Deleted] {
            assert!(s.can_transition_to(s));
        }
    }

    #[test]
    fn test_listing_eligibility() {
        assert!(!Pending.is_listed());
        assert!(!Uploading.is_listed());
        assert!(Completed.is_listed());
        assert!(Deleted.is_listed());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Uploading).unwrap(), "\"uploading\"");
        assert_eq!(Completed.to_string(), "completed");
    }

    #[test]
    fn test_deletion_variants() {
        assert!(Deletion::Soft.keeps_record());
        assert!(!Deletion::Hard.keeps_record());
    }
}
