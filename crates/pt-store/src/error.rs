use thiserror::Error;

/// Store mutation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("batch {batch_no} already exists")]
    DuplicateBatch { batch_no: String },

    #[error("batch {batch_no} not found")]
    BatchNotFound { batch_no: String },

    /// The record's owner is no longer the one the caller validated
    /// against. Raised instead of clobbering a concurrent or late commit.
    #[error("batch {batch_no} is owned by {actual}, expected {expected}")]
    OwnerConflict {
        batch_no: String,
        expected: String,
        actual: String,
    },
}
