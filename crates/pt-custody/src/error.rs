use pt_ledger::SubmissionError;
use pt_record::RecordError;
use pt_store::StoreError;
use thiserror::Error;

/// Failures surfaced by the custody workflow.
///
/// Ledger and store failures pass through unchanged so the boundary can
/// tell which collaborator refused. Partial transfers get their own
/// variant; collapsing them into a generic ledger error would hide the
/// accepted ship transaction from operators.
#[derive(Debug, Error)]
pub enum CustodyError {
    #[error(transparent)]
    Validation(#[from] RecordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] SubmissionError),

    #[error("scratch code mismatch for batch {batch_no}")]
    TokenMismatch { batch_no: String },

    /// Ship landed on the ledger, receive did not. The record carries the
    /// persisted marker; retrying the same destination resumes the
    /// transfer.
    #[error("transfer of batch {batch_no} partially applied: ship tx {ship_tx} accepted, receive failed")]
    PartialTransfer {
        batch_no: String,
        ship_tx: String,
        #[source]
        receive_error: SubmissionError,
    },

    /// A different transfer is already half-applied for this batch.
    #[error("batch {batch_no} has a pending transfer to {pending_to}")]
    PendingTransfer {
        batch_no: String,
        pending_to: String,
    },
}
