use thiserror::Error;

/// Why a ledger submission failed.
///
/// A failed submission is a no-op with respect to local state: callers must
/// not mutate the provenance store on any of these.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("ledger endpoint unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("insufficient balance for transaction fees: {reason}")]
    InsufficientFunds { reason: String },

    #[error("transaction rejected by the ledger: {reason}")]
    Rejected { reason: String },

    #[error("no receipt for transaction {tx_id} within {waited_ms}ms")]
    ReceiptTimeout { tx_id: String, waited_ms: u64 },

    #[error("malformed ledger response: {reason}")]
    Malformed { reason: String },
}

/// A read-only ledger call could not complete.
///
/// Distinct from [`SubmissionError`]: callers on the verification path
/// degrade their result instead of failing when a read is unavailable.
#[derive(Debug, Error)]
#[error("ledger read unavailable: {reason}")]
pub struct ReadUnavailable {
    pub reason: String,
}
