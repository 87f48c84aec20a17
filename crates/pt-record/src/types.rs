//! Record, custody state, and ledger view types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures raised before a record touches any collaborator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("expiry date {expiry_date} must be after manufacture date {manufacture_date}")]
    ExpiryBeforeManufacture {
        manufacture_date: i64,
        expiry_date: i64,
    },
}

/// Custody lifecycle of a batch, strictly forward-only.
///
/// The integer codes are the ledger's wire encoding for the state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CustodyState {
    Created,
    Shipped,
    Received,
    Sold,
}

impl CustodyState {
    /// Wire code used by the ledger for this state.
    pub fn code(self) -> u8 {
        match self {
            CustodyState::Created => 0,
            CustodyState::Shipped => 1,
            CustodyState::Received => 2,
            CustodyState::Sold => 3,
        }
    }

    /// Decode a ledger state code. Unknown codes are rejected, not clamped.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CustodyState::Created),
            1 => Some(CustodyState::Shipped),
            2 => Some(CustodyState::Received),
            3 => Some(CustodyState::Sold),
            _ => None,
        }
    }
}

/// Ledger transaction identifiers recorded for each lifecycle step.
///
/// Each slot is set exactly once, when the corresponding ledger submission
/// is accepted. Which slots are set implies the locally-known custody state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTxs {
    pub create_tx: Option<String>,
    pub ship_tx: Option<String>,
    pub receive_tx: Option<String>,
    pub sold_tx: Option<String>,
}

impl LedgerTxs {
    /// The furthest custody state these identifiers account for.
    pub fn state(&self) -> CustodyState {
        if self.sold_tx.is_some() {
            CustodyState::Sold
        } else if self.receive_tx.is_some() {
            CustodyState::Received
        } else if self.ship_tx.is_some() {
            CustodyState::Shipped
        } else {
            CustodyState::Created
        }
    }
}

/// One custody transition in a record's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyEvent {
    pub from_owner: String,
    pub to_owner: String,
    pub at: DateTime<Utc>,
    /// Signature over the transfer payload for this transition.
    pub signature: String,
    pub ship_tx: Option<String>,
    pub receive_tx: Option<String>,
}

/// Persisted marker for a transfer whose ship step was accepted by the
/// ledger but whose receive step failed.
///
/// The ship transition cannot be rolled back, so the record carries this
/// state until a retry to the same destination completes the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialTransfer {
    pub to_owner: String,
    pub ship_tx: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// The locally-mirrored, signed description of a batch's origin and custody.
///
/// `batch_no` is immutable once created. After creation, only
/// `current_owner`, the transaction identifier slots, the audit trail, and
/// the partial-transfer marker are mutated, and only by the custody
/// workflow after the corresponding ledger submission succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub batch_no: String,
    pub name: String,
    pub manufacturer: String,
    /// Unix seconds.
    pub manufacture_date: i64,
    /// Unix seconds. Strictly after `manufacture_date`.
    pub expiry_date: i64,
    pub current_owner: String,
    pub created_at: DateTime<Utc>,
    /// Base64 RSA-PSS signature over the creation-time canonical payload.
    pub digital_signature: String,
    /// Physical anti-counterfeit token, compared byte-exact.
    pub scratch_code: String,
    #[serde(default)]
    pub ledger_txs: LedgerTxs,
    #[serde(default)]
    pub custody_log: Vec<CustodyEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_transfer: Option<PartialTransfer>,
}

/// Input for minting a new provenance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub batch_no: String,
    pub name: String,
    pub manufacturer: String,
    pub manufacture_date: i64,
    pub expiry_date: i64,
    pub scratch_code: String,
    /// Ledger address the batch is created against. Defaults to the
    /// submitting account when absent.
    #[serde(default)]
    pub distributor: Option<String>,
}

impl NewBatch {
    /// Reject malformed input before any signing or ledger traffic.
    pub fn validate(&self) -> Result<(), RecordError> {
        for (field, value) in [
            ("batch_no", &self.batch_no),
            ("name", &self.name),
            ("manufacturer", &self.manufacturer),
            ("scratch_code", &self.scratch_code),
        ] {
            if value.trim().is_empty() {
                return Err(RecordError::MissingField { field });
            }
        }
        if self.expiry_date <= self.manufacture_date {
            return Err(RecordError::ExpiryBeforeManufacture {
                manufacture_date: self.manufacture_date,
                expiry_date: self.expiry_date,
            });
        }
        Ok(())
    }
}

/// The ledger's own projection of a batch.
///
/// The ledger is the sole writer of this view; this side only reads it and
/// submits transactions that make the ledger mutate it internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBatchView {
    pub drug_name: String,
    pub batch_no: String,
    pub manufacture_date: i64,
    pub expiry_date: i64,
    pub manufacturer: String,
    pub distributor: String,
    pub pharmacy: String,
    pub state: CustodyState,
}
