//! Provenance record data model and canonical signing payloads.
//!
//! A [`ProvenanceRecord`] describes one manufactured batch: its origin
//! fields, the physical scratch code issued for it, the digital signature
//! minted at creation, the ledger transaction identifiers recorded for each
//! custody step, and the custody-transition audit trail.
//!
//! [`canonical`] builds the deterministic payloads that are signed and
//! verified. Both sides must produce the same bytes for the same record, so
//! the encoding is fixed: compact JSON with keys in lexicographic order.

mod canonical;
mod types;

pub use canonical::{label_payload, record_payload, signing_payload, transfer_payload};
pub use types::{
    CustodyEvent, CustodyState, LedgerBatchView, LedgerTxs, NewBatch, PartialTransfer,
    ProvenanceRecord, RecordError,
};
