//! Ledger client: ordered transaction submission and batch-state reads.
//!
//! The ledger itself is an external append-only service reachable over
//! JSON-RPC; this crate owns everything on the near side of that boundary:
//! the account key and its transaction signatures, sequence-number
//! discipline (nonce fetch and send never interleave across submissions),
//! fee parameters, optional receipt confirmation, and the normalization of
//! the ledger's two batch wire encodings into one [`LedgerBatchView`].
//!
//! [`LedgerRpc`] is the transport seam. [`HttpLedger`] talks to a real
//! endpoint; [`MemoryLedger`] is a full in-process stand-in for tests and
//! local development.
//!
//! [`LedgerBatchView`]: pt_record::LedgerBatchView

mod account;
mod client;
mod error;
mod memory;
mod rpc;
mod types;

pub use account::{AccountKey, AccountKeyError};
pub use client::{LedgerClient, SubmitMode};
pub use error::{ReadUnavailable, SubmissionError};
pub use memory::{MemoryLedger, WireShape};
pub use rpc::{HttpLedger, LedgerRpc};
pub use types::{
    FeeConfig, KeyedBatch, LedgerOp, PositionalBatch, RawBatch, SignedTransaction, TxEnvelope,
    TxReceipt, GWEI,
};
