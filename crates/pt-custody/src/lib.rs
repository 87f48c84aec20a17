//! Custody lifecycle workflow: create, transfer, sell.
//!
//! The service validates preconditions against the provenance store, mints
//! signatures, submits the matching ledger transactions, and commits local
//! state only after the ledger accepted them. A failed submission leaves
//! the store untouched; the one genuinely partial case (ship accepted,
//! receive failed) is persisted on the record and surfaced as its own
//! error so operators can reconcile.

mod config;
mod error;
mod locks;
mod service;

pub use config::{CustodyConfig, LedgerSettings};
pub use error::CustodyError;
pub use service::{bootstrap, CreateReceipt, CustodyService, SoldReceipt, TransferReceipt};
