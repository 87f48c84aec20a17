//! In-process ledger for tests and local development.
//!
//! Behaves like a strict remote node: sequence numbers must arrive in
//! order, custody transitions are forward-only with no skips, and reads can
//! be served in either wire encoding. Failure injection covers the cases a
//! real node produces (rejection per method, total outage of reads,
//! withheld receipts).

use std::collections::HashMap;

use parking_lot::Mutex;
use pt_record::CustodyState;

use crate::error::{ReadUnavailable, SubmissionError};
use crate::rpc::LedgerRpc;
use crate::types::{KeyedBatch, LedgerOp, PositionalBatch, RawBatch, SignedTransaction, TxReceipt};

/// Which encoding [`MemoryLedger`] answers batch reads with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireShape {
    #[default]
    Keyed,
    Positional,
}

#[derive(Debug, Clone)]
struct BatchEntry {
    drug_name: String,
    manufacture_date: i64,
    expiry_date: i64,
    manufacturer: String,
    distributor: String,
    pharmacy: String,
    state: CustodyState,
}

#[derive(Default)]
struct MemoryState {
    batches: HashMap<String, BatchEntry>,
    nonces: HashMap<String, u64>,
    receipts: HashMap<String, TxReceipt>,
    height: u64,
    wire_shape: WireShape,
    fail_methods: HashMap<String, String>,
    reads_unavailable: bool,
    withhold_receipts: bool,
}

/// See module docs.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        MemoryLedger::default()
    }

    pub fn with_wire_shape(shape: WireShape) -> Self {
        let ledger = MemoryLedger::new();
        ledger.set_wire_shape(shape);
        ledger
    }

    /// Select the encoding for subsequent batch reads.
    pub fn set_wire_shape(&self, shape: WireShape) {
        self.state.lock().wire_shape = shape;
    }

    /// Reject every subsequent submission of `method` with `reason`.
    pub fn fail_method(&self, method: &str, reason: &str) {
        self.state
            .lock()
            .fail_methods
            .insert(method.to_string(), reason.to_string());
    }

    /// Clear all injected submission failures.
    pub fn clear_failures(&self) {
        self.state.lock().fail_methods.clear();
    }

    /// Make read-only calls fail until cleared.
    pub fn set_reads_unavailable(&self, unavailable: bool) {
        self.state.lock().reads_unavailable = unavailable;
    }

    /// Accept submissions but never produce receipts for them.
    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().withhold_receipts = withhold;
    }

    /// Number of transactions this ledger has included.
    pub fn height(&self) -> u64 {
        self.state.lock().height
    }
}

fn rejected(reason: impl Into<String>) -> SubmissionError {
    SubmissionError::Rejected {
        reason: reason.into(),
    }
}

fn apply(state: &mut MemoryState, tx: &SignedTransaction) -> Result<(), SubmissionError> {
    match &tx.envelope.call {
        LedgerOp::CreateBatch {
            batch_no,
            drug_name,
            manufacture_date,
            expiry_date,
            distributor,
        } => {
            if state.batches.contains_key(batch_no) {
                return Err(rejected(format!("batch {batch_no} already exists")));
            }
            state.batches.insert(
                batch_no.clone(),
                BatchEntry {
                    drug_name: drug_name.clone(),
                    manufacture_date: *manufacture_date,
                    expiry_date: *expiry_date,
                    manufacturer: tx.envelope.account.clone(),
                    distributor: distributor.clone(),
                    pharmacy: String::new(),
                    state: CustodyState::Created,
                },
            );
            Ok(())
        }
        LedgerOp::Ship { batch_no } => {
            transition(state, batch_no, CustodyState::Created, CustodyState::Shipped)
        }
        LedgerOp::ReceiveAtPharmacy { batch_no, pharmacy } => {
            transition(
                state,
                batch_no,
                CustodyState::Shipped,
                CustodyState::Received,
            )?;
            if let Some(entry) = state.batches.get_mut(batch_no) {
                entry.pharmacy = pharmacy.clone();
            }
            Ok(())
        }
        LedgerOp::MarkSold { batch_no } => {
            transition(state, batch_no, CustodyState::Received, CustodyState::Sold)
        }
    }
}

fn transition(
    state: &mut MemoryState,
    batch_no: &str,
    from: CustodyState,
    to: CustodyState,
) -> Result<(), SubmissionError> {
    let entry = state
        .batches
        .get_mut(batch_no)
        .ok_or_else(|| rejected(format!("unknown batch {batch_no}")))?;
    if entry.state != from {
        return Err(rejected(format!(
            "batch {batch_no} is {:?}, cannot move {from:?} -> {to:?}",
            entry.state
        )));
    }
    entry.state = to;
    Ok(())
}

impl LedgerRpc for MemoryLedger {
    fn pending_nonce(&self, account: &str) -> Result<u64, SubmissionError> {
        Ok(self.state.lock().nonces.get(account).copied().unwrap_or(0))
    }

    fn send_transaction(&self, tx: &SignedTransaction) -> Result<String, SubmissionError> {
        let mut state = self.state.lock();

        if let Some(reason) = state.fail_methods.get(tx.envelope.call.method()) {
            return Err(rejected(reason.clone()));
        }

        let expected = state
            .nonces
            .get(&tx.envelope.account)
            .copied()
            .unwrap_or(0);
        if tx.envelope.nonce != expected {
            return Err(rejected(format!(
                "nonce {} for {} is stale or reused, expected {expected}",
                tx.envelope.nonce, tx.envelope.account
            )));
        }

        apply(&mut state, tx)?;

        state.nonces.insert(tx.envelope.account.clone(), expected + 1);
        state.height += 1;
        if !state.withhold_receipts {
            let receipt = TxReceipt {
                tx_id: tx.tx_id.clone(),
                success: true,
                block: Some(state.height),
            };
            state.receipts.insert(tx.tx_id.clone(), receipt);
        }
        Ok(tx.tx_id.clone())
    }

    fn transaction_receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>, ReadUnavailable> {
        let state = self.state.lock();
        if state.reads_unavailable {
            return Err(ReadUnavailable {
                reason: "injected read outage".to_string(),
            });
        }
        Ok(state.receipts.get(tx_id).cloned())
    }

    fn batch(&self, batch_no: &str) -> Result<Option<RawBatch>, ReadUnavailable> {
        let state = self.state.lock();
        if state.reads_unavailable {
            return Err(ReadUnavailable {
                reason: "injected read outage".to_string(),
            });
        }
        let Some(entry) = state.batches.get(batch_no) else {
            return Ok(None);
        };
        let raw = match state.wire_shape {
            WireShape::Keyed => RawBatch::Keyed(KeyedBatch {
                drug_name: entry.drug_name.clone(),
                batch_no: batch_no.to_string(),
                manufacture_date: entry.manufacture_date,
                expiry_date: entry.expiry_date,
                manufacturer: entry.manufacturer.clone(),
                distributor: entry.distributor.clone(),
                pharmacy: entry.pharmacy.clone(),
                state: entry.state.code(),
            }),
            WireShape::Positional => RawBatch::Positional(PositionalBatch(
                entry.drug_name.clone(),
                batch_no.to_string(),
                entry.manufacture_date,
                entry.expiry_date,
                entry.manufacturer.clone(),
                entry.distributor.clone(),
                entry.pharmacy.clone(),
                entry.state.code(),
            )),
        };
        Ok(Some(raw))
    }
}
