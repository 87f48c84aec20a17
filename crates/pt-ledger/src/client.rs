//! High-level ledger client: sequencing, fees, submit modes, normalization.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pt_record::LedgerBatchView;
use sha3::{Digest, Sha3_256};
use tracing::{debug, info, warn};

use crate::account::AccountKey;
use crate::error::{ReadUnavailable, SubmissionError};
use crate::rpc::LedgerRpc;
use crate::types::{FeeConfig, LedgerOp, SignedTransaction, TxEnvelope};

/// How long [`LedgerClient::submit`] waits for the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Return once the network accepted the transaction into its pending
    /// pool. State is not final yet.
    Accepted,
    /// Additionally wait for an inclusion receipt. Reconciliation-sensitive
    /// transitions use this.
    Confirmed,
}

/// Submits custody transactions and reads batch state.
///
/// All submissions from this client's account pass through one critical
/// section covering nonce acquisition and send: ledger sequence numbers are
/// not idempotent, so two in-flight submissions must never observe the same
/// pending count.
pub struct LedgerClient<R> {
    rpc: R,
    account: AccountKey,
    fees: FeeConfig,
    chain_id: u64,
    receipt_poll: Duration,
    receipt_timeout: Duration,
    submit_lock: Mutex<()>,
}

impl<R: LedgerRpc> LedgerClient<R> {
    pub fn new(rpc: R, account: AccountKey, fees: FeeConfig, chain_id: u64) -> Self {
        LedgerClient {
            rpc,
            account,
            fees,
            chain_id,
            receipt_poll: Duration::from_millis(200),
            receipt_timeout: Duration::from_secs(30),
            submit_lock: Mutex::new(()),
        }
    }

    /// Override receipt polling cadence and patience.
    pub fn with_receipt_timing(mut self, poll: Duration, timeout: Duration) -> Self {
        self.receipt_poll = poll;
        self.receipt_timeout = timeout;
        self
    }

    /// Ledger address this client submits from.
    pub fn account_address(&self) -> &str {
        self.account.address()
    }

    /// Transport handle, mainly for tests driving an in-memory ledger.
    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Sign and submit one custody operation, returning its transaction id.
    ///
    /// A timeout or rejection surfaces as an error; the caller treats any
    /// failure as a no-op for local state.
    pub fn submit(&self, op: LedgerOp, mode: SubmitMode) -> Result<String, SubmissionError> {
        let method = op.method();
        let batch_no = op.batch_no().to_string();

        let tx_id = {
            let _serialize = self.submit_lock.lock();
            let nonce = self.rpc.pending_nonce(self.account.address())?;
            let tx = self.sign_envelope(op, nonce);
            debug!(method, batch_no = %batch_no, nonce, tx_id = %tx.tx_id, "submitting ledger transaction");
            self.rpc.send_transaction(&tx)?
        };
        info!(method, batch_no = %batch_no, tx_id = %tx_id, "ledger accepted transaction");

        // Receipt polling happens outside the critical section: waiting for
        // inclusion must not stall other submissions' nonce acquisition.
        if mode == SubmitMode::Confirmed {
            self.wait_for_receipt(&tx_id)?;
        }
        Ok(tx_id)
    }

    /// Read and normalize the ledger's view of a batch.
    pub fn read_batch(&self, batch_no: &str) -> Result<Option<LedgerBatchView>, ReadUnavailable> {
        match self.rpc.batch(batch_no)? {
            Some(raw) => raw.normalize().map(Some),
            None => Ok(None),
        }
    }

    fn sign_envelope(&self, call: LedgerOp, nonce: u64) -> SignedTransaction {
        let envelope = TxEnvelope {
            account: self.account.address().to_string(),
            nonce,
            chain_id: self.chain_id,
            gas_limit: self.fees.gas_limit,
            max_fee_per_gas: self.fees.max_fee_per_gas,
            max_priority_fee_per_gas: self.fees.max_priority_fee_per_gas,
            call,
        };
        let signature = self.account.sign(&envelope.canonical_bytes());
        let tx_id = derive_tx_id(&envelope, &signature);
        SignedTransaction {
            envelope,
            signature,
            tx_id,
        }
    }

    fn wait_for_receipt(&self, tx_id: &str) -> Result<(), SubmissionError> {
        let started = Instant::now();
        loop {
            match self.rpc.transaction_receipt(tx_id) {
                Ok(Some(receipt)) if receipt.success => return Ok(()),
                Ok(Some(receipt)) => {
                    return Err(SubmissionError::Rejected {
                        reason: format!(
                            "transaction {tx_id} reverted in block {:?}",
                            receipt.block
                        ),
                    })
                }
                Ok(None) => {}
                // Transient read outages while polling are retried until
                // the deadline; the transaction may confirm regardless.
                Err(err) => warn!(tx_id = %tx_id, error = %err, "receipt poll failed"),
            }
            if started.elapsed() >= self.receipt_timeout {
                return Err(SubmissionError::ReceiptTimeout {
                    tx_id: tx_id.to_string(),
                    waited_ms: self.receipt_timeout.as_millis() as u64,
                });
            }
            std::thread::sleep(self.receipt_poll);
        }
    }
}

/// Transaction identifier: Sha3-256 over the canonical envelope bytes and
/// the account signature, hex with a `0x` prefix.
fn derive_tx_id(envelope: &TxEnvelope, signature: &str) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(envelope.canonical_bytes());
    hasher.update(signature.as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::memory::{MemoryLedger, WireShape};
    use pt_record::CustodyState;

    fn make_client() -> LedgerClient<MemoryLedger> {
        LedgerClient::new(
            MemoryLedger::new(),
            AccountKey::generate(),
            FeeConfig::default(),
            1337,
        )
        .with_receipt_timing(Duration::from_millis(1), Duration::from_millis(50))
    }

    fn create_op(batch_no: &str) -> LedgerOp {
        LedgerOp::CreateBatch {
            batch_no: batch_no.to_string(),
            drug_name: "Paracetamol 500mg".to_string(),
            manufacture_date: 1_700_000_000,
            expiry_date: 1_800_000_000,
            distributor: "0xdistributor".to_string(),
        }
    }

    #[test]
    fn test_submit_returns_tx_id_and_creates_batch() {
        let client = make_client();
        let tx_id = client.submit(create_op("B1"), SubmitMode::Accepted).unwrap();
        assert!(tx_id.starts_with("0x"));

        let view = client.read_batch("B1").unwrap().unwrap();
        assert_eq!(view.state, CustodyState::Created);
        assert_eq!(view.manufacturer, client.account_address());
    }

    #[test]
    fn test_read_batch_not_found_is_none() {
        let client = make_client();
        assert!(client.read_batch("missing").unwrap().is_none());
    }

    #[test]
    fn test_read_batch_normalizes_both_wire_shapes() {
        let client = make_client();
        client.submit(create_op("B1"), SubmitMode::Accepted).unwrap();

        client.rpc().set_wire_shape(WireShape::Keyed);
        let keyed = client.read_batch("B1").unwrap().unwrap();
        client.rpc().set_wire_shape(WireShape::Positional);
        let positional = client.read_batch("B1").unwrap().unwrap();

        assert_eq!(keyed, positional);
    }

    #[test]
    fn test_confirmed_submit_waits_for_receipt() {
        let client = make_client();
        client
            .submit(create_op("B1"), SubmitMode::Confirmed)
            .unwrap();
        let tx_id = client
            .submit(
                LedgerOp::Ship {
                    batch_no: "B1".to_string(),
                },
                SubmitMode::Confirmed,
            )
            .unwrap();
        let receipt = client.rpc().transaction_receipt(&tx_id).unwrap().unwrap();
        assert!(receipt.success);
    }

    #[test]
    fn test_confirmed_submit_times_out_when_receipt_withheld() {
        let client = make_client();
        client.rpc().withhold_receipts(true);

        let err = client
            .submit(create_op("B1"), SubmitMode::Confirmed)
            .unwrap_err();
        assert!(matches!(err, SubmissionError::ReceiptTimeout { .. }));
    }

    #[test]
    fn test_failed_submission_propagates_rejection() {
        let client = make_client();
        client.rpc().fail_method("createBatch", "node says no");

        let err = client
            .submit(create_op("B1"), SubmitMode::Accepted)
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { .. }));
        assert!(client.read_batch("B1").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_submissions_never_reuse_a_nonce() {
        // MemoryLedger rejects any nonce that is not exactly the next
        // expected one, so interleaved fetch/send would fail one side.
        let client = Arc::new(make_client());
        for i in 0..8 {
            client
                .submit(create_op(&format!("SEED{i}")), SubmitMode::Accepted)
                .unwrap();
        }

        let mut handles = Vec::new();
        for thread in 0..4 {
            let client = Arc::clone(&client);
            handles.push(std::thread::spawn(move || {
                let mut ids = Vec::new();
                for i in 0..10 {
                    let batch_no = format!("T{thread}-{i}");
                    ids.push(client.submit(create_op(&batch_no), SubmitMode::Accepted).unwrap());
                }
                ids
            }));
        }

        let mut all_ids: Vec<String> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        let before = all_ids.len();
        all_ids.sort();
        all_ids.dedup();
        assert_eq!(all_ids.len(), before);
    }
}
