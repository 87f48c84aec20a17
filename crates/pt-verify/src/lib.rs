//! Batch verification: one verdict from four independent checks.
//!
//! A verification request reads the local mirror, re-checks the record's
//! signature, compares the presented physical token, and best-effort reads
//! the ledger's view of the same batch. The four outcomes are independent:
//! none of them short-circuits the others, and a ledger outage degrades the
//! report instead of failing it. Verification never mutates anything.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pt_ledger::{LedgerClient, LedgerRpc};
use pt_record::{record_payload, LedgerBatchView};
use pt_sign::Signer;
use pt_store::ProvenanceStore;
use serde::Serialize;
use tracing::{debug, warn};

/// Outcome of a verification request.
///
/// `ledger: None` means the ledger could not be consulted (unreachable or
/// no record); the remaining fields are still meaningful on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub batch_no: String,
    pub local_record_exists: bool,
    pub signature_valid: bool,
    pub token_match: bool,
    pub ledger: Option<LedgerBatchView>,
    pub verified_at: DateTime<Utc>,
}

/// Read-only engine combining store, signer, and ledger reads.
pub struct VerificationEngine<R> {
    store: Arc<ProvenanceStore>,
    signer: Arc<Signer>,
    ledger: Arc<LedgerClient<R>>,
}

impl<R: LedgerRpc> VerificationEngine<R> {
    pub fn new(
        store: Arc<ProvenanceStore>,
        signer: Arc<Signer>,
        ledger: Arc<LedgerClient<R>>,
    ) -> Self {
        VerificationEngine {
            store,
            signer,
            ledger,
        }
    }

    /// Verify a presented batch identifier and physical token.
    pub fn verify(&self, batch_no: &str, presented_token: &str) -> VerificationReport {
        let local = self.store.get(batch_no);

        let (signature_valid, token_match) = match &local {
            Some(record) => {
                // The signature covers the creation-time canonical payload,
                // rebuilt here from the record's immutable fields.
                let payload = record_payload(record);
                let signature_valid = self
                    .signer
                    .verify(payload.as_bytes(), &record.digital_signature);
                // Byte-exact comparison, case-sensitive, no normalization.
                let token_match = record.scratch_code == presented_token;
                (signature_valid, token_match)
            }
            None => (false, false),
        };

        let ledger = match self.ledger.read_batch(batch_no) {
            Ok(view) => view,
            Err(err) => {
                warn!(batch_no = %batch_no, error = %err, "ledger unavailable during verification");
                None
            }
        };

        debug!(
            batch_no = %batch_no,
            local = local.is_some(),
            signature_valid,
            token_match,
            ledger = ledger.is_some(),
            "verification completed"
        );

        VerificationReport {
            batch_no: batch_no.to_string(),
            local_record_exists: local.is_some(),
            signature_valid,
            token_match,
            ledger,
            verified_at: Utc::now(),
        }
    }
}
