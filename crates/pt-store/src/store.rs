//! Map-backed store with interior synchronization.

use std::collections::HashMap;

use parking_lot::RwLock;
use pt_record::{CustodyEvent, PartialTransfer, ProvenanceRecord};
use tracing::{debug, info};

use crate::error::StoreError;

/// In-memory mapping from batch identifier to provenance record.
///
/// Records are append-only in spirit: there is no delete operation, and
/// after creation only `current_owner`, the transaction identifier slots,
/// the custody log, and the partial-transfer marker change.
#[derive(Default)]
pub struct ProvenanceStore {
    records: RwLock<HashMap<String, ProvenanceRecord>>,
}

impl ProvenanceStore {
    pub fn new() -> Self {
        ProvenanceStore::default()
    }

    /// Insert a freshly minted record. Fails without touching existing
    /// state when the batch identifier is already present.
    pub fn create(&self, record: ProvenanceRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.contains_key(&record.batch_no) {
            return Err(StoreError::DuplicateBatch {
                batch_no: record.batch_no,
            });
        }
        info!(batch_no = %record.batch_no, owner = %record.current_owner, "record created");
        records.insert(record.batch_no.clone(), record);
        Ok(())
    }

    /// Cloned record for a batch, if mirrored locally.
    pub fn get(&self, batch_no: &str) -> Option<ProvenanceRecord> {
        self.records.read().get(batch_no).cloned()
    }

    pub fn contains(&self, batch_no: &str) -> bool {
        self.records.read().contains_key(batch_no)
    }

    /// Commit a completed custody transfer in one atomic update.
    ///
    /// `expected_owner` re-validates the state the caller based its ledger
    /// submissions on; a mismatch means another transition landed in the
    /// meantime and this commit must not apply.
    pub fn commit_transfer(
        &self,
        batch_no: &str,
        expected_owner: &str,
        new_owner: &str,
        ship_tx: String,
        receive_tx: String,
        event: CustodyEvent,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(batch_no)
            .ok_or_else(|| StoreError::BatchNotFound {
                batch_no: batch_no.to_string(),
            })?;
        if record.current_owner != expected_owner {
            return Err(StoreError::OwnerConflict {
                batch_no: batch_no.to_string(),
                expected: expected_owner.to_string(),
                actual: record.current_owner.clone(),
            });
        }
        record.current_owner = new_owner.to_string();
        record.ledger_txs.ship_tx = Some(ship_tx);
        record.ledger_txs.receive_tx = Some(receive_tx);
        record.custody_log.push(event);
        record.pending_transfer = None;
        info!(batch_no = %batch_no, from = %expected_owner, to = %new_owner, "custody transferred");
        Ok(())
    }

    /// Persist the partial-failure marker for a transfer whose ship step
    /// landed but whose receive step did not.
    pub fn mark_partial_transfer(
        &self,
        batch_no: &str,
        partial: PartialTransfer,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(batch_no)
            .ok_or_else(|| StoreError::BatchNotFound {
                batch_no: batch_no.to_string(),
            })?;
        debug!(batch_no = %batch_no, to = %partial.to_owner, "partial transfer recorded");
        record.pending_transfer = Some(partial);
        Ok(())
    }

    /// Record the terminal sale in one atomic update.
    pub fn record_sold(
        &self,
        batch_no: &str,
        expected_owner: &str,
        sold_tx: String,
        event: CustodyEvent,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(batch_no)
            .ok_or_else(|| StoreError::BatchNotFound {
                batch_no: batch_no.to_string(),
            })?;
        if record.current_owner != expected_owner {
            return Err(StoreError::OwnerConflict {
                batch_no: batch_no.to_string(),
                expected: expected_owner.to_string(),
                actual: record.current_owner.clone(),
            });
        }
        record.ledger_txs.sold_tx = Some(sold_tx);
        record.custody_log.push(event);
        info!(batch_no = %batch_no, "batch marked sold");
        Ok(())
    }

    /// Cloned view of every record, for operator inspection.
    pub fn snapshot(&self) -> Vec<ProvenanceRecord> {
        let mut records: Vec<ProvenanceRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.batch_no.cmp(&b.batch_no));
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pt_record::LedgerTxs;

    fn make_record(batch_no: &str) -> ProvenanceRecord {
        ProvenanceRecord {
            batch_no: batch_no.to_string(),
            name: "Paracetamol 500mg".to_string(),
            manufacturer: "Acme Pharma".to_string(),
            manufacture_date: 1_700_000_000,
            expiry_date: 1_800_000_000,
            current_owner: "Acme Pharma".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap(),
            digital_signature: "c2ln".to_string(),
            scratch_code: "T1".to_string(),
            ledger_txs: LedgerTxs {
                create_tx: Some("0xcreate".to_string()),
                ..LedgerTxs::default()
            },
            custody_log: Vec::new(),
            pending_transfer: None,
        }
    }

    fn make_event(from: &str, to: &str) -> CustodyEvent {
        CustodyEvent {
            from_owner: from.to_string(),
            to_owner: to.to_string(),
            at: Utc.with_ymd_and_hms(2024, 1, 6, 9, 0, 0).unwrap(),
            signature: "dHJhbnNmZXI=".to_string(),
            ship_tx: Some("0xship".to_string()),
            receive_tx: Some("0xrecv".to_string()),
        }
    }

    #[test]
    fn test_create_then_get() {
        let store = ProvenanceStore::new();
        store.create(make_record("B1")).unwrap();

        let record = store.get("B1").unwrap();
        assert_eq!(record.current_owner, "Acme Pharma");
        assert!(store.get("B2").is_none());
    }

    #[test]
    fn test_double_create_fails_and_preserves_original() {
        let store = ProvenanceStore::new();
        store.create(make_record("B1")).unwrap();

        let mut intruder = make_record("B1");
        intruder.name = "Counterfeit".to_string();
        let err = store.create(intruder).unwrap_err();

        assert_eq!(
            err,
            StoreError::DuplicateBatch {
                batch_no: "B1".to_string()
            }
        );
        assert_eq!(store.get("B1").unwrap().name, "Paracetamol 500mg");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_commit_transfer_mutates_atomically() {
        let store = ProvenanceStore::new();
        store.create(make_record("B1")).unwrap();

        store
            .commit_transfer(
                "B1",
                "Acme Pharma",
                "City Pharmacy",
                "0xship".to_string(),
                "0xrecv".to_string(),
                make_event("Acme Pharma", "City Pharmacy"),
            )
            .unwrap();

        let record = store.get("B1").unwrap();
        assert_eq!(record.current_owner, "City Pharmacy");
        assert_eq!(record.ledger_txs.ship_tx.as_deref(), Some("0xship"));
        assert_eq!(record.ledger_txs.receive_tx.as_deref(), Some("0xrecv"));
        assert_eq!(record.custody_log.len(), 1);
        assert!(record.pending_transfer.is_none());
    }

    #[test]
    fn test_commit_transfer_missing_batch() {
        let store = ProvenanceStore::new();
        let err = store
            .commit_transfer(
                "nope",
                "a",
                "b",
                "0x1".to_string(),
                "0x2".to_string(),
                make_event("a", "b"),
            )
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::BatchNotFound {
                batch_no: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_commit_transfer_stale_owner_is_refused() {
        let store = ProvenanceStore::new();
        store.create(make_record("B1")).unwrap();
        store
            .commit_transfer(
                "B1",
                "Acme Pharma",
                "City Pharmacy",
                "0xship".to_string(),
                "0xrecv".to_string(),
                make_event("Acme Pharma", "City Pharmacy"),
            )
            .unwrap();

        // A second commit validated against the old owner must not apply.
        let err = store
            .commit_transfer(
                "B1",
                "Acme Pharma",
                "Other Pharmacy",
                "0xship2".to_string(),
                "0xrecv2".to_string(),
                make_event("Acme Pharma", "Other Pharmacy"),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::OwnerConflict { .. }));
        assert_eq!(store.get("B1").unwrap().current_owner, "City Pharmacy");
    }

    #[test]
    fn test_partial_transfer_marker_set_and_cleared() {
        let store = ProvenanceStore::new();
        store.create(make_record("B1")).unwrap();

        store
            .mark_partial_transfer(
                "B1",
                PartialTransfer {
                    to_owner: "City Pharmacy".to_string(),
                    ship_tx: "0xship".to_string(),
                    error: "receive rejected".to_string(),
                    at: Utc.with_ymd_and_hms(2024, 1, 6, 9, 0, 0).unwrap(),
                },
            )
            .unwrap();
        assert!(store.get("B1").unwrap().pending_transfer.is_some());
        // Owner untouched by the marker.
        assert_eq!(store.get("B1").unwrap().current_owner, "Acme Pharma");

        store
            .commit_transfer(
                "B1",
                "Acme Pharma",
                "City Pharmacy",
                "0xship".to_string(),
                "0xrecv".to_string(),
                make_event("Acme Pharma", "City Pharmacy"),
            )
            .unwrap();
        assert!(store.get("B1").unwrap().pending_transfer.is_none());
    }

    #[test]
    fn test_record_sold_sets_terminal_tx() {
        let store = ProvenanceStore::new();
        store.create(make_record("B1")).unwrap();

        store
            .record_sold(
                "B1",
                "Acme Pharma",
                "0xsold".to_string(),
                make_event("Acme Pharma", "Acme Pharma"),
            )
            .unwrap();
        let record = store.get("B1").unwrap();
        assert_eq!(record.ledger_txs.sold_tx.as_deref(), Some("0xsold"));
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let store = ProvenanceStore::new();
        store.create(make_record("B2")).unwrap();
        store.create(make_record("B1")).unwrap();

        let mut snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].batch_no, "B1");

        // Mutating the snapshot leaves the store untouched.
        snapshot[0].current_owner = "tampered".to_string();
        assert_eq!(store.get("B1").unwrap().current_owner, "Acme Pharma");
    }
}
