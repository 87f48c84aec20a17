//! Canonical signing payloads and the label payload.
//!
//! Signing and verification must feed byte-identical input to the signature
//! scheme, so every payload here is compact JSON with keys in lexicographic
//! order and a fixed timestamp encoding (RFC 3339, microsecond precision,
//! `Z` suffix). `BTreeMap` gives the key ordering; `serde_json::to_string`
//! gives the compact separators.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::types::ProvenanceRecord;

fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn canonical_json(fields: BTreeMap<&str, Value>) -> String {
    serde_json::to_string(&fields).expect("canonical payload serialization failed")
}

/// Canonical payload for a record's fields at signing time.
///
/// Field set: `batch_no, name, manufacturer, manufacture_date, expiry_date,
/// current_owner, timestamp`, serialized with keys sorted. `current_owner`
/// is the owner at signing time, which for a freshly minted record is the
/// manufacturer.
pub fn signing_payload(
    batch_no: &str,
    name: &str,
    manufacturer: &str,
    manufacture_date: i64,
    expiry_date: i64,
    current_owner: &str,
    timestamp: DateTime<Utc>,
) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("batch_no", Value::from(batch_no));
    fields.insert("current_owner", Value::from(current_owner));
    fields.insert("expiry_date", Value::from(expiry_date));
    fields.insert("manufacture_date", Value::from(manufacture_date));
    fields.insert("manufacturer", Value::from(manufacturer));
    fields.insert("name", Value::from(name));
    fields.insert("timestamp", Value::from(canonical_timestamp(timestamp)));
    canonical_json(fields)
}

/// Rebuild the creation-time canonical payload from a stored record.
///
/// Only immutable fields participate: the owner is the manufacturer (the
/// owner when the record was minted) and the timestamp is `created_at`, so
/// the signature stays verifiable after custody transitions mutate
/// `current_owner`.
pub fn record_payload(record: &ProvenanceRecord) -> String {
    signing_payload(
        &record.batch_no,
        &record.name,
        &record.manufacturer,
        record.manufacture_date,
        record.expiry_date,
        &record.manufacturer,
        record.created_at,
    )
}

/// Canonical payload for a custody transfer.
pub fn transfer_payload(
    batch_no: &str,
    from_owner: &str,
    to_owner: &str,
    at: DateTime<Utc>,
) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("batch_no", Value::from(batch_no));
    fields.insert("from_owner", Value::from(from_owner));
    fields.insert("timestamp", Value::from(canonical_timestamp(at)));
    fields.insert("to_owner", Value::from(to_owner));
    canonical_json(fields)
}

/// JSON text a label printer would encode for physical packaging.
pub fn label_payload(record: &ProvenanceRecord) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("batch_no", Value::from(record.batch_no.as_str()));
    fields.insert(
        "digital_signature",
        Value::from(record.digital_signature.as_str()),
    );
    fields.insert("manufacturer", Value::from(record.manufacturer.as_str()));
    fields.insert("name", Value::from(record.name.as_str()));
    fields.insert(
        "timestamp",
        Value::from(canonical_timestamp(record.created_at)),
    );
    canonical_json(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LedgerTxs;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 10, 30, 0).unwrap()
    }

    fn make_record() -> ProvenanceRecord {
        ProvenanceRecord {
            batch_no: "B1".to_string(),
            name: "Paracetamol 500mg".to_string(),
            manufacturer: "Acme Pharma".to_string(),
            manufacture_date: 1_700_000_000,
            expiry_date: 1_800_000_000,
            current_owner: "Acme Pharma".to_string(),
            created_at: fixed_time(),
            digital_signature: "c2lnbmF0dXJl".to_string(),
            scratch_code: "T1".to_string(),
            ledger_txs: LedgerTxs::default(),
            custody_log: Vec::new(),
            pending_transfer: None,
        }
    }

    #[test]
    fn test_signing_payload_keys_are_sorted_and_compact() {
        let payload = signing_payload(
            "B1",
            "Paracetamol 500mg",
            "Acme Pharma",
            1_700_000_000,
            1_800_000_000,
            "Acme Pharma",
            fixed_time(),
        );
        assert_eq!(
            payload,
            concat!(
                r#"{"batch_no":"B1","current_owner":"Acme Pharma","#,
                r#""expiry_date":1800000000,"manufacture_date":1700000000,"#,
                r#""manufacturer":"Acme Pharma","name":"Paracetamol 500mg","#,
                r#""timestamp":"2024-01-05T10:30:00.000000Z"}"#
            )
        );
    }

    #[test]
    fn test_signing_payload_is_insertion_order_independent() {
        // The builder takes positional arguments, so ordering can only leak
        // through the map encoding. Two calls with identical values must be
        // byte-identical regardless of how the caller assembled them.
        let a = signing_payload("B1", "N", "M", 1, 2, "O", fixed_time());
        let b = signing_payload("B1", "N", "M", 1, 2, "O", fixed_time());
        assert_eq!(a, b);

        let reparsed: serde_json::Value = serde_json::from_str(&a).unwrap();
        let keys: Vec<&String> = reparsed.as_object().unwrap().keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_record_payload_uses_creation_time_owner() {
        let mut record = make_record();
        let before = record_payload(&record);

        record.current_owner = "City Pharmacy".to_string();
        let after = record_payload(&record);

        assert_eq!(before, after);
        assert!(before.contains(r#""current_owner":"Acme Pharma""#));
    }

    #[test]
    fn test_transfer_payload_shape() {
        let payload = transfer_payload("B1", "Acme Pharma", "City Pharmacy", fixed_time());
        assert_eq!(
            payload,
            concat!(
                r#"{"batch_no":"B1","from_owner":"Acme Pharma","#,
                r#""timestamp":"2024-01-05T10:30:00.000000Z","#,
                r#""to_owner":"City Pharmacy"}"#
            )
        );
    }

    #[test]
    fn test_label_payload_carries_signature_and_identity() {
        let record = make_record();
        let label = label_payload(&record);
        let parsed: serde_json::Value = serde_json::from_str(&label).unwrap();

        assert_eq!(parsed["batch_no"], "B1");
        assert_eq!(parsed["digital_signature"], "c2lnbmF0dXJl");
        assert_eq!(parsed["manufacturer"], "Acme Pharma");
        assert_eq!(parsed["name"], "Paracetamol 500mg");
        assert!(parsed.get("scratch_code").is_none());
    }

    #[test]
    fn test_canonical_timestamp_truncates_to_micros() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let payload = signing_payload("B1", "N", "M", 1, 2, "O", at);
        assert!(payload.contains("2023-11-14T22:13:20.123456Z"));
    }
}
