//! Transaction and wire types for the ledger boundary.

use pt_record::{CustodyState, LedgerBatchView};
use serde::{Deserialize, Serialize};

use crate::error::ReadUnavailable;

/// One gwei in wei.
pub const GWEI: u64 = 1_000_000_000;

/// The four custody operations the ledger contract exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum LedgerOp {
    #[serde(rename = "createBatch")]
    CreateBatch {
        batch_no: String,
        drug_name: String,
        manufacture_date: i64,
        expiry_date: i64,
        distributor: String,
    },
    #[serde(rename = "ship")]
    Ship { batch_no: String },
    #[serde(rename = "receiveAtPharmacy")]
    ReceiveAtPharmacy { batch_no: String, pharmacy: String },
    #[serde(rename = "markSold")]
    MarkSold { batch_no: String },
}

impl LedgerOp {
    /// Wire method name for this operation.
    pub fn method(&self) -> &'static str {
        match self {
            LedgerOp::CreateBatch { .. } => "createBatch",
            LedgerOp::Ship { .. } => "ship",
            LedgerOp::ReceiveAtPharmacy { .. } => "receiveAtPharmacy",
            LedgerOp::MarkSold { .. } => "markSold",
        }
    }

    /// Batch identifier the operation targets.
    pub fn batch_no(&self) -> &str {
        match self {
            LedgerOp::CreateBatch { batch_no, .. }
            | LedgerOp::Ship { batch_no }
            | LedgerOp::ReceiveAtPharmacy { batch_no, .. }
            | LedgerOp::MarkSold { batch_no } => batch_no,
        }
    }
}

/// Fee parameters applied to every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub gas_limit: u64,
    /// Wei per gas unit.
    pub max_fee_per_gas: u64,
    /// Wei per gas unit tipped to the proposer.
    pub max_priority_fee_per_gas: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        FeeConfig {
            gas_limit: 500_000,
            max_fee_per_gas: 70 * GWEI,
            max_priority_fee_per_gas: 30 * GWEI,
        }
    }
}

/// Unsigned transaction body.
///
/// The canonical bytes signed by the account key are the compact JSON of
/// this struct in declaration order; both sides of the wire reproduce it
/// from the same definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    pub account: String,
    pub nonce: u64,
    pub chain_id: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u64,
    pub max_priority_fee_per_gas: u64,
    pub call: LedgerOp,
}

impl TxEnvelope {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("envelope serialization failed")
    }
}

/// Envelope plus the account signature and the derived identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub envelope: TxEnvelope,
    /// `ed25519:<hex>` over the envelope's canonical bytes.
    pub signature: String,
    /// `0x<hex>` Sha3-256 over envelope bytes and signature.
    pub tx_id: String,
}

/// Execution outcome the ledger reports once a transaction is included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: String,
    pub success: bool,
    #[serde(default)]
    pub block: Option<u64>,
}

/// Wire shape of a ledger batch read.
///
/// The ledger interface is not stable in encoding: some nodes answer with a
/// positional tuple, others with a keyed object. Both decode here and
/// normalize into the single internal [`LedgerBatchView`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawBatch {
    Keyed(KeyedBatch),
    Positional(PositionalBatch),
}

/// Keyed batch encoding, field names as the contract ABI emits them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyedBatch {
    #[serde(rename = "drugName", default)]
    pub drug_name: String,
    #[serde(rename = "batchId", default)]
    pub batch_no: String,
    #[serde(rename = "mfgDate", default)]
    pub manufacture_date: i64,
    #[serde(rename = "expDate", default)]
    pub expiry_date: i64,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub distributor: String,
    #[serde(default)]
    pub pharmacy: String,
    #[serde(default)]
    pub state: u8,
}

/// Positional batch encoding: `[drugName, batchId, mfgDate, expDate,
/// manufacturer, distributor, pharmacy, state]`.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionalBatch(
    pub String,
    pub String,
    pub i64,
    pub i64,
    pub String,
    pub String,
    pub String,
    pub u8,
);

impl RawBatch {
    /// Collapse either wire shape into the internal view.
    pub fn normalize(self) -> Result<LedgerBatchView, ReadUnavailable> {
        let (drug_name, batch_no, manufacture_date, expiry_date, manufacturer, distributor, pharmacy, code) =
            match self {
                RawBatch::Keyed(keyed) => (
                    keyed.drug_name,
                    keyed.batch_no,
                    keyed.manufacture_date,
                    keyed.expiry_date,
                    keyed.manufacturer,
                    keyed.distributor,
                    keyed.pharmacy,
                    keyed.state,
                ),
                RawBatch::Positional(PositionalBatch(
                    drug_name,
                    batch_no,
                    manufacture_date,
                    expiry_date,
                    manufacturer,
                    distributor,
                    pharmacy,
                    state,
                )) => (
                    drug_name,
                    batch_no,
                    manufacture_date,
                    expiry_date,
                    manufacturer,
                    distributor,
                    pharmacy,
                    state,
                ),
            };
        let state = CustodyState::from_code(code).ok_or_else(|| ReadUnavailable {
            reason: format!("unknown ledger state code {code} for batch {batch_no}"),
        })?;
        Ok(LedgerBatchView {
            drug_name,
            batch_no,
            manufacture_date,
            expiry_date,
            manufacturer,
            distributor,
            pharmacy,
            state,
        })
    }
}
