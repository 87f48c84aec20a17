//! Transport seam: the [`LedgerRpc`] trait and its JSON-RPC HTTP client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ReadUnavailable, SubmissionError};
use crate::types::{RawBatch, SignedTransaction, TxReceipt};

/// Raw ledger operations, one implementation per transport.
///
/// Implementations do not sequence nonces or retry; that discipline lives
/// in [`LedgerClient`](crate::LedgerClient).
pub trait LedgerRpc: Send + Sync {
    /// Next sequence number for `account`, counting pending transactions.
    fn pending_nonce(&self, account: &str) -> Result<u64, SubmissionError>;

    /// Hand a signed transaction to the network. `Ok` means the transaction
    /// was accepted into the pending pool, not that its state is final.
    fn send_transaction(&self, tx: &SignedTransaction) -> Result<String, SubmissionError>;

    /// Receipt for an included transaction, `None` while still pending.
    fn transaction_receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>, ReadUnavailable>;

    /// Raw batch state, `None` when the ledger has no record of it.
    fn batch(&self, batch_no: &str) -> Result<Option<RawBatch>, ReadUnavailable>;
}

const METHOD_PENDING_NONCE: &str = "ledger_pendingNonce";
const METHOD_SEND_TRANSACTION: &str = "ledger_sendTransaction";
const METHOD_GET_RECEIPT: &str = "ledger_getReceipt";
const METHOD_GET_BATCH: &str = "ledger_getBatch";

/// JSON-RPC error code nodes answer with for missing entities.
const CODE_NOT_FOUND: i64 = -32004;
/// JSON-RPC error code for fee balance failures.
const CODE_INSUFFICIENT_FUNDS: i64 = -32010;

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

enum RpcOutcome<T> {
    Value(T),
    Null,
    Error(RpcError),
}

/// JSON-RPC 2.0 client for a remote ledger node.
pub struct HttpLedger {
    http: reqwest::blocking::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl HttpLedger {
    /// Connect to `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(HttpLedger {
            http,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<RpcOutcome<T>, String> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| err.to_string())?;
        let response: RpcResponse<T> = response.json().map_err(|err| err.to_string())?;
        if let Some(error) = response.error {
            return Ok(RpcOutcome::Error(error));
        }
        match response.result {
            Some(value) => Ok(RpcOutcome::Value(value)),
            None => Ok(RpcOutcome::Null),
        }
    }
}

/// Map a node-reported submission failure onto the local taxonomy.
fn submission_error(error: RpcError) -> SubmissionError {
    if error.code == CODE_INSUFFICIENT_FUNDS
        || error.message.to_ascii_lowercase().contains("insufficient")
    {
        SubmissionError::InsufficientFunds {
            reason: error.message,
        }
    } else {
        SubmissionError::Rejected {
            reason: error.message,
        }
    }
}

impl LedgerRpc for HttpLedger {
    fn pending_nonce(&self, account: &str) -> Result<u64, SubmissionError> {
        match self.call(METHOD_PENDING_NONCE, (account,)) {
            Err(reason) => Err(SubmissionError::Unreachable { reason }),
            Ok(RpcOutcome::Value(nonce)) => Ok(nonce),
            Ok(RpcOutcome::Null) => Err(SubmissionError::Malformed {
                reason: format!("node returned no nonce for {account}"),
            }),
            Ok(RpcOutcome::Error(error)) => Err(submission_error(error)),
        }
    }

    fn send_transaction(&self, tx: &SignedTransaction) -> Result<String, SubmissionError> {
        match self.call(METHOD_SEND_TRANSACTION, (tx,)) {
            Err(reason) => Err(SubmissionError::Unreachable { reason }),
            Ok(RpcOutcome::Value(tx_id)) => Ok(tx_id),
            Ok(RpcOutcome::Null) => Err(SubmissionError::Malformed {
                reason: "node acknowledged without a transaction id".to_string(),
            }),
            Ok(RpcOutcome::Error(error)) => Err(submission_error(error)),
        }
    }

    fn transaction_receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>, ReadUnavailable> {
        match self.call(METHOD_GET_RECEIPT, (tx_id,)) {
            Err(reason) => Err(ReadUnavailable { reason }),
            Ok(RpcOutcome::Value(receipt)) => Ok(Some(receipt)),
            Ok(RpcOutcome::Null) => Ok(None),
            Ok(RpcOutcome::Error(error)) if error.code == CODE_NOT_FOUND => Ok(None),
            Ok(RpcOutcome::Error(error)) => Err(ReadUnavailable {
                reason: error.message,
            }),
        }
    }

    fn batch(&self, batch_no: &str) -> Result<Option<RawBatch>, ReadUnavailable> {
        match self.call(METHOD_GET_BATCH, (batch_no,)) {
            Err(reason) => Err(ReadUnavailable { reason }),
            Ok(RpcOutcome::Value(raw)) => Ok(Some(raw)),
            Ok(RpcOutcome::Null) => Ok(None),
            Ok(RpcOutcome::Error(error)) if error.code == CODE_NOT_FOUND => Ok(None),
            Ok(RpcOutcome::Error(error)) => Err(ReadUnavailable {
                reason: error.message,
            }),
        }
    }
}
