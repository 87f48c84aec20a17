//! The lifecycle workflow itself.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use pt_ledger::{
    AccountKey, HttpLedger, LedgerClient, LedgerOp, LedgerRpc, SubmitMode,
};
use pt_record::{
    label_payload, signing_payload, transfer_payload, CustodyEvent, LedgerTxs, NewBatch,
    PartialTransfer, ProvenanceRecord, RecordError,
};
use pt_sign::Signer;
use pt_store::{ProvenanceStore, StoreError};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::CustodyConfig;
use crate::error::CustodyError;
use crate::locks::BatchLocks;

/// Boundary outcome of a creation request.
#[derive(Debug, Clone, Serialize)]
pub struct CreateReceipt {
    pub batch_no: String,
    pub digital_signature: String,
    pub create_tx: String,
    /// JSON text destined for the physical label printer.
    pub label_payload: String,
}

/// Boundary outcome of a completed transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub batch_no: String,
    pub from_owner: String,
    pub to_owner: String,
    pub transfer_signature: String,
    pub ship_tx: String,
    pub receive_tx: String,
}

/// Boundary outcome of the terminal sale.
#[derive(Debug, Clone, Serialize)]
pub struct SoldReceipt {
    pub batch_no: String,
    pub sold_tx: String,
}

/// Drives creation and custody transitions.
///
/// Ordering is ledger-first throughout: the store commits a transition only
/// after every ledger submission backing it succeeded, so the mirror never
/// claims a state the ledger has not at least accepted as pending.
pub struct CustodyService<R> {
    store: Arc<ProvenanceStore>,
    signer: Arc<Signer>,
    ledger: Arc<LedgerClient<R>>,
    locks: BatchLocks,
}

impl<R: LedgerRpc> CustodyService<R> {
    pub fn new(
        store: Arc<ProvenanceStore>,
        signer: Arc<Signer>,
        ledger: Arc<LedgerClient<R>>,
    ) -> Self {
        CustodyService {
            store,
            signer,
            ledger,
            locks: BatchLocks::default(),
        }
    }

    pub fn store(&self) -> Arc<ProvenanceStore> {
        Arc::clone(&self.store)
    }

    pub fn signer(&self) -> Arc<Signer> {
        Arc::clone(&self.signer)
    }

    pub fn ledger(&self) -> Arc<LedgerClient<R>> {
        Arc::clone(&self.ledger)
    }

    /// Mint a signed record, anchor it on the ledger, then mirror it.
    pub fn create_batch(&self, request: NewBatch) -> Result<CreateReceipt, CustodyError> {
        request.validate()?;

        let lock = self.locks.acquire(&request.batch_no);
        let _guard = lock.lock();

        if self.store.contains(&request.batch_no) {
            return Err(StoreError::DuplicateBatch {
                batch_no: request.batch_no,
            }
            .into());
        }

        let created_at = Utc::now();
        // The creator owns the batch at minting time, so the signed owner
        // is the manufacturer.
        let payload = signing_payload(
            &request.batch_no,
            &request.name,
            &request.manufacturer,
            request.manufacture_date,
            request.expiry_date,
            &request.manufacturer,
            created_at,
        );
        let digital_signature = self.signer.sign(payload.as_bytes());

        let distributor = request
            .distributor
            .clone()
            .unwrap_or_else(|| self.ledger.account_address().to_string());
        let create_tx = self.ledger.submit(
            LedgerOp::CreateBatch {
                batch_no: request.batch_no.clone(),
                drug_name: request.name.clone(),
                manufacture_date: request.manufacture_date,
                expiry_date: request.expiry_date,
                distributor,
            },
            SubmitMode::Accepted,
        )?;

        let record = ProvenanceRecord {
            batch_no: request.batch_no.clone(),
            name: request.name,
            manufacturer: request.manufacturer.clone(),
            manufacture_date: request.manufacture_date,
            expiry_date: request.expiry_date,
            current_owner: request.manufacturer,
            created_at,
            digital_signature: digital_signature.clone(),
            scratch_code: request.scratch_code,
            ledger_txs: LedgerTxs {
                create_tx: Some(create_tx.clone()),
                ..LedgerTxs::default()
            },
            custody_log: Vec::new(),
            pending_transfer: None,
        };
        let label = label_payload(&record);
        self.store.create(record)?;

        info!(batch_no = %request.batch_no, create_tx = %create_tx, "batch created");
        Ok(CreateReceipt {
            batch_no: request.batch_no,
            digital_signature,
            create_tx,
            label_payload: label,
        })
    }

    /// Transfer custody: ship, receive, then commit the mirror.
    ///
    /// The two ledger steps are sequential. If ship lands and receive
    /// fails, the record keeps a persisted partial marker and the distinct
    /// [`CustodyError::PartialTransfer`] is returned; retrying with the
    /// same destination resumes at the receive step.
    pub fn transfer(
        &self,
        batch_no: &str,
        to_owner: &str,
        presented_token: &str,
    ) -> Result<TransferReceipt, CustodyError> {
        if to_owner.trim().is_empty() {
            return Err(RecordError::MissingField { field: "to_owner" }.into());
        }

        let lock = self.locks.acquire(batch_no);
        let _guard = lock.lock();

        let record = self
            .store
            .get(batch_no)
            .ok_or_else(|| StoreError::BatchNotFound {
                batch_no: batch_no.to_string(),
            })?;
        if record.scratch_code != presented_token {
            return Err(CustodyError::TokenMismatch {
                batch_no: batch_no.to_string(),
            });
        }

        let from_owner = record.current_owner.clone();
        let at = Utc::now();
        let transfer_signature = self
            .signer
            .sign(transfer_payload(batch_no, &from_owner, to_owner, at).as_bytes());

        let ship_tx = match &record.pending_transfer {
            // The earlier attempt already shipped on the ledger; only the
            // receive step is outstanding.
            Some(partial) if partial.to_owner == to_owner => {
                info!(batch_no = %batch_no, ship_tx = %partial.ship_tx, "resuming partial transfer");
                partial.ship_tx.clone()
            }
            Some(partial) => {
                return Err(CustodyError::PendingTransfer {
                    batch_no: batch_no.to_string(),
                    pending_to: partial.to_owner.clone(),
                });
            }
            None => self.ledger.submit(
                LedgerOp::Ship {
                    batch_no: batch_no.to_string(),
                },
                SubmitMode::Accepted,
            )?,
        };

        let receive = self.ledger.submit(
            LedgerOp::ReceiveAtPharmacy {
                batch_no: batch_no.to_string(),
                pharmacy: self.ledger.account_address().to_string(),
            },
            SubmitMode::Confirmed,
        );
        let receive_tx = match receive {
            Ok(tx) => tx,
            Err(receive_error) => {
                warn!(
                    batch_no = %batch_no,
                    ship_tx = %ship_tx,
                    error = %receive_error,
                    "receive failed after ship was accepted"
                );
                self.store.mark_partial_transfer(
                    batch_no,
                    PartialTransfer {
                        to_owner: to_owner.to_string(),
                        ship_tx: ship_tx.clone(),
                        error: receive_error.to_string(),
                        at,
                    },
                )?;
                return Err(CustodyError::PartialTransfer {
                    batch_no: batch_no.to_string(),
                    ship_tx,
                    receive_error,
                });
            }
        };

        let event = CustodyEvent {
            from_owner: from_owner.clone(),
            to_owner: to_owner.to_string(),
            at,
            signature: transfer_signature.clone(),
            ship_tx: Some(ship_tx.clone()),
            receive_tx: Some(receive_tx.clone()),
        };
        self.store.commit_transfer(
            batch_no,
            &from_owner,
            to_owner,
            ship_tx.clone(),
            receive_tx.clone(),
            event,
        )?;

        Ok(TransferReceipt {
            batch_no: batch_no.to_string(),
            from_owner,
            to_owner: to_owner.to_string(),
            transfer_signature,
            ship_tx,
            receive_tx,
        })
    }

    /// Terminal transition: mark the batch sold.
    pub fn mark_sold(
        &self,
        batch_no: &str,
        presented_token: &str,
    ) -> Result<SoldReceipt, CustodyError> {
        let lock = self.locks.acquire(batch_no);
        let _guard = lock.lock();

        let record = self
            .store
            .get(batch_no)
            .ok_or_else(|| StoreError::BatchNotFound {
                batch_no: batch_no.to_string(),
            })?;
        if record.scratch_code != presented_token {
            return Err(CustodyError::TokenMismatch {
                batch_no: batch_no.to_string(),
            });
        }

        let owner = record.current_owner.clone();
        let at = Utc::now();
        let sold_tx = self.ledger.submit(
            LedgerOp::MarkSold {
                batch_no: batch_no.to_string(),
            },
            SubmitMode::Accepted,
        )?;

        let event = CustodyEvent {
            from_owner: owner.clone(),
            to_owner: owner.clone(),
            at,
            signature: self
                .signer
                .sign(transfer_payload(batch_no, &owner, &owner, at).as_bytes()),
            ship_tx: None,
            receive_tx: None,
        };
        self.store
            .record_sold(batch_no, &owner, sold_tx.clone(), event)?;

        info!(batch_no = %batch_no, sold_tx = %sold_tx, "batch sold");
        Ok(SoldReceipt {
            batch_no: batch_no.to_string(),
            sold_tx,
        })
    }
}

/// Build the production service from configuration: bootstrap the signer
/// keypair and connect the HTTP ledger client.
pub fn bootstrap(config: &CustodyConfig) -> anyhow::Result<CustodyService<HttpLedger>> {
    let signer = Signer::bootstrap(&config.keys_dir)
        .with_context(|| format!("signer bootstrap failed in {}", config.keys_dir.display()))?;

    let account = match &config.ledger.account_key {
        Some(hex_key) => AccountKey::from_hex(hex_key).context("invalid ledger account key")?,
        None => {
            warn!("no ledger account key configured, generated an ephemeral one");
            AccountKey::generate()
        }
    };

    let rpc = HttpLedger::new(config.ledger.endpoint.clone(), config.ledger.request_timeout())
        .context("failed to build ledger HTTP client")?;
    let ledger = LedgerClient::new(rpc, account, config.ledger.fees, config.ledger.chain_id)
        .with_receipt_timing(config.ledger.receipt_poll(), config.ledger.receipt_timeout());

    info!(
        endpoint = %config.ledger.endpoint,
        chain_id = config.ledger.chain_id,
        account = %ledger.account_address(),
        "ledger client ready"
    );

    Ok(CustodyService::new(
        Arc::new(ProvenanceStore::new()),
        Arc::new(signer),
        Arc::new(ledger),
    ))
}
