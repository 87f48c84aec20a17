//! Service configuration: TOML file plus environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pt_ledger::FeeConfig;
use serde::Deserialize;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// Directory holding the signer PEM files.
    pub keys_dir: PathBuf,
    pub ledger: LedgerSettings,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        CustodyConfig {
            keys_dir: PathBuf::from("keys"),
            ledger: LedgerSettings::default(),
        }
    }
}

/// Connection and submission parameters for the ledger endpoint.
///
/// Defaults match the local development profile (a dev node on 7545,
/// chain id 1337, ephemeral account key).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub endpoint: String,
    pub chain_id: u64,
    /// Hex private key of the submitting account. When unset, an ephemeral
    /// key is generated at startup.
    pub account_key: Option<String>,
    pub request_timeout_ms: u64,
    pub receipt_poll_ms: u64,
    pub receipt_timeout_ms: u64,
    pub fees: FeeConfig,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            endpoint: "http://127.0.0.1:7545".to_string(),
            chain_id: 1337,
            account_key: None,
            request_timeout_ms: 30_000,
            receipt_poll_ms: 500,
            receipt_timeout_ms: 30_000,
            fees: FeeConfig::default(),
        }
    }
}

impl LedgerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}

impl CustodyConfig {
    /// Load from a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let mut config: CustodyConfig = toml::from_str(&text)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Environment overrides, taking precedence over file values:
    /// `PHARMATRACE_RPC_URL`, `PHARMATRACE_ACCOUNT_KEY`,
    /// `PHARMATRACE_CHAIN_ID`.
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("PHARMATRACE_RPC_URL") {
            if !endpoint.is_empty() {
                self.ledger.endpoint = endpoint;
            }
        }
        if let Ok(key) = std::env::var("PHARMATRACE_ACCOUNT_KEY") {
            if !key.is_empty() {
                self.ledger.account_key = Some(key);
            }
        }
        if let Ok(chain_id) = std::env::var("PHARMATRACE_CHAIN_ID") {
            if let Ok(chain_id) = chain_id.parse() {
                self.ledger.chain_id = chain_id;
            }
        }
    }
}
