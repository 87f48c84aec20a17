//! The ledger submission account and its key.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

/// Failures loading an account key from configuration.
#[derive(Debug, Error, PartialEq)]
pub enum AccountKeyError {
    #[error("account key must be 32 bytes (64 hex characters), got {len} bytes")]
    InvalidLength { len: usize },

    #[error("account key is not valid hex")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Ed25519 key the submitting account signs ledger transactions with.
///
/// This is deliberately distinct from the application signer: rotating one
/// must not affect the other.
#[derive(Debug, PartialEq)]
pub struct AccountKey {
    key: SigningKey,
    address: String,
}

impl AccountKey {
    /// Parse a hex-encoded private key, with or without a `0x` prefix.
    pub fn from_hex(hex_key: &str) -> Result<Self, AccountKeyError> {
        let hex_key = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes = hex::decode(hex_key)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AccountKeyError::InvalidLength { len: bytes.len() })?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes)))
    }

    /// Generate a throwaway account key (local development and tests).
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = derive_address(&key.verifying_key());
        AccountKey { key, address }
    }

    /// Ledger address of this account.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign transaction envelope bytes. Output format: `ed25519:<hex>`.
    pub(crate) fn sign(&self, message: &[u8]) -> String {
        let signature = self.key.sign(message);
        format!("ed25519:{}", hex::encode(signature.to_bytes()))
    }
}

/// Address derivation: the trailing 20 bytes of the Sha3-256 of the public
/// key, hex-encoded with a `0x` prefix.
fn derive_address(key: &VerifyingKey) -> String {
    let digest = Sha3_256::digest(key.as_bytes());
    format!("0x{}", hex::encode(&digest[12..]))
}
