//! RSA-PSS signing and verification for provenance payloads.
//!
//! One 2048-bit keypair per deployment, bootstrapped once and loaded on
//! every subsequent start. Signing uses PSS (salted, SHA-256) so signatures
//! are randomized; verification is deterministic and reports a boolean,
//! never an error. Key-material faults are the only fatal condition and
//! they surface at bootstrap, not per call.

mod error;
mod signer;

pub use error::KeyMaterialError;
pub use signer::{Signer, KEY_BITS, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
