use std::path::PathBuf;

use thiserror::Error;

/// Unrecoverable key-material faults.
///
/// These are raised during bootstrap only. Per-call verification failures
/// are reported as `false`, never as an error.
#[derive(Debug, Error)]
pub enum KeyMaterialError {
    #[error("failed to read key material at {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to persist key material at {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed private key at {path}")]
    ParsePrivate {
        path: PathBuf,
        source: rsa::pkcs8::Error,
    },

    #[error("key generation failed")]
    Generate(#[source] rsa::Error),

    #[error("private key encoding failed")]
    EncodePrivate(#[source] rsa::pkcs8::Error),

    #[error("public key encoding failed")]
    EncodePublic(#[source] rsa::pkcs8::spki::Error),
}
