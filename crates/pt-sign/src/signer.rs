//! Keypair bootstrap plus the sign/verify operations.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::KeyMaterialError;

/// File name of the PKCS#8 private key inside the key directory.
pub const PRIVATE_KEY_FILE: &str = "signer_private.pem";
/// File name of the SubjectPublicKeyInfo public key inside the key directory.
pub const PUBLIC_KEY_FILE: &str = "signer_public.pem";
/// Modulus size for generated keys.
pub const KEY_BITS: usize = 2048;

/// Application signer holding the deployment keypair.
///
/// Loaded once at startup and shared by every signing and verification
/// operation for the process lifetime.
pub struct Signer {
    signing_key: BlindedSigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    public_pem: String,
}

impl Signer {
    /// Load the deployment keypair from `dir`, generating and persisting it
    /// first if none exists.
    ///
    /// Idempotent: an existing private key is always loaded, never
    /// regenerated (regeneration would invalidate every signature minted so
    /// far). A missing public half next to an existing private key is
    /// re-derived and written back. A fresh pair is persisted before the
    /// key signs anything.
    pub fn bootstrap(dir: &Path) -> Result<Self, KeyMaterialError> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);

        if private_path.exists() {
            let pem = fs::read_to_string(&private_path).map_err(|source| {
                KeyMaterialError::Read {
                    path: private_path.clone(),
                    source,
                }
            })?;
            let private = RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|source| {
                KeyMaterialError::ParsePrivate {
                    path: private_path,
                    source,
                }
            })?;
            let signer = Self::from_private(private);
            if !public_path.exists() {
                fs::write(&public_path, &signer.public_pem).map_err(|source| {
                    KeyMaterialError::Write {
                        path: public_path,
                        source,
                    }
                })?;
            }
            return Ok(signer);
        }

        fs::create_dir_all(dir).map_err(|source| KeyMaterialError::Write {
            path: dir.to_path_buf(),
            source,
        })?;

        let private =
            RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(KeyMaterialError::Generate)?;
        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(KeyMaterialError::EncodePrivate)?;
        let signer = Self::from_private(private);

        // Both halves land on disk before the first signature is produced.
        fs::write(&private_path, private_pem.as_bytes()).map_err(|source| {
            KeyMaterialError::Write {
                path: private_path,
                source,
            }
        })?;
        fs::write(&public_path, &signer.public_pem).map_err(|source| KeyMaterialError::Write {
            path: public_path,
            source,
        })?;

        Ok(signer)
    }

    /// Build a signer from an in-memory private key PEM (PKCS#8).
    pub fn from_private_pem(pem: &str) -> Result<Self, KeyMaterialError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem).map_err(|source| {
            KeyMaterialError::ParsePrivate {
                path: "<inline>".into(),
                source,
            }
        })?;
        Ok(Self::from_private(private))
    }

    /// Generate an ephemeral keypair without touching disk.
    pub fn generate() -> Result<Self, KeyMaterialError> {
        let private =
            RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(KeyMaterialError::Generate)?;
        Ok(Self::from_private(private))
    }

    fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .expect("SPKI encoding of a freshly parsed RSA key cannot fail");
        Signer {
            signing_key: BlindedSigningKey::<Sha256>::new(private),
            verifying_key: VerifyingKey::<Sha256>::new(public),
            public_pem,
        }
    }

    /// Sign a canonical payload, returning the signature as base64 text.
    ///
    /// PSS salting makes the output randomized; two signatures over the
    /// same payload differ but both verify.
    pub fn sign(&self, payload: &[u8]) -> String {
        let signature = self.signing_key.sign_with_rng(&mut OsRng, payload);
        BASE64.encode(signature.to_vec())
    }

    /// Verify a base64 signature against a canonical payload.
    ///
    /// Any decoding, structural, or cryptographic failure yields `false`.
    pub fn verify(&self, payload: &[u8], signature_b64: &str) -> bool {
        let bytes = match BASE64.decode(signature_b64) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let signature = match Signature::try_from(bytes.as_slice()) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        self.verifying_key.verify(payload, &signature).is_ok()
    }

    /// PEM (SubjectPublicKeyInfo) export of the verification key.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    // Key generation dominates test time, so tests that only need *a* key
    // share one.
    fn shared_signer() -> &'static Signer {
        static SIGNER: OnceLock<Signer> = OnceLock::new();
        SIGNER.get_or_init(|| Signer::generate().unwrap())
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let signer = shared_signer();
        let payload = br#"{"batch_no":"B1","name":"Paracetamol"}"#;

        let signature = signer.sign(payload);
        assert!(signer.verify(payload, &signature));
    }

    #[test]
    fn test_verify_rejects_mutated_payload() {
        let signer = shared_signer();
        let signature = signer.sign(b"payload-a");
        assert!(!signer.verify(b"payload-b", &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let signer = shared_signer();
        let other = Signer::generate().unwrap();

        let signature = signer.sign(b"payload");
        assert!(!other.verify(b"payload", &signature));
    }

    #[test]
    fn test_verify_rejects_garbage_signature() {
        let signer = shared_signer();
        assert!(!signer.verify(b"payload", "not base64 ###"));
        assert!(!signer.verify(b"payload", "c2hvcnQ="));
    }

    #[test]
    fn test_signatures_are_randomized_but_both_verify() {
        let signer = shared_signer();
        let first = signer.sign(b"payload");
        let second = signer.sign(b"payload");

        assert!(signer.verify(b"payload", &first));
        assert!(signer.verify(b"payload", &second));
    }

    #[test]
    fn test_bootstrap_persists_both_halves() {
        let dir = tempfile::tempdir().unwrap();
        let signer = Signer::bootstrap(dir.path()).unwrap();

        let private_pem = std::fs::read_to_string(dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        let public_pem = std::fs::read_to_string(dir.path().join(PUBLIC_KEY_FILE)).unwrap();

        assert!(private_pem.contains("BEGIN PRIVATE KEY"));
        assert!(public_pem.contains("BEGIN PUBLIC KEY"));
        assert_eq!(public_pem, signer.public_key_pem());
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();

        let first = Signer::bootstrap(dir.path()).unwrap();
        let signature = first.sign(b"payload");

        let private_before = std::fs::read(dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        let second = Signer::bootstrap(dir.path()).unwrap();
        let private_after = std::fs::read(dir.path().join(PRIVATE_KEY_FILE)).unwrap();

        // Same key material, so signatures minted before the restart still
        // verify.
        assert_eq!(private_before, private_after);
        assert!(second.verify(b"payload", &signature));
    }

    #[test]
    fn test_bootstrap_rederives_missing_public_half() {
        let dir = tempfile::tempdir().unwrap();
        let first = Signer::bootstrap(dir.path()).unwrap();
        let signature = first.sign(b"payload");

        std::fs::remove_file(dir.path().join(PUBLIC_KEY_FILE)).unwrap();

        let second = Signer::bootstrap(dir.path()).unwrap();
        assert!(dir.path().join(PUBLIC_KEY_FILE).exists());
        assert!(second.verify(b"payload", &signature));
    }

    #[test]
    fn test_bootstrap_rejects_corrupt_private_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PRIVATE_KEY_FILE), "not a pem").unwrap();

        assert!(matches!(
            Signer::bootstrap(dir.path()),
            Err(KeyMaterialError::ParsePrivate { .. })
        ));
    }

    #[test]
    fn test_from_private_pem_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let original = Signer::bootstrap(dir.path()).unwrap();
        let signature = original.sign(b"payload");

        let pem = std::fs::read_to_string(dir.path().join(PRIVATE_KEY_FILE)).unwrap();
        let restored = Signer::from_private_pem(&pem).unwrap();

        assert!(restored.verify(b"payload", &signature));
        assert_eq!(restored.public_key_pem(), original.public_key_pem());
    }
}
