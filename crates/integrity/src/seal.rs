//! System seal
//!
//! When a system key is configured, every document hash is also signed with
//! Ed25519 so a hash can't be swapped together with its inputs.

use crate::error::IntegrityError;
use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use ica_core::SystemSeal;

/// Signer id recorded for seals made with the system key
pub const SYSTEM_SIGNER_ID: &str = "SYSTEM";

/// Trait for sealers
pub trait Sealer: Send + Sync {
    /// Get the signer ID
    fn signer_id(&self) -> &str;

    /// Get the public key (hex-encoded)
    fn public_key_hex(&self) -> String;

    /// Sign a document hash
    fn seal(&self, document_hash: &str) -> SystemSeal;
}

/// Sealer backed by an Ed25519 system key
pub struct SystemSealer {
    signing_key: SigningKey,
}

impl SystemSealer {
    /// Create from a 32-byte seed (hex-encoded in env var)
    pub fn from_hex(hex_seed: &str) -> Result<Self, IntegrityError> {
        let bytes = hex::decode(hex_seed.trim())
            .map_err(|e| IntegrityError::InvalidKey(format!("Invalid key hex: {}", e)))?;

        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IntegrityError::InvalidKey("Key must be 32 bytes".to_string()))?;

        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Generate a new random signing key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Export the seed as hex (for storage)
    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl Sealer for SystemSealer {
    fn signer_id(&self) -> &str {
        SYSTEM_SIGNER_ID
    }

    fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    fn seal(&self, document_hash: &str) -> SystemSeal {
        let signature = self.signing_key.sign(document_hash.as_bytes());
        SystemSeal {
            public_key: self.public_key_hex(),
            signature: hex::encode(signature.to_bytes()),
        }
    }
}

/// Verify a seal against the document hash it claims to sign
pub fn verify_seal(seal: &SystemSeal, document_hash: &str) -> Result<(), IntegrityError> {
    let pk_bytes = hex::decode(&seal.public_key)
        .map_err(|e| IntegrityError::InvalidSeal(format!("Invalid public key hex: {}", e)))?;
    let sig_bytes = hex::decode(&seal.signature)
        .map_err(|e| IntegrityError::InvalidSeal(format!("Invalid signature hex: {}", e)))?;

    let pk_array: [u8; 32] = pk_bytes
        .try_into()
        .map_err(|_| IntegrityError::InvalidSeal("Public key must be 32 bytes".to_string()))?;
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| IntegrityError::InvalidSeal("Signature must be 64 bytes".to_string()))?;

    let verifying_key = VerifyingKey::from_bytes(&pk_array)
        .map_err(|e| IntegrityError::InvalidSeal(format!("Invalid public key: {}", e)))?;
    let signature = Signature::from_bytes(&sig_array);

    verifying_key
        .verify(document_hash.as_bytes(), &signature)
        .map_err(|e| IntegrityError::SealVerificationFailed(e.to_string()))
}
