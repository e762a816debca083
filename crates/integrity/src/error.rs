//! Integrity errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Document hash mismatch: stored {stored}, recomputed {recomputed}")]
    HashMismatch { stored: String, recomputed: String },

    #[error("Invalid seal: {0}")]
    InvalidSeal(String),

    #[error("Seal verification failed: {0}")]
    SealVerificationFailed(String),

    #[error("Invalid system key: {0}")]
    InvalidKey(String),
}
