//! Lifecycle errors

use ica_core::{DeclarationId, DeclarationStatus, UserId, ValidationError};
use ica_integrity::IntegrityError;
use ica_numbering::NumberingError;
use thiserror::Error;

/// Errors from the declaration store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Errors from lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Declaration {id} is {status}")]
    InvalidState {
        id: DeclarationId,
        status: DeclarationStatus,
    },

    #[error("User {actor} may not act on declaration {id}")]
    Forbidden { id: DeclarationId, actor: UserId },

    #[error("Declaration {0} is already signed")]
    AlreadySigned(DeclarationId),

    #[error("Declaration {0} is not signed")]
    NotSigned(DeclarationId),

    #[error("Declaration {0} has already been corrected")]
    AlreadyCorrected(DeclarationId),

    #[error("Declaration {0} is a correction and cannot be corrected")]
    CannotCorrectACorrection(DeclarationId),

    #[error("Declaration not found: {0}")]
    NotFound(DeclarationId),

    #[error("Integrity check failed: {0}")]
    IntegrityFailure(#[from] IntegrityError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Numbering error: {0}")]
    Numbering(#[from] NumberingError),
}

impl From<rusqlite::Error> for LifecycleError {
    fn from(e: rusqlite::Error) -> Self {
        LifecycleError::Store(StoreError::Database(e))
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
