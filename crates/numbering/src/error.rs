//! Numbering errors

use crate::counter::Sequence;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NumberingError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("No {sequence} counter configured for municipality {municipality}")]
    Unavailable {
        municipality: String,
        sequence: Sequence,
    },

    #[error("Invalid counter configuration: {0}")]
    InvalidConfig(String),
}
