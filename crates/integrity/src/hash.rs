//! Document hash

use crate::error::IntegrityError;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use ica_core::DeclarationId;
use sha2::{Digest, Sha256};

/// The values a document hash commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningInputs<'a> {
    pub declaration_id: DeclarationId,
    pub form_number: &'a str,
    pub signer_id: &'a str,
    pub signed_at: DateTime<FixedOffset>,
}

/// `{id}-{form_number}-{signer}-{signed_at}` with the timestamp in RFC 3339 at
/// microsecond precision and its original offset.
pub fn canonical_string(inputs: &SigningInputs<'_>) -> String {
    format!(
        "{}-{}-{}-{}",
        inputs.declaration_id,
        inputs.form_number,
        inputs.signer_id,
        inputs.signed_at.to_rfc3339_opts(SecondsFormat::Micros, false)
    )
}

/// SHA-256 of the canonical string, hex encoded
pub fn document_hash(inputs: &SigningInputs<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(inputs).as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute the hash and compare it to the stored value
pub fn verify_document_hash(
    inputs: &SigningInputs<'_>,
    stored: &str,
) -> Result<(), IntegrityError> {
    let recomputed = document_hash(inputs);
    if recomputed == stored {
        Ok(())
    } else {
        Err(IntegrityError::HashMismatch {
            stored: stored.to_string(),
            recomputed,
        })
    }
}
