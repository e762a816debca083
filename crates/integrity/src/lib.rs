//! ICA Integrity - Tamper evidence for signed declarations
//!
//! - `hash`: SHA-256 document hash over the canonical signing inputs
//! - `seal`: optional Ed25519 signature of that hash with the system key
//!
//! The hash is stored when a declaration is signed and is the authoritative
//! value; verification recomputes it from the stored inputs and compares.

pub mod error;
pub mod hash;
pub mod seal;

pub use error::IntegrityError;
pub use hash::{canonical_string, document_hash, verify_document_hash, SigningInputs};
pub use seal::{verify_seal, Sealer, SystemSealer, SYSTEM_SIGNER_ID};
