//! Identifiers used when a municipality has no counter configured
//!
//! These are unique but not sequential, and carry a fixed tag so they can
//! never be mistaken for a counter-issued number.

use chrono::{DateTime, FixedOffset};
use ica_core::DeclarationId;

/// Prefix of every fallback filing number
pub const FALLBACK_FILING_PREFIX: &str = "RAD-";

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// `RAD-{declaration}-{yyyyMMddHHmmss}`
pub fn fallback_filing_number(declaration_id: DeclarationId, at: DateTime<FixedOffset>) -> String {
    format!(
        "{}{}-{}",
        FALLBACK_FILING_PREFIX,
        declaration_id,
        at.format(STAMP_FORMAT)
    )
}

/// `ICA-{municipality}-{year}-{yyyyMMddHHmmss}-{UUID8}`
pub fn fallback_form_number(
    municipality: &str,
    tax_year: i32,
    at: DateTime<FixedOffset>,
) -> String {
    let unique = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!(
        "ICA-{}-{}-{}-{}",
        municipality,
        tax_year,
        at.format(STAMP_FORMAT),
        unique
    )
}
