//! Input validation
//!
//! Runs before the engine: the engine itself never rejects business data, so
//! anything malformed has to be caught here.

use crate::params::FormulaParameters;
use crate::rate::{Percent, PerMille};
use crate::sections::{DeclarationSections, TaxableActivity, Taxpayer};
use crate::signature::SignatureData;
use rust_decimal::Decimal;
use thiserror::Error;

/// Highest per-mille activity rate accepted
pub const MAX_ACTIVITY_RATE: Decimal = Decimal::ONE_HUNDRED;

/// Highest energy rate accepted, in pesos per installed kW. With capacity
/// capped at [`crate::amount::MAX_AMOUNT`], the energy row stays far inside
/// `Decimal` range.
pub const MAX_ENERGY_RATE_PER_KW: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Earliest tax year accepted
pub const MIN_TAX_YEAR: i32 = 2000;

/// Check-digit weights for a Colombian NIT, applied right to left
const NIT_WEIGHTS: [u32; 15] = [3, 7, 13, 17, 19, 23, 29, 37, 41, 43, 47, 53, 59, 67, 71];

/// Malformed input, rejected before calculation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Tax year {year} outside accepted range {min}..={max}")]
    TaxYear { year: i32, min: i32, max: i32 },

    #[error("Invalid activity code: {0:?}")]
    ActivityCode(String),

    #[error("Rate {rate} for activity {code} outside 0..=100 per mille")]
    ActivityRate { code: String, rate: Decimal },

    #[error("Percentage {field} = {value} outside 0..=100")]
    Percentage { field: &'static str, value: Decimal },

    #[error("{field} cannot be negative: {value}")]
    Negative { field: &'static str, value: Decimal },

    #[error("{field} = {value} exceeds the maximum of {max}")]
    TooLarge {
        field: &'static str,
        value: Decimal,
        max: Decimal,
    },

    #[error("NIT {nit} does not match verification digit {digit}")]
    NitCheckDigit { nit: String, digit: String },

    #[error("Document number must be numeric: {0:?}")]
    DocumentNumber(String),

    #[error("Missing required field: {0}")]
    Missing(&'static str),

    #[error("Oath must be accepted to sign")]
    OathNotAccepted,
}

/// Validate a tax year against the current civil year
pub fn validate_tax_year(year: i32, current_year: i32) -> Result<(), ValidationError> {
    let max = current_year + 1;
    if (MIN_TAX_YEAR..=max).contains(&year) {
        Ok(())
    } else {
        Err(ValidationError::TaxYear {
            year,
            min: MIN_TAX_YEAR,
            max,
        })
    }
}

/// CIIU codes are 1 to 6 ASCII alphanumerics
pub fn validate_activity_code(code: &str) -> Result<(), ValidationError> {
    let valid = !code.is_empty()
        && code.len() <= 6
        && code.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::ActivityCode(code.to_string()))
    }
}

fn validate_activity_rate(code: &str, rate: PerMille) -> Result<(), ValidationError> {
    let value = rate.value();
    if value < Decimal::ZERO || value > MAX_ACTIVITY_RATE {
        return Err(ValidationError::ActivityRate {
            code: code.to_string(),
            rate: value,
        });
    }
    Ok(())
}

pub fn validate_activity(activity: &TaxableActivity) -> Result<(), ValidationError> {
    validate_activity_code(&activity.activity_code)?;
    validate_activity_rate(&activity.activity_code, activity.standard_rate)?;
    if let Some(special) = activity.special_rate {
        validate_activity_rate(&activity.activity_code, special)?;
    }
    Ok(())
}

fn validate_percent(field: &'static str, pct: Percent) -> Result<(), ValidationError> {
    let value = pct.value();
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::Percentage { field, value });
    }
    Ok(())
}

/// Compute the NIT verification digit (modulo 11 with prime weights)
pub fn nit_check_digit(nit: &str) -> Option<u32> {
    if nit.is_empty() || nit.len() > NIT_WEIGHTS.len() || !nit.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let total: u32 = nit
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .zip(NIT_WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();
    let remainder = total % 11;
    Some(if remainder > 1 { 11 - remainder } else { remainder })
}

/// An empty taxpayer is allowed on a fresh draft; once a document number is
/// present it must be numeric and match its check digit.
pub fn validate_taxpayer(taxpayer: &Taxpayer) -> Result<(), ValidationError> {
    let nit = taxpayer.document_number.trim();
    if nit.is_empty() {
        return Ok(());
    }
    if !nit.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::DocumentNumber(nit.to_string()));
    }
    if let Some(digit) = taxpayer.verification_digit.as_deref() {
        let expected = nit_check_digit(nit).map(|d| d.to_string());
        if expected.as_deref() != Some(digit) {
            return Err(ValidationError::NitCheckDigit {
                nit: nit.to_string(),
                digit: digit.to_string(),
            });
        }
    }
    Ok(())
}

/// Validate every section of a declaration
pub fn validate_sections(sections: &DeclarationSections) -> Result<(), ValidationError> {
    validate_taxpayer(&sections.taxpayer)?;
    for activity in &sections.activities {
        validate_activity(activity)?;
    }
    Ok(())
}

/// Validate a municipality's parameter set
pub fn validate_parameters(params: &FormulaParameters) -> Result<(), ValidationError> {
    validate_percent("avisos_tableros_pct", params.avisos_tableros_pct)?;
    validate_percent("bomberil_surcharge_pct", params.bomberil_surcharge_pct)?;
    validate_percent("security_surcharge_pct", params.security_surcharge_pct)?;
    validate_percent("early_payment_discount_pct", params.early_payment_discount_pct)?;
    validate_percent("late_interest_monthly_pct", params.late_interest_monthly_pct)?;
    if params.energy_rate_per_kw < Decimal::ZERO {
        return Err(ValidationError::Negative {
            field: "energy_rate_per_kw",
            value: params.energy_rate_per_kw,
        });
    }
    if params.energy_rate_per_kw > MAX_ENERGY_RATE_PER_KW {
        return Err(ValidationError::TooLarge {
            field: "energy_rate_per_kw",
            value: params.energy_rate_per_kw,
            max: MAX_ENERGY_RATE_PER_KW,
        });
    }
    Ok(())
}

/// Validate signature data before sealing
pub fn validate_signature(data: &SignatureData) -> Result<(), ValidationError> {
    if data.declarant_name.trim().chars().count() < 2 {
        return Err(ValidationError::Missing("declarant_name"));
    }
    if data.declarant_document.trim().is_empty() {
        return Err(ValidationError::Missing("declarant_document"));
    }
    if data.declarant_signature.trim().is_empty() {
        return Err(ValidationError::Missing("declarant_signature"));
    }
    if !data.declarant_oath_accepted {
        return Err(ValidationError::OathNotAccepted);
    }
    if data.requires_fiscal_reviewer {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !present(&data.accountant_name) {
            return Err(ValidationError::Missing("accountant_name"));
        }
        if !present(&data.accountant_professional_card) {
            return Err(ValidationError::Missing("accountant_professional_card"));
        }
        if !present(&data.accountant_signature) {
            return Err(ValidationError::Missing("accountant_signature"));
        }
    }
    Ok(())
}
