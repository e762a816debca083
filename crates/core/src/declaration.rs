//! Declaration header and lifecycle enums

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Row id of a declaration in the store
pub type DeclarationId = i64;

/// Identifier of the submitting user (issued by the external auth system)
pub type UserId = String;

/// Municipality code (DANE code, e.g. "05001")
pub type MunicipalityId = String;

/// Declaration type - single choice on the form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeclarationType {
    /// First filing for the tax year
    Initial,
    /// Replaces a signed initial declaration
    Correction,
}

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeclarationStatus {
    /// Editable
    Draft,
    /// Sealed; no field may change
    Signed,
    /// Administratively annulled
    Voided,
}

/// Declaration header.
///
/// # Invariants
/// - `filing_number.is_some() == is_signed`
/// - `correction_of.is_some() == (declaration_type == Correction)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclarationId,
    pub tax_year: i32,
    pub declaration_type: DeclarationType,
    pub status: DeclarationStatus,
    pub owner_id: UserId,
    pub municipality_id: MunicipalityId,

    /// Draft number (consecutivo), assigned at creation
    pub form_number: String,

    /// Filing number (radicado), assigned at signing
    pub filing_number: Option<String>,

    pub correction_of: Option<DeclarationId>,
    pub has_been_corrected: bool,

    pub is_signed: bool,
    pub signed_at: Option<DateTime<FixedOffset>>,
    pub signed_by: Option<UserId>,
    pub integrity_hash: Option<String>,

    pub void_reason: Option<String>,

    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl Declaration {
    pub fn is_draft(&self) -> bool {
        self.status == DeclarationStatus::Draft
    }

    pub fn is_correction(&self) -> bool {
        self.declaration_type == DeclarationType::Correction
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        self.owner_id == user
    }
}
