//! Section G - signature and responsibility

use crate::declaration::{DeclarationId, UserId};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// How a signature artifact was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignatureMethod {
    /// Drawn on a canvas
    #[default]
    Handwritten,
    /// Uploaded image of a signature
    Uploaded,
}

/// Signature data submitted with a sign request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureData {
    pub declarant_name: String,
    pub declarant_document: String,
    #[serde(default)]
    pub declarant_signature_method: SignatureMethod,
    /// Reference to the stored signature artifact (path or data URI)
    pub declarant_signature: String,
    pub declarant_oath_accepted: bool,
    #[serde(default)]
    pub declaration_date: Option<NaiveDate>,

    #[serde(default)]
    pub requires_fiscal_reviewer: bool,
    #[serde(default)]
    pub accountant_name: Option<String>,
    #[serde(default)]
    pub accountant_document: Option<String>,
    #[serde(default)]
    pub accountant_professional_card: Option<String>,
    #[serde(default)]
    pub accountant_signature_method: Option<SignatureMethod>,
    #[serde(default)]
    pub accountant_signature: Option<String>,
}

/// Origin of the request, recorded with the signature and the audit entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Ed25519 signature over the document hash made with the system key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSeal {
    /// Public key (hex-encoded)
    pub public_key: String,
    /// Signature bytes (hex-encoded)
    pub signature: String,
}

/// Stored signature record. At most one per declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub declaration_id: DeclarationId,
    pub signer_id: UserId,
    pub data: SignatureData,
    /// SHA-256 hex digest; authoritative, never re-derived for display
    pub document_hash: String,
    pub seal: Option<SystemSeal>,
    pub signed_at: DateTime<FixedOffset>,
    pub request: RequestMeta,
}
