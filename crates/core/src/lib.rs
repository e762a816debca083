//! ICA Core - Domain types
//!
//! This crate contains the fundamental types shared by the ICA workspace:
//! - `Amount`: Non-negative decimal wrapper for peso amounts
//! - `PerMille` / `Percent`: Typed rates, so a per-mille activity rate can
//!   never be applied as a percentage
//! - `Declaration` and its child sections
//! - `FormulaParameters`: per-municipality configuration read by the engine

pub mod amount;
pub mod declaration;
pub mod params;
pub mod rate;
pub mod sections;
pub mod signature;
pub mod validation;

pub use amount::{Amount, AmountError};
pub use declaration::{
    Declaration, DeclarationId, DeclarationStatus, DeclarationType, MunicipalityId, UserId,
};
pub use params::{FormulaParameters, MunicipalityParameters, ParameterSource};
pub use rate::{Percent, PerMille};
pub use sections::{
    DeclarationResult, DeclarationSections, DiscountsCredits, EnergyGeneration, IncomeBase,
    PaymentSection, SectionsUpdate, TaxSettlement, TaxableActivity, Taxpayer,
};
pub use signature::{RequestMeta, SignatureData, SignatureInfo, SignatureMethod, SystemSeal};
pub use validation::{validate_sections, ValidationError};
