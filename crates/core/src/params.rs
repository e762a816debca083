//! Formula parameters per municipality
//!
//! Every percentage, rate and day threshold the engine uses comes from here,
//! never from a literal in the engine. Values can be provided as a JSON file;
//! missing fields fall back to the defaults below.

use crate::declaration::MunicipalityId;
use crate::rate::Percent;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration consumed read-only by the calculation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaParameters {
    /// Signs and boards tax, as a share of the total ICA tax
    #[serde(default = "default_avisos_tableros_pct")]
    pub avisos_tableros_pct: Percent,

    /// Fire-brigade surcharge, as a share of the total ICA tax
    #[serde(default)]
    pub bomberil_surcharge_pct: Percent,

    /// Citizen-security surcharge, as a share of the total ICA tax
    #[serde(default)]
    pub security_surcharge_pct: Percent,

    /// Statutory pesos per installed kW of generation capacity
    #[serde(default)]
    pub energy_rate_per_kw: Decimal,

    /// Discount granted for paying inside the early window
    #[serde(default)]
    pub early_payment_discount_pct: Percent,

    /// Length of the early window, counted from 1 January of the filing year
    #[serde(default)]
    pub early_payment_days: u32,

    /// Interest charged per started month of delay
    #[serde(default)]
    pub late_interest_monthly_pct: Percent,

    /// Last day to file without interest
    #[serde(default)]
    pub filing_deadline: Option<NaiveDate>,
}

fn default_avisos_tableros_pct() -> Percent {
    Percent::new(Decimal::new(15, 0))
}

impl Default for FormulaParameters {
    fn default() -> Self {
        Self {
            avisos_tableros_pct: default_avisos_tableros_pct(),
            bomberil_surcharge_pct: Percent::ZERO,
            security_surcharge_pct: Percent::ZERO,
            energy_rate_per_kw: Decimal::ZERO,
            early_payment_discount_pct: Percent::ZERO,
            early_payment_days: 0,
            late_interest_monthly_pct: Percent::ZERO,
            filing_deadline: None,
        }
    }
}

/// Read-only source of formula parameters
pub trait ParameterSource: Send + Sync {
    /// Parameters for a municipality, or `None` if it is not configured
    fn parameters(&self, municipality: &str) -> Option<FormulaParameters>;
}

/// File-backed parameter table keyed by municipality code.
///
/// An optional `fallback` entry is used for municipalities without their own
/// entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MunicipalityParameters {
    #[serde(default)]
    pub fallback: Option<FormulaParameters>,
    #[serde(default)]
    pub municipalities: HashMap<MunicipalityId, FormulaParameters>,
}

impl MunicipalityParameters {
    /// Load the table from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn insert(&mut self, municipality: impl Into<MunicipalityId>, params: FormulaParameters) {
        self.municipalities.insert(municipality.into(), params);
    }
}

impl ParameterSource for MunicipalityParameters {
    fn parameters(&self, municipality: &str) -> Option<FormulaParameters> {
        self.municipalities
            .get(municipality)
            .or(self.fallback.as_ref())
            .cloned()
    }
}
