//! Child records of a declaration
//!
//! Each section holds raw editable inputs. Derived totals live only in
//! [`DeclarationResult`], which is rewritten every time the engine runs.
//!
//! Sections are plain typed values: spawning a correction clones
//! [`DeclarationSections`] as a whole, so adding a field to any section is
//! picked up by the copy without touching the lifecycle code.

use crate::amount::Amount;
use crate::rate::PerMille;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Section A - taxpayer identification and location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxpayer {
    pub document_type: String,
    pub document_number: String,
    pub verification_digit: Option<String>,
    pub legal_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Section B - taxable base inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomeBase {
    /// Gross income earned in the whole country
    pub gross_income_country: Amount,
    /// Portion earned outside this municipality
    pub income_outside_municipality: Amount,
    pub returns_rebates: Amount,
    pub exports_and_fixed_asset_sales: Amount,
    pub excluded_or_non_taxable: Amount,
    pub exempt_income: Amount,
}

impl IncomeBase {
    /// Sum of the four deduction rows
    pub fn deductions(&self) -> Decimal {
        [
            self.returns_rebates,
            self.exports_and_fixed_asset_sales,
            self.excluded_or_non_taxable,
            self.exempt_income,
        ]
        .iter()
        .sum()
    }
}

/// Section C - one taxed economic activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxableActivity {
    /// CIIU activity code
    pub activity_code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub income: Amount,
    /// Municipal rate for the activity code
    pub standard_rate: PerMille,
    /// Overrides `standard_rate` when present
    #[serde(default)]
    pub special_rate: Option<PerMille>,
}

impl TaxableActivity {
    /// The rate actually applied to this activity
    pub fn effective_rate(&self) -> PerMille {
        self.special_rate.unwrap_or(self.standard_rate)
    }
}

/// Energy generation surcharge inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyGeneration {
    pub installed_capacity_kw: Amount,
}

/// Section D - settlement inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxSettlement {
    pub additional_financial_units_fee: Amount,
}

/// Section E - credits, advances and penalties
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountsCredits {
    pub exemptions: Amount,
    pub withholdings_municipality: Amount,
    pub self_withholdings: Amount,
    pub previous_year_advance: Amount,
    pub next_year_advance: Amount,
    pub penalties: Amount,
    pub previous_balance_in_favor: Amount,
}

/// Payment section inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSection {
    /// Civil date the payment is (or will be) made
    pub payment_date: Option<NaiveDate>,
    pub voluntary_contribution: Amount,
}

/// Section F - last persisted derived rows, rounded for presentation.
///
/// Only one of `amount_due` / `balance_in_favor` is ever non-zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarationResult {
    pub total_income_in_municipality: Decimal,
    pub taxable_income: Decimal,
    pub total_activities_tax: Decimal,
    pub energy_tax: Decimal,
    pub total_ica_tax: Decimal,
    pub signs_boards_tax: Decimal,
    pub bomberil_surcharge: Decimal,
    pub security_surcharge: Decimal,
    pub total_tax_payable: Decimal,
    pub amount_due: Decimal,
    pub balance_in_favor: Decimal,
    pub early_payment_discount: Decimal,
    pub late_interest: Decimal,
    pub total_after_discount: Decimal,
    pub total_with_voluntary: Decimal,
    pub calculated_at: Option<DateTime<FixedOffset>>,
}

/// Every child record of one declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarationSections {
    pub taxpayer: Taxpayer,
    pub income_base: IncomeBase,
    pub activities: Vec<TaxableActivity>,
    pub energy_generation: EnergyGeneration,
    pub settlement: TaxSettlement,
    pub payment: PaymentSection,
    pub discounts: DiscountsCredits,
    pub result: DeclarationResult,
}

/// Partial update of a draft. A present section replaces the stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionsUpdate {
    pub taxpayer: Option<Taxpayer>,
    pub income_base: Option<IncomeBase>,
    pub activities: Option<Vec<TaxableActivity>>,
    pub energy_generation: Option<EnergyGeneration>,
    pub settlement: Option<TaxSettlement>,
    pub payment: Option<PaymentSection>,
    pub discounts: Option<DiscountsCredits>,
}

impl SectionsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Names of the sections this update touches, for the audit trail
    pub fn touched(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.taxpayer.is_some() {
            names.push("taxpayer");
        }
        if self.income_base.is_some() {
            names.push("income_base");
        }
        if self.activities.is_some() {
            names.push("activities");
        }
        if self.energy_generation.is_some() {
            names.push("energy_generation");
        }
        if self.settlement.is_some() {
            names.push("settlement");
        }
        if self.payment.is_some() {
            names.push("payment");
        }
        if self.discounts.is_some() {
            names.push("discounts");
        }
        names
    }

    /// Apply onto a set of sections. The derived result is left untouched;
    /// it is stale until the engine runs again.
    pub fn apply_to(self, sections: &mut DeclarationSections) {
        if let Some(taxpayer) = self.taxpayer {
            sections.taxpayer = taxpayer;
        }
        if let Some(income_base) = self.income_base {
            sections.income_base = income_base;
        }
        if let Some(activities) = self.activities {
            sections.activities = activities;
        }
        if let Some(energy) = self.energy_generation {
            sections.energy_generation = energy;
        }
        if let Some(settlement) = self.settlement {
            sections.settlement = settlement;
        }
        if let Some(payment) = self.payment {
            sections.payment = payment;
        }
        if let Some(discounts) = self.discounts {
            sections.discounts = discounts;
        }
    }
}
