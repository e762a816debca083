//! Calculation output

use chrono::{DateTime, FixedOffset};
use ica_core::{DeclarationResult, PerMille};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Round a row for presentation: whole pesos, half away from zero
pub fn present(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Sign of the final balance. Exactly one side exists, so a declaration can
/// never show both an amount due and a balance in favor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Balance {
    Due(Decimal),
    InFavor(Decimal),
}

impl Balance {
    pub fn amount_due(&self) -> Decimal {
        match self {
            Balance::Due(amount) => *amount,
            Balance::InFavor(_) => Decimal::ZERO,
        }
    }

    pub fn balance_in_favor(&self) -> Decimal {
        match self {
            Balance::Due(_) => Decimal::ZERO,
            Balance::InFavor(amount) => *amount,
        }
    }
}

/// Tax line for one activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTax {
    pub activity_code: String,
    pub income: Decimal,
    pub rate: PerMille,
    pub tax: Decimal,
}

/// Every derived row, at full precision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub total_income_in_municipality: Decimal,
    pub taxable_income: Decimal,
    pub activities: Vec<ActivityTax>,
    pub total_activities_tax: Decimal,
    pub energy_tax: Decimal,
    pub total_ica_tax: Decimal,
    pub signs_boards_tax: Decimal,
    pub bomberil_surcharge: Decimal,
    pub security_surcharge: Decimal,
    pub total_tax_payable: Decimal,
    pub net_balance: Decimal,
    pub balance: Balance,
    pub early_payment_discount: Decimal,
    pub late_interest: Decimal,
    pub total_after_discount: Decimal,
    pub total_with_voluntary: Decimal,
}

impl CalculationResult {
    pub fn amount_due(&self) -> Decimal {
        self.balance.amount_due()
    }

    pub fn balance_in_favor(&self) -> Decimal {
        self.balance.balance_in_favor()
    }

    /// Copy of this result with every row rounded for presentation
    pub fn presented(&self) -> CalculationResult {
        let balance = match self.balance {
            Balance::Due(amount) => Balance::Due(present(amount)),
            Balance::InFavor(amount) => Balance::InFavor(present(amount)),
        };
        CalculationResult {
            total_income_in_municipality: present(self.total_income_in_municipality),
            taxable_income: present(self.taxable_income),
            activities: self
                .activities
                .iter()
                .map(|line| ActivityTax {
                    activity_code: line.activity_code.clone(),
                    income: present(line.income),
                    rate: line.rate,
                    tax: present(line.tax),
                })
                .collect(),
            total_activities_tax: present(self.total_activities_tax),
            energy_tax: present(self.energy_tax),
            total_ica_tax: present(self.total_ica_tax),
            signs_boards_tax: present(self.signs_boards_tax),
            bomberil_surcharge: present(self.bomberil_surcharge),
            security_surcharge: present(self.security_surcharge),
            total_tax_payable: present(self.total_tax_payable),
            net_balance: present(self.net_balance),
            balance,
            early_payment_discount: present(self.early_payment_discount),
            late_interest: present(self.late_interest),
            total_after_discount: present(self.total_after_discount),
            total_with_voluntary: present(self.total_with_voluntary),
        }
    }

    /// Presentation rows in the shape stored on the declaration
    pub fn to_record(&self, calculated_at: DateTime<FixedOffset>) -> DeclarationResult {
        let rows = self.presented();
        DeclarationResult {
            total_income_in_municipality: rows.total_income_in_municipality,
            taxable_income: rows.taxable_income,
            total_activities_tax: rows.total_activities_tax,
            energy_tax: rows.energy_tax,
            total_ica_tax: rows.total_ica_tax,
            signs_boards_tax: rows.signs_boards_tax,
            bomberil_surcharge: rows.bomberil_surcharge,
            security_surcharge: rows.security_surcharge,
            total_tax_payable: rows.total_tax_payable,
            amount_due: rows.amount_due(),
            balance_in_favor: rows.balance_in_favor(),
            early_payment_discount: rows.early_payment_discount,
            late_interest: rows.late_interest,
            total_after_discount: rows.total_after_discount,
            total_with_voluntary: rows.total_with_voluntary,
            calculated_at: Some(calculated_at),
        }
    }
}
