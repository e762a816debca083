//! Row formulas
//!
//! One function per derived row. All arithmetic is full precision; rounding
//! happens once, in [`crate::result::present`].

use crate::result::{ActivityTax, Balance};
use ica_core::{
    DiscountsCredits, EnergyGeneration, FormulaParameters, IncomeBase, TaxSettlement,
    TaxableActivity,
};
use rust_decimal::Decimal;

/// Gross country income minus income earned elsewhere
pub fn total_income_in_municipality(income: &IncomeBase) -> Decimal {
    income.gross_income_country.value() - income.income_outside_municipality.value()
}

/// Income in the municipality minus deductions, clamped at zero
pub fn taxable_income(income: &IncomeBase) -> Decimal {
    let taxable = total_income_in_municipality(income) - income.deductions();
    taxable.max(Decimal::ZERO)
}

/// Tax generated by one activity: `income × rate / 1000`
pub fn activity_tax(activity: &TaxableActivity) -> ActivityTax {
    let rate = activity.effective_rate();
    ActivityTax {
        activity_code: activity.activity_code.clone(),
        income: activity.income.value(),
        rate,
        tax: rate.apply(activity.income.value()),
    }
}

pub fn activities_tax(activities: &[TaxableActivity]) -> Vec<ActivityTax> {
    activities.iter().map(activity_tax).collect()
}

pub fn total_activities_tax(lines: &[ActivityTax]) -> Decimal {
    lines.iter().map(|line| line.tax).sum()
}

/// Surcharge on installed generation capacity. Both factors are bounded
/// upstream: capacity by `MAX_AMOUNT`, the rate by `MAX_ENERGY_RATE_PER_KW`.
pub fn energy_tax(energy: &EnergyGeneration, params: &FormulaParameters) -> Decimal {
    energy.installed_capacity_kw.value() * params.energy_rate_per_kw
}

pub fn total_ica_tax(total_activities_tax: Decimal, energy_tax: Decimal) -> Decimal {
    total_activities_tax + energy_tax
}

/// Municipal levies computed as shares of the total ICA tax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levies {
    pub signs_boards_tax: Decimal,
    pub bomberil_surcharge: Decimal,
    pub security_surcharge: Decimal,
}

pub fn levies(total_ica_tax: Decimal, params: &FormulaParameters) -> Levies {
    Levies {
        signs_boards_tax: params.avisos_tableros_pct.apply(total_ica_tax),
        bomberil_surcharge: params.bomberil_surcharge_pct.apply(total_ica_tax),
        security_surcharge: params.security_surcharge_pct.apply(total_ica_tax),
    }
}

pub fn total_tax_payable(
    total_ica_tax: Decimal,
    levies: &Levies,
    settlement: &TaxSettlement,
) -> Decimal {
    total_ica_tax
        + levies.signs_boards_tax
        + settlement.additional_financial_units_fee.value()
        + levies.bomberil_surcharge
        + levies.security_surcharge
}

/// Total payable, minus credits, plus next-year advance and penalties,
/// minus any balance carried in favor from the previous period.
pub fn net_balance(total_tax_payable: Decimal, credits: &DiscountsCredits) -> Decimal {
    let subtractions = credits.exemptions.value()
        + credits.withholdings_municipality.value()
        + credits.self_withholdings.value()
        + credits.previous_year_advance.value();
    let additions = credits.next_year_advance.value() + credits.penalties.value();

    total_tax_payable - subtractions + additions - credits.previous_balance_in_favor.value()
}

pub fn split_balance(net_balance: Decimal) -> Balance {
    if net_balance > Decimal::ZERO {
        Balance::Due(net_balance)
    } else {
        Balance::InFavor(net_balance.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ica_core::{Amount, Percent, PerMille};
    use rust_decimal_macros::dec;

    fn amount(val: Decimal) -> Amount {
        Amount::new(val).unwrap()
    }

    #[test]
    fn test_total_income_in_municipality() {
        let income = IncomeBase {
            gross_income_country: amount(dec!(10_000_000)),
            income_outside_municipality: amount(dec!(1_000_000)),
            ..Default::default()
        };
        assert_eq!(total_income_in_municipality(&income), dec!(9_000_000));
    }

    #[test]
    fn test_taxable_income_clamped_at_zero() {
        let income = IncomeBase {
            gross_income_country: amount(dec!(1_000_000)),
            returns_rebates: amount(dec!(500_000)),
            exports_and_fixed_asset_sales: amount(dec!(500_000)),
            excluded_or_non_taxable: amount(dec!(500_000)),
            exempt_income: amount(dec!(500_000)),
            ..Default::default()
        };
        assert_eq!(taxable_income(&income), Decimal::ZERO);
    }

    #[test]
    fn test_taxable_income_when_outside_exceeds_gross() {
        let income = IncomeBase {
            gross_income_country: amount(dec!(100)),
            income_outside_municipality: amount(dec!(400)),
            ..Default::default()
        };
        assert_eq!(total_income_in_municipality(&income), dec!(-300));
        assert_eq!(taxable_income(&income), Decimal::ZERO);
    }

    #[test]
    fn test_activity_tax_per_mille() {
        let activity = TaxableActivity {
            activity_code: "G4711".to_string(),
            description: None,
            income: amount(dec!(10_000_000)),
            standard_rate: PerMille::new(dec!(4.14)),
            special_rate: None,
        };
        assert_eq!(activity_tax(&activity).tax, dec!(41_400));
    }

    #[test]
    fn test_total_activities_tax_sums_lines() {
        let activities = vec![
            TaxableActivity {
                activity_code: "4711".to_string(),
                description: None,
                income: amount(dec!(5_000_000)),
                standard_rate: PerMille::new(dec!(4.14)),
                special_rate: None,
            },
            TaxableActivity {
                activity_code: "6201".to_string(),
                description: None,
                income: amount(dec!(3_000_000)),
                standard_rate: PerMille::new(dec!(9.66)),
                special_rate: Some(PerMille::new(dec!(7))),
            },
        ];
        let lines = activities_tax(&activities);
        // 20_700 + 21_000
        assert_eq!(total_activities_tax(&lines), dec!(41_700));
    }

    #[test]
    fn test_energy_tax() {
        let energy = EnergyGeneration {
            installed_capacity_kw: amount(dec!(2_500)),
        };
        let params = FormulaParameters {
            energy_rate_per_kw: dec!(5.5),
            ..Default::default()
        };
        assert_eq!(energy_tax(&energy, &params), dec!(13_750));
    }

    #[test]
    fn test_levies_driven_by_parameters() {
        let params = FormulaParameters {
            avisos_tableros_pct: Percent::new(dec!(15)),
            bomberil_surcharge_pct: Percent::new(dec!(4)),
            security_surcharge_pct: Percent::new(dec!(1)),
            ..Default::default()
        };
        let levies = levies(dec!(100_000), &params);
        assert_eq!(levies.signs_boards_tax, dec!(15_000));
        assert_eq!(levies.bomberil_surcharge, dec!(4_000));
        assert_eq!(levies.security_surcharge, dec!(1_000));

        let settlement = TaxSettlement {
            additional_financial_units_fee: amount(dec!(500)),
        };
        assert_eq!(total_tax_payable(dec!(100_000), &levies, &settlement), dec!(120_500));
    }

    #[test]
    fn test_net_balance_formula() {
        let credits = DiscountsCredits {
            exemptions: amount(dec!(100)),
            withholdings_municipality: amount(dec!(200)),
            self_withholdings: amount(dec!(300)),
            previous_year_advance: amount(dec!(400)),
            next_year_advance: amount(dec!(1_000)),
            penalties: amount(dec!(50)),
            previous_balance_in_favor: amount(dec!(25)),
        };
        // 5000 - 1000 + 1050 - 25
        assert_eq!(net_balance(dec!(5_000), &credits), dec!(5_025));
    }

    #[test]
    fn test_split_balance_exclusive() {
        assert_eq!(split_balance(dec!(10)), Balance::Due(dec!(10)));
        assert_eq!(split_balance(dec!(-10)), Balance::InFavor(dec!(10)));
        assert_eq!(split_balance(Decimal::ZERO), Balance::InFavor(Decimal::ZERO));
    }
}
