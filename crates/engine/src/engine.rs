//! Calculation pipeline

use crate::payment;
use crate::result::CalculationResult;
use crate::rows;
use ica_core::{DeclarationSections, FormulaParameters};

/// Immutable snapshot the engine works on
#[derive(Debug, Clone, Copy)]
pub struct CalculationInput<'a> {
    pub tax_year: i32,
    pub sections: &'a DeclarationSections,
    pub parameters: &'a FormulaParameters,
}

/// Run the full pipeline. Deterministic: the same snapshot always yields the
/// same result.
pub fn calculate(input: CalculationInput<'_>) -> CalculationResult {
    let sections = input.sections;
    let params = input.parameters;

    // Taxable base
    let total_income_in_municipality = rows::total_income_in_municipality(&sections.income_base);
    let taxable_income = rows::taxable_income(&sections.income_base);

    // Activities
    let activities = rows::activities_tax(&sections.activities);
    let total_activities_tax = rows::total_activities_tax(&activities);

    // Settlement
    let energy_tax = rows::energy_tax(&sections.energy_generation, params);
    let total_ica_tax = rows::total_ica_tax(total_activities_tax, energy_tax);
    let levies = rows::levies(total_ica_tax, params);
    let total_tax_payable = rows::total_tax_payable(total_ica_tax, &levies, &sections.settlement);

    // Balance
    let net_balance = rows::net_balance(total_tax_payable, &sections.discounts);
    let balance = rows::split_balance(net_balance);
    let amount_due = balance.amount_due();

    // Payment
    let payment_date = sections.payment.payment_date;
    let early_payment_discount =
        payment::early_payment_discount(amount_due, input.tax_year, payment_date, params);
    let late_interest = payment::late_interest(amount_due, payment_date, params);
    let total_after_discount = amount_due - early_payment_discount + late_interest;
    let total_with_voluntary =
        total_after_discount + sections.payment.voluntary_contribution.value();

    CalculationResult {
        total_income_in_municipality,
        taxable_income,
        activities,
        total_activities_tax,
        energy_tax,
        total_ica_tax,
        signs_boards_tax: levies.signs_boards_tax,
        bomberil_surcharge: levies.bomberil_surcharge,
        security_surcharge: levies.security_surcharge,
        total_tax_payable,
        net_balance,
        balance,
        early_payment_discount,
        late_interest,
        total_after_discount,
        total_with_voluntary,
    }
}
