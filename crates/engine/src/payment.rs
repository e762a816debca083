//! Payment adjustments
//!
//! Day counting is calendar based on civil dates. The early-payment window
//! opens on 1 January of the filing year (the year after the tax year) and
//! lasts `early_payment_days` days. Late interest accrues for every started
//! 30-day month after the filing deadline.

use chrono::NaiveDate;
use ica_core::FormulaParameters;
use rust_decimal::Decimal;

/// Days in one interest month
pub const DAYS_PER_MONTH: i64 = 30;

/// First day of the early-payment window for a tax year
pub fn early_window_opens(tax_year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(tax_year.checked_add(1)?, 1, 1)
}

/// Whether a payment on `payment_date` earns the early-payment discount
pub fn within_early_window(
    tax_year: i32,
    payment_date: NaiveDate,
    params: &FormulaParameters,
) -> bool {
    if params.early_payment_days == 0 {
        return false;
    }
    let Some(opens) = early_window_opens(tax_year) else {
        return false;
    };
    let elapsed = (payment_date - opens).num_days();
    let in_window = elapsed >= 0 && elapsed < i64::from(params.early_payment_days);
    let before_deadline = params.filing_deadline.map_or(true, |deadline| payment_date <= deadline);
    in_window && before_deadline
}

/// Days elapsed past the filing deadline, zero when on time
pub fn days_late(payment_date: NaiveDate, params: &FormulaParameters) -> i64 {
    params
        .filing_deadline
        .map(|deadline| (payment_date - deadline).num_days().max(0))
        .unwrap_or(0)
}

/// Started months of delay; any fraction of a month counts as a month
pub fn months_late(days_late: i64) -> i64 {
    if days_late <= 0 {
        0
    } else {
        (days_late + DAYS_PER_MONTH - 1) / DAYS_PER_MONTH
    }
}

pub fn early_payment_discount(
    amount_due: Decimal,
    tax_year: i32,
    payment_date: Option<NaiveDate>,
    params: &FormulaParameters,
) -> Decimal {
    match payment_date {
        Some(date) if within_early_window(tax_year, date, params) => {
            params.early_payment_discount_pct.apply(amount_due)
        }
        _ => Decimal::ZERO,
    }
}

pub fn late_interest(
    amount_due: Decimal,
    payment_date: Option<NaiveDate>,
    params: &FormulaParameters,
) -> Decimal {
    let Some(date) = payment_date else {
        return Decimal::ZERO;
    };
    let months = months_late(days_late(date, params));
    params.late_interest_monthly_pct.apply(amount_due) * Decimal::from(months)
}
