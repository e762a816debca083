//! ICA Engine - Declaration calculation
//!
//! Turns the raw inputs of a declaration into every derived row. The engine
//! is a fixed pipeline of small pure functions:
//!
//! 1. income: total income in the municipality, taxable income
//! 2. activities: per-activity tax at the per-mille rate
//! 3. settlement: energy tax, total ICA tax, surcharges, total payable
//! 4. balance: net balance split into amount due or balance in favor
//! 5. payment: early-payment discount, late interest, voluntary contribution
//!
//! Nothing here performs I/O or returns an error. Inputs are validated by
//! `ica_core::validation` before they reach the engine.

pub mod engine;
pub mod payment;
pub mod result;
pub mod rows;

pub use engine::{calculate, CalculationInput};
pub use result::{present, ActivityTax, Balance, CalculationResult};
