//! ICA Numbering - Per-municipality counters
//!
//! Two independent sequences per municipality:
//! - `consecutivo`: draft number assigned at creation (gaps tolerated)
//! - `radicado`: filing number assigned at signing (gapless, strictly increasing)
//!
//! A counter is only ever advanced through [`allocate`], a single
//! `UPDATE ... RETURNING` statement, so two connections can never read the
//! same value.

mod counter;
mod error;
mod fallback;

pub use counter::{
    allocate, configure, format_number, init_schema, issue, peek, CounterConfig, IssuedNumber,
    NumberSource, Sequence, DEFAULT_DIGIT_WIDTH,
};
pub use error::NumberingError;
pub use fallback::{fallback_filing_number, fallback_form_number, FALLBACK_FILING_PREFIX};
