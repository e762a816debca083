//! Counter table and atomic allocation

use crate::error::NumberingError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Zero-padding width used when none is configured
pub const DEFAULT_DIGIT_WIDTH: u32 = 16;

/// Which of a municipality's two sequences to draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Sequence {
    /// Draft number, assigned at creation
    Consecutivo,
    /// Filing number, assigned at signing
    Radicado,
}

/// Counter state: the next value to hand out and how to format it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterConfig {
    pub prefix: String,
    pub current_value: u64,
    pub digit_width: u32,
}

impl CounterConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            current_value: 1,
            digit_width: DEFAULT_DIGIT_WIDTH,
        }
    }

    pub fn starting_at(mut self, value: u64) -> Self {
        self.current_value = value;
        self
    }

    pub fn with_width(mut self, digit_width: u32) -> Self {
        self.digit_width = digit_width;
        self
    }
}

/// Where an issued number came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum NumberSource {
    /// Drawn from the municipality's counter
    Counter { value: u64 },
    /// No counter configured; non-sequential identifier
    Fallback,
}

/// A formatted number ready to store on a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedNumber {
    pub number: String,
    pub source: NumberSource,
}

impl IssuedNumber {
    pub fn is_fallback(&self) -> bool {
        self.source == NumberSource::Fallback
    }
}

/// `prefix + value` left-padded with zeros to `digit_width`. Values wider
/// than the width are printed in full.
pub fn format_number(prefix: &str, value: u64, digit_width: u32) -> String {
    format!("{}{:0width$}", prefix, value, width = digit_width as usize)
}

/// Create the counter table
pub fn init_schema(conn: &Connection) -> Result<(), NumberingError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS numbering_counters (
            municipality_id TEXT NOT NULL,
            sequence TEXT NOT NULL,
            prefix TEXT NOT NULL DEFAULT '',
            current_value INTEGER NOT NULL CHECK (current_value >= 0),
            digit_width INTEGER NOT NULL CHECK (digit_width BETWEEN 1 AND 32),
            PRIMARY KEY (municipality_id, sequence)
        )",
        [],
    )?;
    Ok(())
}

/// Create or replace a counter
pub fn configure(
    conn: &Connection,
    municipality: &str,
    sequence: Sequence,
    config: &CounterConfig,
) -> Result<(), NumberingError> {
    if config.digit_width == 0 || config.digit_width > 32 {
        return Err(NumberingError::InvalidConfig(format!(
            "digit width must be between 1 and 32, got {}",
            config.digit_width
        )));
    }
    conn.execute(
        "INSERT INTO numbering_counters
         (municipality_id, sequence, prefix, current_value, digit_width)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (municipality_id, sequence) DO UPDATE SET
            prefix = excluded.prefix,
            current_value = excluded.current_value,
            digit_width = excluded.digit_width",
        params![
            municipality,
            sequence.to_string(),
            config.prefix,
            config.current_value,
            config.digit_width,
        ],
    )?;
    tracing::info!(
        municipality,
        %sequence,
        prefix = %config.prefix,
        next = config.current_value,
        "Counter configured"
    );
    Ok(())
}

/// Read a counter without advancing it
pub fn peek(
    conn: &Connection,
    municipality: &str,
    sequence: Sequence,
) -> Result<Option<CounterConfig>, NumberingError> {
    let config = conn
        .query_row(
            "SELECT prefix, current_value, digit_width FROM numbering_counters
             WHERE municipality_id = ?1 AND sequence = ?2",
            params![municipality, sequence.to_string()],
            |row| {
                Ok(CounterConfig {
                    prefix: row.get(0)?,
                    current_value: row.get(1)?,
                    digit_width: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(config)
}

/// Take the current value and advance the counter by one, as one statement.
///
/// When several connections share the database, call this inside an
/// IMMEDIATE transaction so the write lock is taken before the read.
///
/// Returns [`NumberingError::Unavailable`] when the municipality has no
/// counter for `sequence`.
pub fn allocate(
    conn: &Connection,
    municipality: &str,
    sequence: Sequence,
) -> Result<IssuedNumber, NumberingError> {
    let allocated = conn
        .query_row(
            "UPDATE numbering_counters
             SET current_value = current_value + 1
             WHERE municipality_id = ?1 AND sequence = ?2
             RETURNING current_value - 1, prefix, digit_width",
            params![municipality, sequence.to_string()],
            |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            },
        )
        .optional()?;

    match allocated {
        Some((value, prefix, width)) => Ok(IssuedNumber {
            number: format_number(&prefix, value, width),
            source: NumberSource::Counter { value },
        }),
        None => Err(NumberingError::Unavailable {
            municipality: municipality.to_string(),
            sequence,
        }),
    }
}

/// Allocate, or degrade to `fallback()` when no counter is configured.
/// Database failures are still returned as errors.
pub fn issue(
    conn: &Connection,
    municipality: &str,
    sequence: Sequence,
    fallback: impl FnOnce() -> String,
) -> Result<IssuedNumber, NumberingError> {
    match allocate(conn, municipality, sequence) {
        Ok(issued) => Ok(issued),
        Err(NumberingError::Unavailable { .. }) => {
            let number = fallback();
            tracing::warn!(
                municipality,
                %sequence,
                %number,
                "No counter configured, issued fallback number"
            );
            Ok(IssuedNumber {
                number,
                source: NumberSource::Fallback,
            })
        }
        Err(e) => Err(e),
    }
}
