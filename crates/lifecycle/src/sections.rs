//! Per-section persistence
//!
//! Each child record is one row in `declaration_sections`, keyed by
//! declaration and section name, with its JSON body.

use crate::error::StoreError;
use ica_core::{DeclarationId, DeclarationSections};
use rusqlite::{params, Connection};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SectionKind {
    Taxpayer,
    IncomeBase,
    Activities,
    EnergyGeneration,
    Settlement,
    Payment,
    Discounts,
    Result,
}

fn encode(sections: &DeclarationSections, kind: SectionKind) -> Result<String, serde_json::Error> {
    match kind {
        SectionKind::Taxpayer => serde_json::to_string(&sections.taxpayer),
        SectionKind::IncomeBase => serde_json::to_string(&sections.income_base),
        SectionKind::Activities => serde_json::to_string(&sections.activities),
        SectionKind::EnergyGeneration => serde_json::to_string(&sections.energy_generation),
        SectionKind::Settlement => serde_json::to_string(&sections.settlement),
        SectionKind::Payment => serde_json::to_string(&sections.payment),
        SectionKind::Discounts => serde_json::to_string(&sections.discounts),
        SectionKind::Result => serde_json::to_string(&sections.result),
    }
}

fn decode(
    sections: &mut DeclarationSections,
    kind: SectionKind,
    body: &str,
) -> Result<(), serde_json::Error> {
    match kind {
        SectionKind::Taxpayer => sections.taxpayer = serde_json::from_str(body)?,
        SectionKind::IncomeBase => sections.income_base = serde_json::from_str(body)?,
        SectionKind::Activities => sections.activities = serde_json::from_str(body)?,
        SectionKind::EnergyGeneration => sections.energy_generation = serde_json::from_str(body)?,
        SectionKind::Settlement => sections.settlement = serde_json::from_str(body)?,
        SectionKind::Payment => sections.payment = serde_json::from_str(body)?,
        SectionKind::Discounts => sections.discounts = serde_json::from_str(body)?,
        SectionKind::Result => sections.result = serde_json::from_str(body)?,
    }
    Ok(())
}

pub(crate) fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS declaration_sections (
            declaration_id INTEGER NOT NULL REFERENCES declarations(id),
            section TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (declaration_id, section)
        )",
        [],
    )?;
    Ok(())
}

/// Write one section
pub(crate) fn save_section(
    conn: &Connection,
    id: DeclarationId,
    sections: &DeclarationSections,
    kind: SectionKind,
) -> Result<(), StoreError> {
    let body = encode(sections, kind)?;
    conn.execute(
        "INSERT INTO declaration_sections (declaration_id, section, body)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (declaration_id, section) DO UPDATE SET body = excluded.body",
        params![id, kind.to_string(), body],
    )?;
    Ok(())
}

/// Write every section
pub(crate) fn save_all(
    conn: &Connection,
    id: DeclarationId,
    sections: &DeclarationSections,
) -> Result<(), StoreError> {
    for kind in SectionKind::iter() {
        save_section(conn, id, sections, kind)?;
    }
    Ok(())
}

/// Write the sections named by `names` (as produced by `SectionsUpdate::touched`)
pub(crate) fn save_named(
    conn: &Connection,
    id: DeclarationId,
    sections: &DeclarationSections,
    names: &[&str],
) -> Result<(), StoreError> {
    for name in names {
        let kind = SectionKind::from_str(name)
            .map_err(|_| StoreError::Corrupt(format!("unknown section {name}")))?;
        save_section(conn, id, sections, kind)?;
    }
    Ok(())
}

/// Read every section. Missing rows keep their defaults.
pub(crate) fn load_all(
    conn: &Connection,
    id: DeclarationId,
) -> Result<DeclarationSections, StoreError> {
    let mut stmt =
        conn.prepare("SELECT section, body FROM declaration_sections WHERE declaration_id = ?1")?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut sections = DeclarationSections::default();
    for (name, body) in rows {
        let kind = SectionKind::from_str(&name)
            .map_err(|_| StoreError::Corrupt(format!("unknown section {name}")))?;
        decode(&mut sections, kind, &body)?;
    }
    Ok(sections)
}
