//! CLI command handlers

use crate::config::AppConfig;
use crate::context::{open_store, AppContext};
use anyhow::Context;
use ica_core::{DeclarationId, RequestMeta, SectionsUpdate, SignatureData};
use ica_integrity::{Sealer, SystemSealer};
use ica_numbering::{CounterConfig, Sequence};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Create the database and its schema
pub fn init(config: &AppConfig) -> anyhow::Result<()> {
    open_store(config)?;
    tracing::info!(database = %config.database.display(), "Schema initialised");
    println!("✅ Database ready at {}", config.database.display());
    Ok(())
}

pub fn create(
    ctx: &AppContext,
    owner: &str,
    municipality: &str,
    tax_year: i32,
    request: &RequestMeta,
) -> anyhow::Result<()> {
    let declaration = ctx.service.create(owner, municipality, tax_year, request)?;
    println!(
        "✅ Created declaration {} (form {})",
        declaration.id, declaration.form_number
    );
    Ok(())
}

pub fn update(
    ctx: &AppContext,
    id: DeclarationId,
    actor: &str,
    file: &Path,
    request: &RequestMeta,
) -> anyhow::Result<()> {
    let update: SectionsUpdate = read_json(file)?;
    if update.is_empty() {
        println!("Nothing to update");
        return Ok(());
    }
    let touched = update.touched().join(", ");
    ctx.service.update(id, actor, update, request)?;
    println!("✅ Updated {touched} on declaration {id}");
    Ok(())
}

pub fn calculate(
    ctx: &AppContext,
    id: DeclarationId,
    actor: &str,
    request: &RequestMeta,
) -> anyhow::Result<()> {
    let result = ctx.service.calculate(id, actor, request)?;
    print_json(&result)
}

pub fn sign(
    ctx: &AppContext,
    id: DeclarationId,
    actor: &str,
    file: &Path,
    request: &RequestMeta,
) -> anyhow::Result<()> {
    let data: SignatureData = read_json(file)?;
    let receipt = ctx.service.sign(id, actor, data, request)?;
    println!("✅ Signed declaration {id}");
    println!("   Filing number: {}", receipt.filing_number);
    if receipt.fallback_number {
        println!("   (no filing counter configured for this municipality)");
    }
    println!("   Document hash: {}", receipt.integrity_hash);
    println!("   Sealed: {}", receipt.sealed);
    Ok(())
}

pub fn correct(
    ctx: &AppContext,
    id: DeclarationId,
    actor: &str,
    request: &RequestMeta,
) -> anyhow::Result<()> {
    let correction = ctx.service.correct(id, actor, request)?;
    println!("✅ Created correction {correction} of declaration {id}");
    Ok(())
}

pub fn void(
    ctx: &AppContext,
    id: DeclarationId,
    actor: &str,
    reason: &str,
    request: &RequestMeta,
) -> anyhow::Result<()> {
    ctx.service.void(id, actor, reason, request)?;
    println!("✅ Voided declaration {id}");
    Ok(())
}

pub fn verify(ctx: &AppContext, id: DeclarationId) -> anyhow::Result<()> {
    match ctx.service.verify(id) {
        Ok(info) => {
            println!("✅ Declaration {id} verified");
            println!("   Document hash: {}", info.document_hash);
            match info.seal {
                Some(seal) => println!("   Sealed by: {}", seal.public_key),
                None => println!("   No system seal"),
            }
            Ok(())
        }
        Err(e) => {
            println!("❌ Declaration {id} failed verification: {e}");
            Err(e.into())
        }
    }
}

pub fn show(ctx: &AppContext, id: DeclarationId, with_sections: bool) -> anyhow::Result<()> {
    let declaration = ctx.service.get(id)?;
    if with_sections {
        let sections = ctx.service.sections(id)?;
        print_json(&serde_json::json!({
            "declaration": declaration,
            "sections": sections,
        }))
    } else {
        print_json(&declaration)
    }
}

pub fn list(ctx: &AppContext, owner: &str) -> anyhow::Result<()> {
    let declarations = ctx.service.list_by_owner(owner)?;
    if declarations.is_empty() {
        println!("No declarations for {owner}");
    }
    for d in declarations {
        println!(
            "{:>6}  {}  {:<10} {:<8} {}  {}",
            d.id,
            d.tax_year,
            d.declaration_type,
            d.status,
            d.form_number,
            d.filing_number.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub fn counter_set(
    ctx: &AppContext,
    municipality: &str,
    sequence: Sequence,
    prefix: &str,
    start: u64,
    width: Option<u32>,
) -> anyhow::Result<()> {
    let config = CounterConfig::new(prefix)
        .starting_at(start)
        .with_width(width.unwrap_or(ctx.config.default_digit_width));
    ctx.service.configure_counter(municipality, sequence, &config)?;
    println!("✅ Counter {sequence} for {municipality} set");
    Ok(())
}

pub fn counter_show(
    ctx: &AppContext,
    municipality: &str,
    sequence: Sequence,
) -> anyhow::Result<()> {
    match ctx.service.peek_counter(municipality, sequence)? {
        Some(counter) => print_json(&counter),
        None => {
            println!("No {sequence} counter for {municipality}; fallback numbers will be issued");
            Ok(())
        }
    }
}

/// Generate a system seal key
pub fn keygen(output: &Path) -> anyhow::Result<()> {
    let sealer = SystemSealer::generate();
    let seed = sealer.seed_hex();

    std::fs::write(output, &seed)?;
    println!("✅ Generated system key");
    println!("   Private key saved to: {}", output.display());
    println!("   Public key: {}", sealer.public_key_hex());
    println!();
    println!("To use: export {}={}", crate::config::ENV_SYSTEM_KEY, seed);
    Ok(())
}
