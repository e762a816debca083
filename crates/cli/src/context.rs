//! Application context - wires config, store and service together

use crate::config::AppConfig;
use anyhow::{anyhow, Context};
use ica_core::{FormulaParameters, MunicipalityParameters};
use ica_integrity::{Sealer, SystemSealer};
use ica_lifecycle::{CivilClock, DeclarationService, DeclarationStore};
use std::sync::Arc;

pub struct AppContext {
    pub config: AppConfig,
    pub service: DeclarationService,
}

/// Open the configured database, creating its directory and schema
pub fn open_store(config: &AppConfig) -> anyhow::Result<DeclarationStore> {
    if let Some(parent) = config.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    DeclarationStore::new(&config.database)
        .with_context(|| format!("opening {}", config.database.display()))
}

impl AppContext {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = open_store(&config)?;

        let parameters = match &config.parameters_file {
            Some(path) => MunicipalityParameters::from_file(path)
                .with_context(|| format!("reading parameters from {}", path.display()))?,
            None => MunicipalityParameters {
                fallback: Some(FormulaParameters::default()),
                ..Default::default()
            },
        };

        let clock = CivilClock::from_hours(config.utc_offset_hours)
            .ok_or_else(|| anyhow!("UTC offset out of range: {}", config.utc_offset_hours))?;

        let mut service = DeclarationService::new(store, Arc::new(parameters))
            .with_clock(Arc::new(clock));

        if let Some(key) = &config.system_key {
            let sealer = SystemSealer::from_hex(key).context("loading system key")?;
            tracing::info!(public_key = %sealer.public_key_hex(), "System seal enabled");
            service = service.with_sealer(Arc::new(sealer));
        }

        Ok(Self { config, service })
    }
}
