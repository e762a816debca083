//! Audit trail
//!
//! Every transition writes one row to `audit_log` inside its own transaction.
//! After commit the same event is handed to an [`AuditRecorder`].

use chrono::{DateTime, FixedOffset};
use ica_core::{DeclarationId, DeclarationStatus, RequestMeta, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Calculated,
    Signed,
    /// Recorded on the original when a correction is spawned
    Corrected,
    /// Recorded on the new correction draft
    CorrectionCreated,
    Voided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub declaration_id: DeclarationId,
    pub action: AuditAction,
    pub actor: UserId,
    pub from_status: Option<DeclarationStatus>,
    pub to_status: Option<DeclarationStatus>,
    pub details: serde_json::Value,
    pub request: RequestMeta,
    pub recorded_at: DateTime<FixedOffset>,
}

/// Sink for committed audit events
pub trait AuditRecorder: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Emits each event as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditRecorder;

impl AuditRecorder for TracingAuditRecorder {
    fn record(&self, event: &AuditEvent) {
        tracing::info!(
            target: "ica::audit",
            declaration_id = event.declaration_id,
            action = %event.action,
            actor = %event.actor,
            from = ?event.from_status,
            to = ?event.to_status,
            ip = event.request.ip_address.as_deref().unwrap_or("-"),
            details = %event.details,
            "Audit"
        );
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditRecorder {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn actions_for(&self, declaration_id: DeclarationId) -> Vec<AuditAction> {
        self.events()
            .into_iter()
            .filter(|e| e.declaration_id == declaration_id)
            .map(|e| e.action)
            .collect()
    }
}

impl AuditRecorder for MemoryAuditRecorder {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
