//! ICA Lifecycle - Declaration state machine over SQLite
//!
//! - `DeclarationService`: create, update, calculate, sign, correct, void, verify
//! - `DeclarationStore`: declarations, sections, signatures and audit log
//! - `Clock`: civil time at the municipality's UTC offset
//! - `AuditRecorder`: sink for committed audit events

pub mod audit;
pub mod clock;
pub mod error;
mod sections;
pub mod service;
pub mod store;

pub use audit::{AuditAction, AuditEvent, AuditRecorder, MemoryAuditRecorder, TracingAuditRecorder};
pub use clock::{CivilClock, Clock, FixedClock, BOGOTA_OFFSET_HOURS};
pub use error::{LifecycleError, LifecycleResult, StoreError};
pub use service::{DeclarationService, SigningReceipt};
pub use store::DeclarationStore;
