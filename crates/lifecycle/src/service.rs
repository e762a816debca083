//! Declaration lifecycle
//!
//! Draft -> Signed is irreversible. A signed initial declaration may spawn
//! exactly one correction, which starts as a new draft holding a copy of every
//! section. Drafts may be voided administratively.
//!
//! Every operation that changes state runs inside one IMMEDIATE transaction:
//! the guards are read under the same write lock the transition is written
//! under, so two concurrent requests can't both pass a guard.

use crate::audit::{AuditAction, AuditEvent, AuditRecorder, TracingAuditRecorder};
use crate::clock::{CivilClock, Clock};
use crate::error::{LifecycleError, LifecycleResult, StoreError};
use crate::sections::{self, SectionKind};
use crate::store::{self, DeclarationStore, NewDeclaration, SignedFields};
use chrono::{DateTime, Datelike, FixedOffset};
use rusqlite::Transaction;
use ica_core::validation::{validate_parameters, validate_signature, validate_tax_year};
use ica_core::{
    validate_sections, Declaration, DeclarationId, DeclarationResult, DeclarationSections,
    DeclarationStatus, DeclarationType, FormulaParameters, MunicipalityParameters,
    ParameterSource, RequestMeta, SectionsUpdate, SignatureData, SignatureInfo, ValidationError,
};
use ica_engine::CalculationInput;
use ica_integrity::{
    document_hash, verify_document_hash, verify_seal, IntegrityError, Sealer, SigningInputs,
};
use ica_numbering::{
    fallback_filing_number, fallback_form_number, CounterConfig, IssuedNumber, Sequence,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Returned by a successful signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningReceipt {
    pub declaration_id: DeclarationId,
    pub filing_number: String,
    /// The municipality had no filing counter; the number is not sequential
    pub fallback_number: bool,
    pub integrity_hash: String,
    pub sealed: bool,
    pub signed_at: DateTime<FixedOffset>,
}

/// Declaration lifecycle service
pub struct DeclarationService {
    store: DeclarationStore,
    parameters: Arc<dyn ParameterSource>,
    clock: Arc<dyn Clock>,
    sealer: Option<Arc<dyn Sealer>>,
    audit: Arc<dyn AuditRecorder>,
}

impl DeclarationService {
    /// Create a service on Bogota civil time, logging audit events through
    /// `tracing`, without a system seal
    pub fn new(store: DeclarationStore, parameters: Arc<dyn ParameterSource>) -> Self {
        Self {
            store,
            parameters,
            clock: Arc::new(CivilClock::bogota()),
            sealer: None,
            audit: Arc::new(TracingAuditRecorder),
        }
    }

    /// Service with default formula parameters for every municipality
    pub fn with_store(store: DeclarationStore) -> Self {
        let parameters = MunicipalityParameters {
            fallback: Some(FormulaParameters::default()),
            ..Default::default()
        };
        Self::new(store, Arc::new(parameters))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sealer(mut self, sealer: Arc<dyn Sealer>) -> Self {
        self.sealer = Some(sealer);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditRecorder>) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &DeclarationStore {
        &self.store
    }

    // === Queries ===

    pub fn get(&self, id: DeclarationId) -> LifecycleResult<Declaration> {
        self.store.get(id)
    }

    pub fn sections(&self, id: DeclarationId) -> LifecycleResult<DeclarationSections> {
        self.store.sections(id)
    }

    pub fn signature(&self, id: DeclarationId) -> LifecycleResult<Option<SignatureInfo>> {
        self.store.signature(id)
    }

    pub fn list_by_owner(&self, owner: &str) -> LifecycleResult<Vec<Declaration>> {
        self.store.list_by_owner(owner)
    }

    pub fn audit_trail(&self, id: DeclarationId) -> LifecycleResult<Vec<AuditEvent>> {
        self.store.audit_trail(id)
    }

    // === Transitions ===

    /// Create a draft with empty sections and a draft number
    pub fn create(
        &self,
        owner: &str,
        municipality: &str,
        tax_year: i32,
        request: &RequestMeta,
    ) -> LifecycleResult<Declaration> {
        let now = self.clock.now();
        validate_tax_year(tax_year, now.year())?;
        if owner.trim().is_empty() {
            return Err(ValidationError::Missing("owner_id").into());
        }
        if municipality.trim().is_empty() {
            return Err(ValidationError::Missing("municipality_id").into());
        }

        let (id, event) = self.store.transaction(|tx| {
            let form = ica_numbering::issue(tx, municipality, Sequence::Consecutivo, || {
                fallback_form_number(municipality, tax_year, now)
            })?;
            let id = store::insert_declaration(
                tx,
                &NewDeclaration {
                    tax_year,
                    declaration_type: DeclarationType::Initial,
                    owner_id: owner,
                    municipality_id: municipality,
                    form_number: &form.number,
                    correction_of: None,
                    created_at: now,
                },
            )?;
            sections::save_all(tx, id, &DeclarationSections::default())?;

            let event = self.event(
                id,
                AuditAction::Created,
                owner,
                (None, Some(DeclarationStatus::Draft)),
                number_details(&form),
                request,
                now,
            );
            store::insert_audit(tx, &event)?;
            Ok((id, event))
        })?;

        self.audit.record(&event);
        tracing::info!(declaration_id = id, municipality, tax_year, "Declaration created");
        self.get(id)
    }

    /// Replace the sections present in `update`. Drafts only, owner only.
    pub fn update(
        &self,
        id: DeclarationId,
        actor: &str,
        update: SectionsUpdate,
        request: &RequestMeta,
    ) -> LifecycleResult<DeclarationSections> {
        let now = self.clock.now();
        let (sections, event) = self.store.transaction(|tx| {
            let declaration = store::load_declaration(tx, id)?;
            ensure_owner(&declaration, actor)?;
            ensure_draft(&declaration)?;

            let mut sections = sections::load_all(tx, id)?;
            let touched = update.touched();
            update.apply_to(&mut sections);
            validate_sections(&sections)?;

            sections::save_named(tx, id, &sections, &touched)?;
            store::touch(tx, id, &now)?;

            let event = self.event(
                id,
                AuditAction::Updated,
                actor,
                (Some(declaration.status), Some(declaration.status)),
                json!({ "sections": touched }),
                request,
                now,
            );
            store::insert_audit(tx, &event)?;
            Ok((sections, event))
        })?;

        self.audit.record(&event);
        tracing::debug!(declaration_id = id, "Declaration updated");
        Ok(sections)
    }

    /// Run the engine and store the presented result. Owner only. A signed
    /// declaration returns the result frozen at signing.
    pub fn calculate(
        &self,
        id: DeclarationId,
        actor: &str,
        request: &RequestMeta,
    ) -> LifecycleResult<DeclarationResult> {
        let now = self.clock.now();
        let (result, event) = self.store.transaction(|tx| {
            let declaration = store::load_declaration(tx, id)?;
            ensure_owner(&declaration, actor)?;
            match declaration.status {
                DeclarationStatus::Draft => {}
                DeclarationStatus::Signed => return Ok((sections::load_all(tx, id)?.result, None)),
                status @ DeclarationStatus::Voided => {
                    return Err(LifecycleError::InvalidState { id, status })
                }
            }

            let mut sections = sections::load_all(tx, id)?;
            self.recalculate(tx, &declaration, &mut sections, now)?;
            store::touch(tx, id, &now)?;

            let event = self.event(
                id,
                AuditAction::Calculated,
                actor,
                (Some(declaration.status), Some(declaration.status)),
                result_details(&sections.result),
                request,
                now,
            );
            store::insert_audit(tx, &event)?;
            Ok((sections.result, Some(event)))
        })?;

        if let Some(event) = event {
            self.audit.record(&event);
        }
        Ok(result)
    }

    /// Seal a draft: document hash, filing number, signature record.
    ///
    /// Guards, in order: the actor must own the declaration, it must not be
    /// signed already, and it must still be a draft. The result is recomputed
    /// from the current sections under the same lock, so the signed totals
    /// always match the signed inputs.
    pub fn sign(
        &self,
        id: DeclarationId,
        actor: &str,
        data: SignatureData,
        request: &RequestMeta,
    ) -> LifecycleResult<SigningReceipt> {
        let signed_at = self.clock.now();
        let (receipt, event) = self.store.transaction(|tx| {
            let declaration = store::load_declaration(tx, id)?;
            ensure_owner(&declaration, actor)?;
            if declaration.is_signed || declaration.status == DeclarationStatus::Signed {
                return Err(LifecycleError::AlreadySigned(id));
            }
            ensure_draft(&declaration)?;
            validate_signature(&data)?;

            let mut sections = sections::load_all(tx, id)?;
            validate_sections(&sections)?;
            self.recalculate(tx, &declaration, &mut sections, signed_at)?;

            let integrity_hash = document_hash(&SigningInputs {
                declaration_id: id,
                form_number: &declaration.form_number,
                signer_id: actor,
                signed_at,
            });
            let seal = self.sealer.as_ref().map(|s| s.seal(&integrity_hash));

            let filing = ica_numbering::issue(
                tx,
                &declaration.municipality_id,
                Sequence::Radicado,
                || fallback_filing_number(id, signed_at),
            )?;

            let fields = SignedFields {
                filing_number: &filing.number,
                signed_at,
                signed_by: actor,
                integrity_hash: &integrity_hash,
            };
            if !store::mark_signed(tx, id, &fields)? {
                return Err(LifecycleError::AlreadySigned(id));
            }

            store::save_signature(
                tx,
                &SignatureInfo {
                    declaration_id: id,
                    signer_id: actor.to_string(),
                    data,
                    document_hash: integrity_hash.clone(),
                    seal: seal.clone(),
                    signed_at,
                    request: request.clone(),
                },
            )?;

            let mut details = number_details(&filing);
            details["result"] = result_details(&sections.result);
            details["integrity_hash"] = json!(integrity_hash);
            details["sealed"] = json!(seal.is_some());
            let event = self.event(
                id,
                AuditAction::Signed,
                actor,
                (Some(DeclarationStatus::Draft), Some(DeclarationStatus::Signed)),
                details,
                request,
                signed_at,
            );
            store::insert_audit(tx, &event)?;

            let receipt = SigningReceipt {
                declaration_id: id,
                fallback_number: filing.is_fallback(),
                filing_number: filing.number,
                integrity_hash,
                sealed: seal.is_some(),
                signed_at,
            };
            Ok((receipt, event))
        })?;

        self.audit.record(&event);
        tracing::info!(
            declaration_id = id,
            filing_number = %receipt.filing_number,
            hash = %receipt.integrity_hash,
            "Declaration signed"
        );
        Ok(receipt)
    }

    /// Spawn the single correction of a signed initial declaration.
    ///
    /// Guards, in order: owner only, not itself a correction, signed, not
    /// corrected before.
    pub fn correct(
        &self,
        id: DeclarationId,
        actor: &str,
        request: &RequestMeta,
    ) -> LifecycleResult<DeclarationId> {
        let now = self.clock.now();
        let (correction_id, events) = self.store.transaction(|tx| {
            let original = store::load_declaration(tx, id)?;
            ensure_owner(&original, actor)?;
            if original.is_correction() {
                return Err(LifecycleError::CannotCorrectACorrection(id));
            }
            if original.status != DeclarationStatus::Signed {
                return Err(LifecycleError::NotSigned(id));
            }
            if original.has_been_corrected {
                return Err(LifecycleError::AlreadyCorrected(id));
            }

            let copy = sections::load_all(tx, id)?;
            let form = ica_numbering::issue(
                tx,
                &original.municipality_id,
                Sequence::Consecutivo,
                || fallback_form_number(&original.municipality_id, original.tax_year, now),
            )?;
            let correction_id = store::insert_declaration(
                tx,
                &NewDeclaration {
                    tax_year: original.tax_year,
                    declaration_type: DeclarationType::Correction,
                    owner_id: &original.owner_id,
                    municipality_id: &original.municipality_id,
                    form_number: &form.number,
                    correction_of: Some(id),
                    created_at: now,
                },
            )?;
            sections::save_all(tx, correction_id, &copy)?;

            if !store::mark_corrected(tx, id, &now)? {
                return Err(LifecycleError::AlreadyCorrected(id));
            }

            let mut created = number_details(&form);
            created["correction_of"] = json!(id);
            let events = [
                self.event(
                    id,
                    AuditAction::Corrected,
                    actor,
                    (Some(original.status), Some(original.status)),
                    json!({ "correction_id": correction_id }),
                    request,
                    now,
                ),
                self.event(
                    correction_id,
                    AuditAction::CorrectionCreated,
                    actor,
                    (None, Some(DeclarationStatus::Draft)),
                    created,
                    request,
                    now,
                ),
            ];
            for event in &events {
                store::insert_audit(tx, event)?;
            }
            Ok((correction_id, events))
        })?;

        for event in &events {
            self.audit.record(event);
        }
        tracing::info!(declaration_id = id, correction_id, "Correction created");
        Ok(correction_id)
    }

    /// Annul a draft. Administrative: any actor, reason required.
    pub fn void(
        &self,
        id: DeclarationId,
        actor: &str,
        reason: &str,
        request: &RequestMeta,
    ) -> LifecycleResult<Declaration> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::Missing("void_reason").into());
        }
        let now = self.clock.now();
        let event = self.store.transaction(|tx| {
            let declaration = store::load_declaration(tx, id)?;
            ensure_draft(&declaration)?;
            if !store::mark_voided(tx, id, reason, &now)? {
                return Err(LifecycleError::InvalidState {
                    id,
                    status: declaration.status,
                });
            }
            let event = self.event(
                id,
                AuditAction::Voided,
                actor,
                (Some(DeclarationStatus::Draft), Some(DeclarationStatus::Voided)),
                json!({ "reason": reason }),
                request,
                now,
            );
            store::insert_audit(tx, &event)?;
            Ok(event)
        })?;

        self.audit.record(&event);
        tracing::warn!(declaration_id = id, actor, reason, "Declaration voided");
        self.get(id)
    }

    /// Recompute the document hash from the stored signing inputs and check
    /// it, and the seal if there is one, against what was stored at signing.
    pub fn verify(&self, id: DeclarationId) -> LifecycleResult<SignatureInfo> {
        let (declaration, signature) = self.store.read(|conn| {
            Ok((
                store::load_declaration(conn, id)?,
                store::load_signature(conn, id)?,
            ))
        })?;
        if !declaration.is_signed {
            return Err(LifecycleError::NotSigned(id));
        }

        let (Some(stored), Some(signer_id), Some(signed_at), Some(info)) = (
            declaration.integrity_hash.as_deref(),
            declaration.signed_by.as_deref(),
            declaration.signed_at,
            signature,
        ) else {
            return Err(StoreError::Corrupt(format!(
                "declaration {id} is signed but its signing record is incomplete"
            ))
            .into());
        };

        let inputs = SigningInputs {
            declaration_id: id,
            form_number: &declaration.form_number,
            signer_id,
            signed_at,
        };
        let checked = verify_document_hash(&inputs, stored)
            .and_then(|()| {
                if info.document_hash == stored {
                    Ok(())
                } else {
                    Err(IntegrityError::HashMismatch {
                        stored: info.document_hash.clone(),
                        recomputed: stored.to_string(),
                    })
                }
            })
            .and_then(|()| match &info.seal {
                Some(seal) => verify_seal(seal, stored),
                None => Ok(()),
            });

        if let Err(e) = checked {
            tracing::error!(declaration_id = id, error = %e, "Integrity check failed");
            return Err(e.into());
        }
        if info.seal.is_none() && self.sealer.is_some() {
            tracing::warn!(declaration_id = id, "Signed before a system key was configured");
        }
        tracing::debug!(declaration_id = id, "Integrity verified");
        Ok(info)
    }

    // === Counters ===

    pub fn configure_counter(
        &self,
        municipality: &str,
        sequence: Sequence,
        config: &CounterConfig,
    ) -> LifecycleResult<()> {
        self.store
            .transaction(|tx| Ok(ica_numbering::configure(tx, municipality, sequence, config)?))
    }

    pub fn peek_counter(
        &self,
        municipality: &str,
        sequence: Sequence,
    ) -> LifecycleResult<Option<CounterConfig>> {
        self.store
            .read(|conn| Ok(ica_numbering::peek(conn, municipality, sequence)?))
    }

    // === Helpers ===

    /// Run the engine over `sections` and persist the result row
    fn recalculate(
        &self,
        tx: &Transaction<'_>,
        declaration: &Declaration,
        sections: &mut DeclarationSections,
        now: DateTime<FixedOffset>,
    ) -> LifecycleResult<()> {
        let parameters = self.parameters_for(&declaration.municipality_id)?;
        let calculation = ica_engine::calculate(CalculationInput {
            tax_year: declaration.tax_year,
            sections: &*sections,
            parameters: &parameters,
        });
        sections.result = calculation.to_record(now);
        sections::save_section(tx, declaration.id, sections, SectionKind::Result)?;
        Ok(())
    }

    fn parameters_for(&self, municipality: &str) -> LifecycleResult<FormulaParameters> {
        let parameters = match self.parameters.parameters(municipality) {
            Some(parameters) => parameters,
            None => {
                tracing::warn!(municipality, "No formula parameters configured, using defaults");
                FormulaParameters::default()
            }
        };
        validate_parameters(&parameters)?;
        Ok(parameters)
    }

    #[allow(clippy::too_many_arguments)]
    fn event(
        &self,
        declaration_id: DeclarationId,
        action: AuditAction,
        actor: &str,
        (from_status, to_status): (Option<DeclarationStatus>, Option<DeclarationStatus>),
        details: serde_json::Value,
        request: &RequestMeta,
        recorded_at: DateTime<FixedOffset>,
    ) -> AuditEvent {
        AuditEvent {
            declaration_id,
            action,
            actor: actor.to_string(),
            from_status,
            to_status,
            details,
            request: request.clone(),
            recorded_at,
        }
    }
}

fn ensure_owner(declaration: &Declaration, actor: &str) -> LifecycleResult<()> {
    if declaration.is_owned_by(actor) {
        Ok(())
    } else {
        Err(LifecycleError::Forbidden {
            id: declaration.id,
            actor: actor.to_string(),
        })
    }
}

fn ensure_draft(declaration: &Declaration) -> LifecycleResult<()> {
    if declaration.is_draft() {
        Ok(())
    } else {
        Err(LifecycleError::InvalidState {
            id: declaration.id,
            status: declaration.status,
        })
    }
}

fn result_details(result: &DeclarationResult) -> serde_json::Value {
    json!({
        "total_tax_payable": result.total_tax_payable.to_string(),
        "amount_due": result.amount_due.to_string(),
        "balance_in_favor": result.balance_in_favor.to_string(),
    })
}

fn number_details(issued: &IssuedNumber) -> serde_json::Value {
    json!({
        "number": issued.number,
        "fallback": issued.is_fallback(),
    })
}
