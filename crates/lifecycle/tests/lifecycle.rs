//! Integration tests for the declaration lifecycle

use chrono::{FixedOffset, NaiveDate, TimeZone};
use ica_core::{
    Amount, DeclarationId, DeclarationStatus, DeclarationType, DiscountsCredits,
    EnergyGeneration, FormulaParameters, IncomeBase, MunicipalityParameters, PaymentSection,
    PerMille, Percent, RequestMeta, SectionsUpdate, SignatureData, SignatureMethod,
    TaxableActivity, Taxpayer, ValidationError,
};
use ica_engine::CalculationInput;
use ica_integrity::{IntegrityError, SystemSealer};
use ica_lifecycle::{
    AuditAction, DeclarationService, DeclarationStore, FixedClock, LifecycleError,
    MemoryAuditRecorder,
};
use ica_numbering::{CounterConfig, Sequence};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

const OWNER: &str = "user-1";
const MEDELLIN: &str = "05001";

fn clock() -> Arc<FixedClock> {
    let at = FixedOffset::west_opt(5 * 3600)
        .unwrap()
        .with_ymd_and_hms(2025, 4, 2, 16, 45, 30)
        .unwrap();
    Arc::new(FixedClock::new(at))
}

fn memory_service() -> DeclarationService {
    DeclarationService::with_store(DeclarationStore::in_memory().unwrap()).with_clock(clock())
}

fn file_service(path: &Path) -> DeclarationService {
    DeclarationService::with_store(DeclarationStore::new(path).unwrap()).with_clock(clock())
}

fn radicado_counter(service: &DeclarationService) {
    let config = CounterConfig::new("RAD-").with_width(6);
    service
        .configure_counter(MEDELLIN, Sequence::Radicado, &config)
        .unwrap();
}

/// Service whose only municipality uses `params`
fn service_with(params: FormulaParameters) -> DeclarationService {
    let mut table = MunicipalityParameters::default();
    table.insert(MEDELLIN, params);
    DeclarationService::new(DeclarationStore::in_memory().unwrap(), Arc::new(table))
        .with_clock(clock())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn meta() -> RequestMeta {
    RequestMeta {
        ip_address: Some("190.0.0.1".to_string()),
        user_agent: Some("integration".to_string()),
    }
}

fn signature() -> SignatureData {
    SignatureData {
        declarant_name: "Ana Gomez".to_string(),
        declarant_document: "43000111".to_string(),
        declarant_signature_method: SignatureMethod::Uploaded,
        declarant_signature: "signatures/ana.png".to_string(),
        declarant_oath_accepted: true,
        declaration_date: None,
        requires_fiscal_reviewer: false,
        accountant_name: None,
        accountant_document: None,
        accountant_professional_card: None,
        accountant_signature_method: None,
        accountant_signature: None,
    }
}

fn amount(value: rust_decimal::Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// Example A inputs: gross 10M, 1M outside, 2M deductions, 7M at 4.14 per mille
fn example_update() -> SectionsUpdate {
    SectionsUpdate {
        taxpayer: Some(Taxpayer {
            document_type: "NIT".to_string(),
            document_number: "800197268".to_string(),
            verification_digit: Some("4".to_string()),
            legal_name: "Comercializadora Andina SAS".to_string(),
            city: Some("Medellin".to_string()),
            ..Default::default()
        }),
        income_base: Some(IncomeBase {
            gross_income_country: amount(dec!(10_000_000)),
            income_outside_municipality: amount(dec!(1_000_000)),
            returns_rebates: amount(dec!(500_000)),
            exports_and_fixed_asset_sales: amount(dec!(500_000)),
            excluded_or_non_taxable: amount(dec!(500_000)),
            exempt_income: amount(dec!(500_000)),
        }),
        activities: Some(vec![TaxableActivity {
            activity_code: "4711".to_string(),
            description: Some("Retail".to_string()),
            income: amount(dec!(7_000_000)),
            standard_rate: PerMille::new(dec!(4.14)),
            special_rate: None,
        }]),
        ..Default::default()
    }
}

fn signed_declaration(service: &DeclarationService) -> DeclarationId {
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    service.update(id, OWNER, example_update(), &meta()).unwrap();
    service.calculate(id, OWNER, &meta()).unwrap();
    service.sign(id, OWNER, signature(), &meta()).unwrap();
    id
}

#[test]
fn test_full_flow_example_amount_due() {
    let service = memory_service();
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    service.update(id, OWNER, example_update(), &meta()).unwrap();

    let result = service.calculate(id, OWNER, &meta()).unwrap();
    assert_eq!(result.total_income_in_municipality, dec!(9_000_000));
    assert_eq!(result.taxable_income, dec!(7_000_000));
    assert_eq!(result.total_activities_tax, dec!(28_980));
    assert_eq!(result.signs_boards_tax, dec!(4_347));
    assert_eq!(result.amount_due, dec!(33_327));
    assert_eq!(result.balance_in_favor, dec!(0));
}

#[test]
fn test_full_flow_example_balance_in_favor() {
    let service = memory_service();
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    let mut update = example_update();
    update.discounts = Some(DiscountsCredits {
        previous_balance_in_favor: amount(dec!(40_000)),
        ..Default::default()
    });
    service.update(id, OWNER, update, &meta()).unwrap();

    let result = service.calculate(id, OWNER, &meta()).unwrap();
    assert_eq!(result.amount_due, dec!(0));
    assert_eq!(result.balance_in_favor, dec!(6_673));
}

#[test]
fn test_filing_number_from_counter() {
    let service = memory_service();
    radicado_counter(&service);

    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    let receipt = service.sign(id, OWNER, signature(), &meta()).unwrap();

    assert_eq!(receipt.filing_number, "RAD-000001");
    assert!(!receipt.fallback_number);
    let counter = service.peek_counter(MEDELLIN, Sequence::Radicado).unwrap().unwrap();
    assert_eq!(counter.current_value, 2);
    assert_eq!(
        service.get(id).unwrap().filing_number.as_deref(),
        Some("RAD-000001")
    );
}

#[test]
fn test_sign_twice_is_rejected() {
    let service = memory_service();
    radicado_counter(&service);
    let id = signed_declaration(&service);
    let before = service.get(id).unwrap();

    let result = service.sign(id, OWNER, signature(), &meta());
    assert!(matches!(result, Err(LifecycleError::AlreadySigned(d)) if d == id));

    let after = service.get(id).unwrap();
    assert_eq!(after.filing_number, before.filing_number);
    assert_eq!(after.integrity_hash, before.integrity_hash);
    // The failed attempt consumed no filing number
    let counter = service.peek_counter(MEDELLIN, Sequence::Radicado).unwrap().unwrap();
    assert_eq!(counter.current_value, 2);
}

#[test]
fn test_sign_requires_owner() {
    let service = memory_service();
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;

    let result = service.sign(id, "intruder", signature(), &meta());
    assert!(matches!(result, Err(LifecycleError::Forbidden { .. })));
    assert!(!service.get(id).unwrap().is_signed);

    // Ownership is checked before signing state
    service.sign(id, OWNER, signature(), &meta()).unwrap();
    let result = service.sign(id, "intruder", signature(), &meta());
    assert!(matches!(result, Err(LifecycleError::Forbidden { .. })));
}

#[test]
fn test_sign_requires_oath() {
    let service = memory_service();
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    let mut data = signature();
    data.declarant_oath_accepted = false;

    assert!(matches!(
        service.sign(id, OWNER, data, &meta()),
        Err(LifecycleError::Validation(_))
    ));
    assert!(service.signature(id).unwrap().is_none());
}

#[test]
fn test_update_rules() {
    let service = memory_service();
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;

    let result = service.update(id, "intruder", example_update(), &meta());
    assert!(matches!(result, Err(LifecycleError::Forbidden { .. })));

    service.sign(id, OWNER, signature(), &meta()).unwrap();
    let result = service.update(id, OWNER, example_update(), &meta());
    assert!(matches!(
        result,
        Err(LifecycleError::InvalidState { status: DeclarationStatus::Signed, .. })
    ));
}

#[test]
fn test_correction_copies_every_section() {
    let service = memory_service();
    let original_id = signed_declaration(&service);
    let original_sections = service.sections(original_id).unwrap();

    let correction_id = service.correct(original_id, OWNER, &meta()).unwrap();

    let original = service.get(original_id).unwrap();
    let correction = service.get(correction_id).unwrap();
    assert!(original.has_been_corrected);
    assert_eq!(original.status, DeclarationStatus::Signed);

    assert_eq!(correction.declaration_type, DeclarationType::Correction);
    assert_eq!(correction.correction_of, Some(original_id));
    assert_eq!(correction.status, DeclarationStatus::Draft);
    assert!(!correction.is_signed);
    assert!(correction.filing_number.is_none());
    assert_ne!(correction.form_number, original.form_number);
    assert_eq!(correction.tax_year, original.tax_year);

    assert_eq!(service.sections(correction_id).unwrap(), original_sections);

    // Editing the copy leaves the original untouched
    let update = SectionsUpdate {
        discounts: Some(DiscountsCredits {
            penalties: amount(dec!(1_000)),
            ..Default::default()
        }),
        ..Default::default()
    };
    service.update(correction_id, OWNER, update, &meta()).unwrap();
    assert_eq!(service.sections(original_id).unwrap(), original_sections);
}

#[test]
fn test_correction_guards() {
    let service = memory_service();

    let draft = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    assert!(matches!(
        service.correct(draft, OWNER, &meta()),
        Err(LifecycleError::NotSigned(_))
    ));

    let original = signed_declaration(&service);
    let correction = service.correct(original, OWNER, &meta()).unwrap();

    assert!(matches!(
        service.correct(original, OWNER, &meta()),
        Err(LifecycleError::AlreadyCorrected(_))
    ));

    // A correction is refused before its signing state is even looked at
    assert!(matches!(
        service.correct(correction, OWNER, &meta()),
        Err(LifecycleError::CannotCorrectACorrection(_))
    ));
    service.sign(correction, OWNER, signature(), &meta()).unwrap();
    assert!(matches!(
        service.correct(correction, OWNER, &meta()),
        Err(LifecycleError::CannotCorrectACorrection(_))
    ));

    assert!(matches!(
        service.correct(original, "intruder", &meta()),
        Err(LifecycleError::Forbidden { .. })
    ));
}

#[test]
fn test_correction_gets_its_own_filing_number() {
    let service = memory_service();
    radicado_counter(&service);
    let original = signed_declaration(&service);
    let correction = service.correct(original, OWNER, &meta()).unwrap();
    let receipt = service.sign(correction, OWNER, signature(), &meta()).unwrap();

    assert_eq!(service.get(original).unwrap().filing_number.as_deref(), Some("RAD-000001"));
    assert_eq!(receipt.filing_number, "RAD-000002");
}

#[test]
fn test_audit_trail_records_each_transition() {
    let audit = Arc::new(MemoryAuditRecorder::new());
    let service = memory_service().with_audit(audit.clone());
    let original = signed_declaration(&service);
    let correction = service.correct(original, OWNER, &meta()).unwrap();

    assert_eq!(
        audit.actions_for(original),
        vec![
            AuditAction::Created,
            AuditAction::Updated,
            AuditAction::Calculated,
            AuditAction::Signed,
            AuditAction::Corrected,
        ]
    );
    assert_eq!(audit.actions_for(correction), vec![AuditAction::CorrectionCreated]);

    let stored = service.audit_trail(original).unwrap();
    let signed = stored.iter().find(|e| e.action == AuditAction::Signed).unwrap();
    assert_eq!(signed.from_status, Some(DeclarationStatus::Draft));
    assert_eq!(signed.to_status, Some(DeclarationStatus::Signed));
    assert_eq!(signed.request, meta());
}

#[test]
fn test_list_by_owner() {
    let service = memory_service();
    let first = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    let second = service.create(OWNER, "11001", 2023, &meta()).unwrap().id;
    service.create("someone-else", MEDELLIN, 2024, &meta()).unwrap();

    let ids: Vec<_> = service.list_by_owner(OWNER).unwrap().iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![second, first]);
}

#[test]
fn test_concurrent_signing_issues_unique_filing_numbers() {
    let service = Arc::new(memory_service());
    radicado_counter(&service);
    let ids: Vec<_> = (0..8)
        .map(|_| service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id)
        .collect();

    let barrier = Arc::new(Barrier::new(ids.len()));
    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.sign(id, OWNER, signature(), &meta()).unwrap().filing_number
            })
        })
        .collect();

    let numbers: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let expected: HashSet<_> = (1..=8).map(|n| format!("RAD-{n:06}")).collect();
    assert_eq!(numbers, expected);
}

#[test]
fn test_racing_signers_on_shared_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ica.db");
    let setup = file_service(&path);
    radicado_counter(&setup);
    let id = setup.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;

    // Two independent connections, as two processes would have
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let service = file_service(&path);
                barrier.wait();
                service.sign(id, OWNER, signature(), &meta())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let signed = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(LifecycleError::AlreadySigned(_))))
        .count();
    assert_eq!((signed, rejected), (1, 1));

    let counter = setup.peek_counter(MEDELLIN, Sequence::Radicado).unwrap().unwrap();
    assert_eq!(counter.current_value, 2);
}

#[test]
fn test_verify_detects_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ica.db");
    let service = file_service(&path);
    let id = signed_declaration(&service);
    assert!(service.verify(id).is_ok());

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE declarations SET signed_by = 'someone-else' WHERE id = ?1",
        [id],
    )
    .unwrap();

    assert!(matches!(
        service.verify(id),
        Err(LifecycleError::IntegrityFailure(IntegrityError::HashMismatch { .. }))
    ));
}

#[test]
fn test_verify_detects_replaced_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ica.db");
    let service = file_service(&path);
    let id = signed_declaration(&service);

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE signature_info SET document_hash = ?1 WHERE declaration_id = ?2",
        rusqlite::params!["0".repeat(64), id],
    )
    .unwrap();

    assert!(matches!(
        service.verify(id),
        Err(LifecycleError::IntegrityFailure(_))
    ));
}

#[test]
fn test_system_seal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ica.db");
    let sealer = Arc::new(SystemSealer::generate());
    let service = file_service(&path).with_sealer(sealer);

    let id = signed_declaration(&service);
    let info = service.verify(id).unwrap();
    assert!(info.seal.is_some());

    // Replace the seal with one made by another key over a different hash
    let forged = SystemSealer::generate();
    let seal = ica_integrity::Sealer::seal(&forged, &"f".repeat(64));
    let mut tampered = info.seal.unwrap();
    tampered.signature = seal.signature;

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE signature_info SET seal_json = ?1 WHERE declaration_id = ?2",
        rusqlite::params![serde_json::to_string(&tampered).unwrap(), id],
    )
    .unwrap();

    assert!(matches!(
        service.verify(id),
        Err(LifecycleError::IntegrityFailure(IntegrityError::SealVerificationFailed(_)))
    ));
}

#[test]
fn test_sign_recomputes_after_late_edit() {
    let service = memory_service();
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    service.update(id, OWNER, example_update(), &meta()).unwrap();
    let stale = service.calculate(id, OWNER, &meta()).unwrap();
    assert_eq!(stale.amount_due, dec!(33_327));

    // Ten times the income after the last explicit calculation
    let update = SectionsUpdate {
        income_base: Some(IncomeBase {
            gross_income_country: amount(dec!(70_000_000)),
            ..Default::default()
        }),
        activities: Some(vec![TaxableActivity {
            activity_code: "4711".to_string(),
            description: None,
            income: amount(dec!(70_000_000)),
            standard_rate: PerMille::new(dec!(4.14)),
            special_rate: None,
        }]),
        ..Default::default()
    };
    service.update(id, OWNER, update, &meta()).unwrap();
    service.sign(id, OWNER, signature(), &meta()).unwrap();

    let signed = service.sections(id).unwrap();
    assert_eq!(signed.result.amount_due, dec!(333_270));

    let declaration = service.get(id).unwrap();
    let recomputed = ica_engine::calculate(CalculationInput {
        tax_year: declaration.tax_year,
        sections: &signed,
        parameters: &FormulaParameters::default(),
    })
    .to_record(declaration.signed_at.unwrap());
    assert_eq!(signed.result, recomputed);

    // The signed result is frozen from here on
    assert_eq!(service.calculate(id, OWNER, &meta()).unwrap(), signed.result);
}

#[test]
fn test_sign_without_calculating_first() {
    let service = memory_service();
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    service.update(id, OWNER, example_update(), &meta()).unwrap();
    service.sign(id, OWNER, signature(), &meta()).unwrap();

    let result = service.sections(id).unwrap().result;
    assert_eq!(result.amount_due, dec!(33_327));
    assert_eq!(result.calculated_at, service.get(id).unwrap().signed_at);
}

fn payment_params() -> FormulaParameters {
    FormulaParameters {
        early_payment_discount_pct: Percent::new(dec!(10)),
        early_payment_days: 90,
        late_interest_monthly_pct: Percent::new(dec!(2)),
        filing_deadline: Some(date(2025, 3, 31)),
        ..Default::default()
    }
}

#[test]
fn test_late_interest_and_credits_in_signed_result() {
    let service = service_with(payment_params());
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    let mut update = example_update();
    update.discounts = Some(DiscountsCredits {
        self_withholdings: amount(dec!(5_000)),
        penalties: amount(dec!(1_000)),
        ..Default::default()
    });
    // Ten days past the deadline: one started month
    update.payment = Some(PaymentSection {
        payment_date: Some(date(2025, 4, 10)),
        voluntary_contribution: Amount::ZERO,
    });
    service.update(id, OWNER, update, &meta()).unwrap();
    service.sign(id, OWNER, signature(), &meta()).unwrap();

    let result = service.sections(id).unwrap().result;
    // 33_327 - 5_000 + 1_000
    assert_eq!(result.amount_due, dec!(29_327));
    assert_eq!(result.balance_in_favor, dec!(0));
    assert_eq!(result.early_payment_discount, dec!(0));
    // 586.54 before rounding
    assert_eq!(result.late_interest, dec!(587));
    assert_eq!(result.total_after_discount, dec!(29_914));
    assert_eq!(result.total_with_voluntary, dec!(29_914));
}

#[test]
fn test_early_payment_discount_in_signed_result() {
    let service = service_with(payment_params());
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    let mut update = example_update();
    update.discounts = Some(DiscountsCredits {
        self_withholdings: amount(dec!(5_000)),
        penalties: amount(dec!(1_000)),
        ..Default::default()
    });
    update.payment = Some(PaymentSection {
        payment_date: Some(date(2025, 1, 15)),
        voluntary_contribution: amount(dec!(2_000)),
    });
    service.update(id, OWNER, update, &meta()).unwrap();
    service.sign(id, OWNER, signature(), &meta()).unwrap();

    let result = service.sections(id).unwrap().result;
    assert_eq!(result.amount_due, dec!(29_327));
    // 2_932.7 before rounding
    assert_eq!(result.early_payment_discount, dec!(2_933));
    assert_eq!(result.late_interest, dec!(0));
    assert_eq!(result.total_after_discount, dec!(26_394));
    assert_eq!(result.total_with_voluntary, dec!(28_394));
}

#[test]
fn test_out_of_range_energy_rate_is_rejected() {
    let service = service_with(FormulaParameters {
        energy_rate_per_kw: dec!(1_000_000_000_000_000_000),
        ..Default::default()
    });
    radicado_counter(&service);
    let id = service.create(OWNER, MEDELLIN, 2024, &meta()).unwrap().id;
    let update = SectionsUpdate {
        energy_generation: Some(EnergyGeneration {
            installed_capacity_kw: amount(dec!(999_999_999_999)),
        }),
        ..Default::default()
    };
    service.update(id, OWNER, update, &meta()).unwrap();

    let result = service.calculate(id, OWNER, &meta());
    assert!(matches!(
        result,
        Err(LifecycleError::Validation(ValidationError::TooLarge {
            field: "energy_rate_per_kw",
            ..
        }))
    ));
    assert!(matches!(
        service.sign(id, OWNER, signature(), &meta()),
        Err(LifecycleError::Validation(ValidationError::TooLarge { .. }))
    ));

    let declaration = service.get(id).unwrap();
    assert_eq!(declaration.status, DeclarationStatus::Draft);
    assert!(declaration.filing_number.is_none());
    let counter = service.peek_counter(MEDELLIN, Sequence::Radicado).unwrap().unwrap();
    assert_eq!(counter.current_value, 1);
}
