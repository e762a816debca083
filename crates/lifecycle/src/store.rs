//! SQLite storage for declarations

use crate::audit::{AuditAction, AuditEvent};
use crate::error::{LifecycleError, StoreError};
use crate::sections;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use ica_core::{
    Declaration, DeclarationId, DeclarationSections, DeclarationStatus, DeclarationType,
    SignatureInfo,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DECLARATION_COLUMNS: &str = "id, tax_year, declaration_type, status, owner_id,
     municipality_id, form_number, filing_number, correction_of_id, has_been_corrected,
     is_signed, signed_at, signed_by, integrity_hash, void_reason, created_at, updated_at";

/// Timestamps are stored at microsecond precision with their offset, so a
/// stored value reads back equal to what was hashed.
pub(crate) fn timestamp(at: &DateTime<FixedOffset>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp {value:?}: {e}")))
}

fn parse_code<T: FromStr>(column: &str, value: &str) -> Result<T, StoreError> {
    T::from_str(value).map_err(|_| StoreError::Corrupt(format!("invalid {column} {value:?}")))
}

/// Raw declaration row, converted after the query closure returns
struct DeclarationRow {
    id: DeclarationId,
    tax_year: i32,
    declaration_type: String,
    status: String,
    owner_id: String,
    municipality_id: String,
    form_number: String,
    filing_number: Option<String>,
    correction_of: Option<DeclarationId>,
    has_been_corrected: bool,
    is_signed: bool,
    signed_at: Option<String>,
    signed_by: Option<String>,
    integrity_hash: Option<String>,
    void_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DeclarationRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tax_year: row.get(1)?,
            declaration_type: row.get(2)?,
            status: row.get(3)?,
            owner_id: row.get(4)?,
            municipality_id: row.get(5)?,
            form_number: row.get(6)?,
            filing_number: row.get(7)?,
            correction_of: row.get(8)?,
            has_been_corrected: row.get(9)?,
            is_signed: row.get(10)?,
            signed_at: row.get(11)?,
            signed_by: row.get(12)?,
            integrity_hash: row.get(13)?,
            void_reason: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_declaration(self) -> Result<Declaration, StoreError> {
        Ok(Declaration {
            id: self.id,
            tax_year: self.tax_year,
            declaration_type: parse_code("declaration_type", &self.declaration_type)?,
            status: parse_code("status", &self.status)?,
            owner_id: self.owner_id,
            municipality_id: self.municipality_id,
            form_number: self.form_number,
            filing_number: self.filing_number,
            correction_of: self.correction_of,
            has_been_corrected: self.has_been_corrected,
            is_signed: self.is_signed,
            signed_at: self.signed_at.as_deref().map(parse_timestamp).transpose()?,
            signed_by: self.signed_by,
            integrity_hash: self.integrity_hash,
            void_reason: self.void_reason,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Values for a new declaration row
pub(crate) struct NewDeclaration<'a> {
    pub tax_year: i32,
    pub declaration_type: DeclarationType,
    pub owner_id: &'a str,
    pub municipality_id: &'a str,
    pub form_number: &'a str,
    pub correction_of: Option<DeclarationId>,
    pub created_at: DateTime<FixedOffset>,
}

/// Values written when a declaration is signed
pub(crate) struct SignedFields<'a> {
    pub filing_number: &'a str,
    pub signed_at: DateTime<FixedOffset>,
    pub signed_by: &'a str,
    pub integrity_hash: &'a str,
}

/// SQLite storage for declarations, their sections, signatures and audit log
pub struct DeclarationStore {
    conn: Mutex<Connection>,
}

impl DeclarationStore {
    /// Create a new store with the given database path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` inside an IMMEDIATE transaction. The write lock is taken
    /// before the first read, so guards checked inside `f` still hold when
    /// `f` writes. Rolled back when `f` fails.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read-only closure against the connection
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, LifecycleError>,
    ) -> Result<T, LifecycleError> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Get a declaration by ID
    pub fn get(&self, id: DeclarationId) -> Result<Declaration, LifecycleError> {
        self.read(|conn| load_declaration(conn, id))
    }

    /// Get every section of a declaration
    pub fn sections(&self, id: DeclarationId) -> Result<DeclarationSections, LifecycleError> {
        self.read(|conn| {
            load_declaration(conn, id)?;
            Ok(sections::load_all(conn, id)?)
        })
    }

    /// Get the stored signature, if the declaration has been signed
    pub fn signature(&self, id: DeclarationId) -> Result<Option<SignatureInfo>, LifecycleError> {
        self.read(|conn| Ok(load_signature(conn, id)?))
    }

    /// List declarations of one owner, newest first
    pub fn list_by_owner(&self, owner: &str) -> Result<Vec<Declaration>, LifecycleError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DECLARATION_COLUMNS} FROM declarations
                 WHERE owner_id = ?1 ORDER BY id DESC"
            ))?;
            let rows = stmt
                .query_map(params![owner], DeclarationRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let declarations = rows
                .into_iter()
                .map(DeclarationRow::into_declaration)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(declarations)
        })
    }

    /// Audit entries of one declaration, oldest first
    pub fn audit_trail(&self, id: DeclarationId) -> Result<Vec<AuditEvent>, LifecycleError> {
        self.read(|conn| Ok(load_audit(conn, id)?))
    }
}

pub(crate) fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS declarations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tax_year INTEGER NOT NULL,
            declaration_type TEXT NOT NULL,
            status TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            municipality_id TEXT NOT NULL,
            form_number TEXT NOT NULL,
            filing_number TEXT UNIQUE,
            correction_of_id INTEGER REFERENCES declarations(id),
            has_been_corrected INTEGER NOT NULL DEFAULT 0,
            is_signed INTEGER NOT NULL DEFAULT 0,
            signed_at TEXT,
            signed_by TEXT,
            integrity_hash TEXT,
            void_reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK ((filing_number IS NOT NULL) = (is_signed = 1)),
            CHECK ((correction_of_id IS NOT NULL) = (declaration_type = 'correction'))
        )",
        [],
    )?;

    // At most one correction per original
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_declarations_correction_of
         ON declarations(correction_of_id) WHERE correction_of_id IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_declarations_owner ON declarations(owner_id)",
        [],
    )?;

    sections::init_schema(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS signature_info (
            declaration_id INTEGER PRIMARY KEY REFERENCES declarations(id),
            signer_id TEXT NOT NULL,
            data_json TEXT NOT NULL,
            document_hash TEXT NOT NULL,
            seal_json TEXT,
            signed_at TEXT NOT NULL,
            ip_address TEXT,
            user_agent TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            declaration_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            from_status TEXT,
            to_status TEXT,
            details_json TEXT NOT NULL,
            ip_address TEXT,
            user_agent TEXT,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;

    ica_numbering::init_schema(conn).map_err(|e| match e {
        ica_numbering::NumberingError::Database(e) => StoreError::Database(e),
        other => StoreError::Corrupt(other.to_string()),
    })?;

    Ok(())
}

pub(crate) fn load_declaration(
    conn: &Connection,
    id: DeclarationId,
) -> Result<Declaration, LifecycleError> {
    let row = conn
        .query_row(
            &format!("SELECT {DECLARATION_COLUMNS} FROM declarations WHERE id = ?1"),
            params![id],
            DeclarationRow::from_row,
        )
        .optional()?
        .ok_or(LifecycleError::NotFound(id))?;
    Ok(row.into_declaration()?)
}

pub(crate) fn insert_declaration(
    conn: &Connection,
    new: &NewDeclaration<'_>,
) -> Result<DeclarationId, StoreError> {
    let created_at = timestamp(&new.created_at);
    conn.execute(
        "INSERT INTO declarations
         (tax_year, declaration_type, status, owner_id, municipality_id, form_number,
          correction_of_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            new.tax_year,
            new.declaration_type.to_string(),
            DeclarationStatus::Draft.to_string(),
            new.owner_id,
            new.municipality_id,
            new.form_number,
            new.correction_of,
            created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn touch(
    conn: &Connection,
    id: DeclarationId,
    at: &DateTime<FixedOffset>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE declarations SET updated_at = ?1 WHERE id = ?2",
        params![timestamp(at), id],
    )?;
    Ok(())
}

/// Draft to Signed. Returns false when the row was no longer a draft.
pub(crate) fn mark_signed(
    conn: &Connection,
    id: DeclarationId,
    fields: &SignedFields<'_>,
) -> Result<bool, StoreError> {
    let signed_at = timestamp(&fields.signed_at);
    let rows = conn.execute(
        "UPDATE declarations
         SET status = ?1, is_signed = 1, filing_number = ?2, signed_at = ?3,
             signed_by = ?4, integrity_hash = ?5, updated_at = ?3
         WHERE id = ?6 AND status = ?7",
        params![
            DeclarationStatus::Signed.to_string(),
            fields.filing_number,
            signed_at,
            fields.signed_by,
            fields.integrity_hash,
            id,
            DeclarationStatus::Draft.to_string(),
        ],
    )?;
    Ok(rows == 1)
}

/// Flag an original as corrected. Returns false when it already was.
pub(crate) fn mark_corrected(
    conn: &Connection,
    id: DeclarationId,
    at: &DateTime<FixedOffset>,
) -> Result<bool, StoreError> {
    let rows = conn.execute(
        "UPDATE declarations SET has_been_corrected = 1, updated_at = ?1
         WHERE id = ?2 AND has_been_corrected = 0",
        params![timestamp(at), id],
    )?;
    Ok(rows == 1)
}

/// Draft to Voided. Returns false when the row was no longer a draft.
pub(crate) fn mark_voided(
    conn: &Connection,
    id: DeclarationId,
    reason: &str,
    at: &DateTime<FixedOffset>,
) -> Result<bool, StoreError> {
    let rows = conn.execute(
        "UPDATE declarations SET status = ?1, void_reason = ?2, updated_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![
            DeclarationStatus::Voided.to_string(),
            reason,
            timestamp(at),
            id,
            DeclarationStatus::Draft.to_string(),
        ],
    )?;
    Ok(rows == 1)
}

/// Store the signature, replacing any earlier one for the declaration
pub(crate) fn save_signature(conn: &Connection, info: &SignatureInfo) -> Result<(), StoreError> {
    let data_json = serde_json::to_string(&info.data)?;
    let seal_json = info.seal.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT OR REPLACE INTO signature_info
         (declaration_id, signer_id, data_json, document_hash, seal_json, signed_at,
          ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            info.declaration_id,
            info.signer_id,
            data_json,
            info.document_hash,
            seal_json,
            timestamp(&info.signed_at),
            info.request.ip_address,
            info.request.user_agent,
        ],
    )?;
    Ok(())
}

pub(crate) fn load_signature(
    conn: &Connection,
    id: DeclarationId,
) -> Result<Option<SignatureInfo>, StoreError> {
    let row = conn
        .query_row(
            "SELECT signer_id, data_json, document_hash, seal_json, signed_at, ip_address,
                    user_agent
             FROM signature_info WHERE declaration_id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((signer_id, data_json, document_hash, seal_json, signed_at, ip_address, user_agent)) =
        row
    else {
        return Ok(None);
    };

    Ok(Some(SignatureInfo {
        declaration_id: id,
        signer_id,
        data: serde_json::from_str(&data_json)?,
        document_hash,
        seal: seal_json.as_deref().map(serde_json::from_str).transpose()?,
        signed_at: parse_timestamp(&signed_at)?,
        request: ica_core::RequestMeta {
            ip_address,
            user_agent,
        },
    }))
}

pub(crate) fn insert_audit(conn: &Connection, event: &AuditEvent) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO audit_log
         (declaration_id, action, actor, from_status, to_status, details_json,
          ip_address, user_agent, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.declaration_id,
            event.action.to_string(),
            event.actor,
            event.from_status.map(|s| s.to_string()),
            event.to_status.map(|s| s.to_string()),
            event.details.to_string(),
            event.request.ip_address,
            event.request.user_agent,
            timestamp(&event.recorded_at),
        ],
    )?;
    Ok(())
}

fn load_audit(conn: &Connection, id: DeclarationId) -> Result<Vec<AuditEvent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT action, actor, from_status, to_status, details_json, ip_address, user_agent,
                recorded_at
         FROM audit_log WHERE declaration_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| -> Result<AuditEvent, StoreError> {
            let (action, actor, from, to, details, ip_address, user_agent, recorded_at) = row;
            Ok(AuditEvent {
                declaration_id: id,
                action: parse_code::<AuditAction>("action", &action)?,
                actor,
                from_status: from
                    .as_deref()
                    .map(|s| parse_code::<DeclarationStatus>("from_status", s))
                    .transpose()?,
                to_status: to
                    .as_deref()
                    .map(|s| parse_code::<DeclarationStatus>("to_status", s))
                    .transpose()?,
                details: serde_json::from_str(&details)?,
                request: ica_core::RequestMeta {
                    ip_address,
                    user_agent,
                },
                recorded_at: parse_timestamp(&recorded_at)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 2, 3, 10, 0, 0)
            .unwrap()
            + chrono::Duration::microseconds(123_456)
    }

    fn draft(conn: &Connection, form_number: &str) -> DeclarationId {
        insert_declaration(
            conn,
            &NewDeclaration {
                tax_year: 2024,
                declaration_type: DeclarationType::Initial,
                owner_id: "user-1",
                municipality_id: "05001",
                form_number,
                correction_of: None,
                created_at: at(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_load() {
        let store = DeclarationStore::in_memory().unwrap();
        let id = store.transaction(|tx| Ok(draft(tx, "C0001"))).unwrap();

        let declaration = store.get(id).unwrap();
        assert_eq!(declaration.form_number, "C0001");
        assert_eq!(declaration.status, DeclarationStatus::Draft);
        assert_eq!(declaration.created_at, at());
        assert!(declaration.filing_number.is_none());
    }

    #[test]
    fn test_missing_declaration() {
        let store = DeclarationStore::in_memory().unwrap();
        assert!(matches!(store.get(99), Err(LifecycleError::NotFound(99))));
    }

    #[test]
    fn test_mark_signed_only_once() {
        let store = DeclarationStore::in_memory().unwrap();
        let fields = SignedFields {
            filing_number: "R1",
            signed_at: at(),
            signed_by: "user-1",
            integrity_hash: "abc",
        };
        let (first, second) = store
            .transaction(|tx| {
                let id = draft(tx, "C0001");
                Ok((mark_signed(tx, id, &fields)?, mark_signed(tx, id, &fields)?))
            })
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn test_signed_requires_filing_number() {
        let store = DeclarationStore::in_memory().unwrap();
        let result = store.transaction(|tx| {
            let id = draft(tx, "C0001");
            tx.execute("UPDATE declarations SET is_signed = 1 WHERE id = ?1", params![id])?;
            Ok(())
        });
        assert!(matches!(result, Err(LifecycleError::Store(StoreError::Database(_)))));
    }

    #[test]
    fn test_second_correction_rejected_by_index() {
        let store = DeclarationStore::in_memory().unwrap();
        let result = store.transaction(|tx| {
            let original = draft(tx, "C0001");
            for form_number in ["C0002", "C0003"] {
                insert_declaration(
                    tx,
                    &NewDeclaration {
                        tax_year: 2024,
                        declaration_type: DeclarationType::Correction,
                        owner_id: "user-1",
                        municipality_id: "05001",
                        form_number,
                        correction_of: Some(original),
                        created_at: at(),
                    },
                )?;
            }
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = DeclarationStore::in_memory().unwrap();
        let result: Result<(), _> = store.transaction(|tx| {
            let id = draft(tx, "C0001");
            Err(LifecycleError::NotFound(id))
        });
        assert!(result.is_err());
        assert!(store.list_by_owner("user-1").unwrap().is_empty());
    }
}
