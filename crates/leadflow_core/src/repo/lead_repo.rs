//! Lead repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/read/update/delete over the `leads` store.
//! - Own the stage-history invariant: seed on create, append on change.
//!
//! # Invariants
//! - Each mutation runs in one `IMMEDIATE` transaction, so the pre-update
//!   read used for `from_stage` and the write cannot interleave with another
//!   writer.
//! - A stage change appends exactly one history row and sets
//!   `stage_updated_at` to the same instant as `updated_at`.
//! - Email uniqueness is enforced by the store's UNIQUE constraint.

use crate::db::DbError;
use crate::model::lead::{
    now_utc, Lead, LeadId, LeadUpdate, LeadValidationError, NewLead, Stage, StageChange,
    StagePolicy,
};
use crate::repo::query::{build_count, build_select, LeadListQuery, LEAD_COLUMNS};
use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, info};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, Row, Transaction, TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type LeadResult<T> = Result<T, LeadError>;

/// Repository and service error for lead operations.
#[derive(Debug)]
pub enum LeadError {
    Validation(LeadValidationError),
    /// Carries the id as supplied by the caller, which may be malformed.
    NotFound(String),
    DuplicateLead(String),
    InvalidStageTransition {
        from: Stage,
        to: Stage,
    },
    StoreUnavailable(DbError),
    InvalidData(String),
}

impl LeadError {
    /// Transport status the request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::DuplicateLead(_) => 409,
            Self::Validation(_) | Self::InvalidStageTransition { .. } => 400,
            Self::StoreUnavailable(_) | Self::InvalidData(_) => 500,
        }
    }

    /// Stable machine-readable code, safe for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::NotFound(_) => "lead_not_found",
            Self::DuplicateLead(_) => "duplicate_lead",
            Self::InvalidStageTransition { .. } => "invalid_stage_transition",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InvalidData(_) => "invalid_data",
        }
    }

    /// Returns whether this is a client-facing domain error.
    pub fn is_domain(&self) -> bool {
        self.status_code() < 500
    }

    /// Message safe to return to clients; server errors hide store details.
    pub fn public_message(&self) -> String {
        if self.is_domain() {
            self.to_string()
        } else {
            "internal server error".to_string()
        }
    }
}

impl Display for LeadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "lead not found: {id}"),
            Self::DuplicateLead(email) => write!(f, "lead with email {email} already exists"),
            Self::InvalidStageTransition { from, to } => {
                write!(f, "stage transition {from} -> {to} is not allowed")
            }
            Self::StoreUnavailable(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted lead data: {message}"),
        }
    }
}

impl Error for LeadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::StoreUnavailable(err) => Some(err),
            Self::NotFound(_)
            | Self::DuplicateLead(_)
            | Self::InvalidStageTransition { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<LeadValidationError> for LeadError {
    fn from(value: LeadValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for LeadError {
    fn from(value: DbError) -> Self {
        Self::StoreUnavailable(value)
    }
}

impl From<rusqlite::Error> for LeadError {
    fn from(value: rusqlite::Error) -> Self {
        Self::StoreUnavailable(DbError::Sqlite(value))
    }
}

/// Repository interface for lead persistence.
pub trait LeadRepository {
    /// Fetches one lead; malformed ids are reported as not found.
    fn get(&self, id: &str) -> LeadResult<Lead>;
    /// Exact-match email lookup.
    fn get_by_email(&self, email: &str) -> LeadResult<Option<Lead>>;
    /// Lists one window of matching leads.
    fn get_multi(&self, query: &LeadListQuery) -> LeadResult<Vec<Lead>>;
    /// Counts leads matching the same predicate `get_multi` uses.
    fn get_count(&self, search: Option<&str>) -> LeadResult<u64>;
    fn create(&self, input: &NewLead) -> LeadResult<Lead>;
    /// Applies only the fields present in `changes`.
    fn update(&self, id: &str, changes: &LeadUpdate) -> LeadResult<Lead>;
    /// Removes and returns the lead.
    fn delete(&self, id: &str) -> LeadResult<Lead>;
}

/// SQLite-backed lead repository.
pub struct SqliteLeadRepository<'conn> {
    conn: &'conn Connection,
    stage_policy: StagePolicy,
}

impl<'conn> SqliteLeadRepository<'conn> {
    /// Wraps a migrated connection (see [`crate::db::open_db`]).
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            stage_policy: StagePolicy::default(),
        }
    }

    pub fn with_stage_policy(mut self, policy: StagePolicy) -> Self {
        self.stage_policy = policy;
        self
    }

    fn begin_write(&self) -> LeadResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl LeadRepository for SqliteLeadRepository<'_> {
    fn get(&self, id: &str) -> LeadResult<Lead> {
        let lead_id = parse_lead_id(id)?;
        load_lead(self.conn, lead_id)?.ok_or_else(|| LeadError::NotFound(id.to_string()))
    }

    fn get_by_email(&self, email: &str) -> LeadResult<Option<Lead>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE email = ?1;"))?;
        let mut rows = stmt.query([email])?;
        match rows.next()? {
            Some(row) => Ok(Some(hydrate(self.conn, row)?)),
            None => Ok(None),
        }
    }

    fn get_multi(&self, query: &LeadListQuery) -> LeadResult<Vec<Lead>> {
        let select = build_select(query);
        let mut stmt = self.conn.prepare(&select.sql)?;
        let mut rows = stmt.query(params_from_iter(select.binds))?;
        let mut leads = Vec::new();
        while let Some(row) = rows.next()? {
            leads.push(hydrate(self.conn, row)?);
        }
        Ok(leads)
    }

    fn get_count(&self, search: Option<&str>) -> LeadResult<u64> {
        let count = build_count(search);
        let total: i64 =
            self.conn
                .query_row(&count.sql, params_from_iter(count.binds), |row| row.get(0))?;
        u64::try_from(total).map_err(|_| LeadError::InvalidData(format!("negative count {total}")))
    }

    fn create(&self, input: &NewLead) -> LeadResult<Lead> {
        input.validate()?;

        let id = Uuid::new_v4();
        let now = now_utc();
        let lead = Lead {
            id,
            name: input.name.clone(),
            email: input.email.clone(),
            company: input.company.clone(),
            status: input.status.clone(),
            engaged: input.engaged,
            current_stage: input.current_stage,
            stage_updated_at: Some(now),
            stage_history: vec![StageChange::initial(input.current_stage, now)],
            last_contacted: input.last_contacted.map(|at| at.trunc_subsecs(3)),
            created_at: now,
            updated_at: now,
        };

        let tx = self.begin_write()?;
        let inserted = tx.execute(
            "INSERT INTO leads (
                id,
                name,
                email,
                company,
                status,
                engaged,
                current_stage,
                stage_updated_at,
                last_contacted,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                lead.id.to_string(),
                lead.name.as_str(),
                lead.email.as_str(),
                lead.company.as_str(),
                lead.status.as_str(),
                lead.engaged,
                lead.current_stage.as_str(),
                to_millis(now),
                lead.last_contacted.map(to_millis),
                to_millis(now),
                to_millis(now),
            ],
        );
        if let Err(err) = inserted {
            return Err(map_write_error(err, &lead.email));
        }
        insert_stage_change(&tx, id, 0, &lead.stage_history[0])?;
        tx.commit()?;

        info!(
            "event=lead_create module=repo status=ok lead_id={} stage={}",
            lead.id, lead.current_stage
        );
        Ok(lead)
    }

    fn update(&self, id: &str, changes: &LeadUpdate) -> LeadResult<Lead> {
        changes.validate()?;
        let lead_id = parse_lead_id(id)?;

        let tx = self.begin_write()?;
        let current = load_lead(&tx, lead_id)?.ok_or_else(|| LeadError::NotFound(id.to_string()))?;
        let now = now_utc();

        let mut assignments = vec!["updated_at = ?"];
        let mut binds = vec![Value::Integer(to_millis(now))];
        if let Some(name) = &changes.name {
            assignments.push("name = ?");
            binds.push(Value::Text(name.clone()));
        }
        if let Some(email) = &changes.email {
            assignments.push("email = ?");
            binds.push(Value::Text(email.clone()));
        }
        if let Some(company) = &changes.company {
            assignments.push("company = ?");
            binds.push(Value::Text(company.clone()));
        }
        if let Some(status) = &changes.status {
            assignments.push("status = ?");
            binds.push(Value::Text(status.clone()));
        }
        if let Some(engaged) = changes.engaged {
            assignments.push("engaged = ?");
            binds.push(Value::Integer(i64::from(engaged)));
        }
        if let Some(last_contacted) = changes.last_contacted {
            assignments.push("last_contacted = ?");
            binds.push(last_contacted.map_or(Value::Null, |at| Value::Integer(to_millis(at))));
        }

        let stage_change = match changes.current_stage {
            Some(to) if to != current.current_stage => {
                if !self.stage_policy.permits(current.current_stage, to) {
                    return Err(LeadError::InvalidStageTransition {
                        from: current.current_stage,
                        to,
                    });
                }
                assignments.push("current_stage = ?");
                binds.push(Value::Text(to.as_str().to_string()));
                assignments.push("stage_updated_at = ?");
                binds.push(Value::Integer(to_millis(now)));
                Some(StageChange::transition(
                    current.current_stage,
                    to,
                    now,
                    changes.stage_note.clone(),
                ))
            }
            _ => None,
        };
        if stage_change.is_none() && changes.stage_note.is_some() {
            return Err(LeadValidationError::NoteWithoutStage.into());
        }

        binds.push(Value::Text(lead_id.to_string()));
        let sql = format!("UPDATE leads SET {} WHERE id = ?;", assignments.join(", "));
        let changed = match tx.execute(&sql, params_from_iter(binds)) {
            Ok(changed) => changed,
            Err(err) => {
                let email = changes.email.as_deref().unwrap_or(current.email.as_str());
                return Err(map_write_error(err, email));
            }
        };
        if changed == 0 {
            return Err(LeadError::NotFound(id.to_string()));
        }

        if let Some(entry) = &stage_change {
            let seq = i64::try_from(current.stage_history.len())
                .map_err(|_| LeadError::InvalidData("stage history too long".to_string()))?;
            insert_stage_change(&tx, lead_id, seq, entry)?;
        }

        let updated =
            load_lead(&tx, lead_id)?.ok_or_else(|| LeadError::NotFound(id.to_string()))?;
        tx.commit()?;

        info!(
            "event=lead_update module=repo status=ok lead_id={} fields={} stage_changed={}",
            lead_id,
            assignments.len(),
            stage_change.is_some()
        );
        Ok(updated)
    }

    fn delete(&self, id: &str) -> LeadResult<Lead> {
        let lead_id = parse_lead_id(id)?;

        let tx = self.begin_write()?;
        let lead = load_lead(&tx, lead_id)?.ok_or_else(|| LeadError::NotFound(id.to_string()))?;
        tx.execute("DELETE FROM leads WHERE id = ?1;", [lead_id.to_string()])?;
        tx.commit()?;

        info!("event=lead_delete module=repo status=ok lead_id={lead_id}");
        Ok(lead)
    }
}

fn parse_lead_id(id: &str) -> LeadResult<LeadId> {
    Uuid::parse_str(id.trim()).map_err(|_| {
        debug!("event=lead_lookup module=repo status=error error_code=malformed_id");
        LeadError::NotFound(id.to_string())
    })
}

fn map_write_error(err: rusqlite::Error, email: &str) -> LeadError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == ErrorCode::ConstraintViolation
                && code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            LeadError::DuplicateLead(email.to_string())
        }
        _ => err.into(),
    }
}

fn load_lead(conn: &Connection, id: LeadId) -> LeadResult<Option<Lead>> {
    let mut stmt = conn.prepare(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(hydrate(conn, row)?)),
        None => Ok(None),
    }
}

/// Builds a full lead from its row plus its ordered stage history.
fn hydrate(conn: &Connection, row: &Row<'_>) -> LeadResult<Lead> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        LeadError::InvalidData(format!("invalid uuid value `{id_text}` in leads.id"))
    })?;

    let stage_text: String = row.get("current_stage")?;
    let current_stage = parse_stage(&stage_text, "leads.current_stage")?;

    let lead = Lead {
        id,
        name: row.get("name")?,
        email: row.get("email")?,
        company: row.get("company")?,
        status: row.get("status")?,
        engaged: row.get("engaged")?,
        current_stage,
        stage_updated_at: optional_timestamp(row.get("stage_updated_at")?)?,
        stage_history: load_stage_history(conn, &id_text)?,
        last_contacted: optional_timestamp(row.get("last_contacted")?)?,
        created_at: from_millis(row.get("created_at")?)?,
        updated_at: from_millis(row.get("updated_at")?)?,
    };

    if lead.stage_history.is_empty() {
        return Err(LeadError::InvalidData(format!(
            "lead {id_text} has no stage history"
        )));
    }
    Ok(lead)
}

fn load_stage_history(conn: &Connection, lead_id: &str) -> LeadResult<Vec<StageChange>> {
    let mut stmt = conn.prepare(
        "SELECT from_stage, to_stage, changed_at, note
         FROM lead_stage_changes
         WHERE lead_id = ?1
         ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query([lead_id])?;
    let mut history = Vec::new();
    while let Some(row) = rows.next()? {
        let from_stage = match row.get::<_, Option<String>>("from_stage")? {
            Some(value) => Some(parse_stage(&value, "lead_stage_changes.from_stage")?),
            None => None,
        };
        let to_text: String = row.get("to_stage")?;
        history.push(StageChange {
            from_stage,
            to_stage: parse_stage(&to_text, "lead_stage_changes.to_stage")?,
            changed_at: from_millis(row.get("changed_at")?)?,
            note: row.get("note")?,
        });
    }
    Ok(history)
}

fn insert_stage_change(
    conn: &Connection,
    lead_id: LeadId,
    seq: i64,
    entry: &StageChange,
) -> LeadResult<()> {
    conn.execute(
        "INSERT INTO lead_stage_changes (lead_id, seq, from_stage, to_stage, changed_at, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            lead_id.to_string(),
            seq,
            entry.from_stage.map(Stage::as_str),
            entry.to_stage.as_str(),
            to_millis(entry.changed_at),
            entry.note.as_deref(),
        ],
    )?;
    Ok(())
}

fn parse_stage(value: &str, column: &str) -> LeadResult<Stage> {
    value
        .parse()
        .map_err(|_| LeadError::InvalidData(format!("invalid stage `{value}` in {column}")))
}

fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

fn from_millis(value: i64) -> LeadResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| LeadError::InvalidData(format!("timestamp out of range: {value}")))
}

fn optional_timestamp(value: Option<i64>) -> LeadResult<Option<DateTime<Utc>>> {
    value.map(from_millis).transpose()
}
