//! Lead list/count query builder.
//!
//! # Responsibility
//! - Build the search predicate, ordering and page window for lead lists.
//! - Build the matching count query from the same predicate.
//!
//! # Invariants
//! - List and count queries always share one predicate builder, so `total`
//!   stays consistent with the listed items.
//! - Search terms are matched literally and case-insensitively through the
//!   connection's `lead_contains` function, including non-ASCII text.
//! - Equal sort keys are ordered by `id ASC` in both sort directions.

use crate::db::SEARCH_FUNCTION;
use crate::model::lead::Stage;
use crate::model::page::{normalize_search, PageRequest, SortField};
use rusqlite::types::Value;

pub(crate) const LEAD_COLUMNS: &str = "id,
    name,
    email,
    company,
    status,
    engaged,
    current_stage,
    stage_updated_at,
    last_contacted,
    created_at,
    updated_at";

const SEARCH_COLUMNS: [&str; 3] = ["name", "email", "company"];

/// List options for leads.
///
/// `limit = None` returns every matching row after `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadListQuery {
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_desc: bool,
    pub limit: Option<u32>,
    pub offset: u64,
}

impl Default for LeadListQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort_by: SortField::default(),
            sort_desc: true,
            limit: None,
            offset: 0,
        }
    }
}

impl From<&PageRequest> for LeadListQuery {
    fn from(request: &PageRequest) -> Self {
        Self {
            search: request.search_term().map(str::to_string),
            sort_by: request.sort_by,
            sort_desc: request.sort_desc,
            limit: Some(request.page_size),
            offset: request.skip(),
        }
    }
}

/// SQL text plus positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlQuery {
    pub sql: String,
    pub binds: Vec<Value>,
}

/// Builds the paged lead select for `query`.
pub(crate) fn build_select(query: &LeadListQuery) -> SqlQuery {
    let (predicate, mut binds) = search_predicate(query.search.as_deref());
    let mut sql = format!("SELECT {LEAD_COLUMNS} FROM leads{predicate}");

    let direction = if query.sort_desc { "DESC" } else { "ASC" };
    sql.push_str(&format!(
        " ORDER BY {} {direction}, id ASC",
        sort_expression(query.sort_by)
    ));

    let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
    match query.limit {
        Some(limit) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            binds.push(Value::Integer(i64::from(limit)));
            binds.push(Value::Integer(offset));
        }
        None if offset > 0 => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(Value::Integer(offset));
        }
        None => {}
    }

    SqlQuery { sql, binds }
}

/// Builds the count query matching [`build_select`]'s predicate.
pub(crate) fn build_count(search: Option<&str>) -> SqlQuery {
    let (predicate, binds) = search_predicate(search);
    SqlQuery {
        sql: format!("SELECT COUNT(*) FROM leads{predicate}"),
        binds,
    }
}

/// Returns ` WHERE ...` with binds, or an empty predicate for blank search.
fn search_predicate(search: Option<&str>) -> (String, Vec<Value>) {
    let Some(term) = normalize_search(search) else {
        return (String::new(), Vec::new());
    };

    let clauses = SEARCH_COLUMNS
        .iter()
        .map(|column| format!("{SEARCH_FUNCTION}({column}, ?)"))
        .collect::<Vec<_>>()
        .join(" OR ");
    let binds = SEARCH_COLUMNS
        .iter()
        .map(|_| Value::Text(term.to_string()))
        .collect();

    (format!(" WHERE ({clauses})"), binds)
}

fn sort_expression(field: SortField) -> String {
    match field {
        SortField::CreatedAt => "created_at".to_string(),
        SortField::UpdatedAt => "updated_at".to_string(),
        SortField::Name => "name COLLATE NOCASE".to_string(),
        SortField::Email => "email COLLATE NOCASE".to_string(),
        SortField::Company => "company COLLATE NOCASE".to_string(),
        SortField::StageUpdatedAt => "stage_updated_at".to_string(),
        SortField::LastContacted => "last_contacted".to_string(),
        SortField::CurrentStage => {
            let arms = Stage::ALL
                .iter()
                .map(|stage| format!("WHEN '{}' THEN {}", stage.as_str(), stage.index()))
                .collect::<Vec<_>>()
                .join(" ");
            format!("CASE current_stage {arms} ELSE {} END", Stage::ALL.len())
        }
    }
}
