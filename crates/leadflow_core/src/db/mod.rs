//! SQLite store for leads.
//!
//! Connections returned by [`open_db`] and [`open_db_in_memory`] are fully
//! migrated, enforce foreign keys, and have the `lead_contains` search
//! function registered. Repositories assume all three.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod schema;
mod search;

pub use open::{open_db, open_db_in_memory};
pub(crate) use search::SEARCH_FUNCTION;

pub type DbResult<T> = Result<T, DbError>;

/// Store-level failure. Reaches callers as `LeadError::StoreUnavailable`.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The database was written by a build with a newer lead schema.
    SchemaTooNew { found: u32, supported: u32 },
    /// Migrations ran but a lead table is absent.
    MissingTable(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "lead store error: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "lead store schema v{found} is newer than this build (v{supported})"
            ),
            Self::MissingTable(table) => write!(f, "lead store is missing table `{table}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::SchemaTooNew { .. } | Self::MissingTable(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
