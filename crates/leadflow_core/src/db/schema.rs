//! Lead store schema steps and post-migration checks.
//!
//! Pending steps run in one transaction; the reached step is recorded in
//! `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

/// `(version, label, sql)`, strictly increasing by version.
const STEPS: &[(u32, &str, &str)] = &[
    (1, "leads", include_str!("migrations/0001_leads.sql")),
    (
        2,
        "lead_list_indexes",
        include_str!("migrations/0002_lead_list_indexes.sql"),
    ),
];

/// Tables the repositories read and write.
pub const LEAD_TABLES: [&str; 2] = ["leads", "lead_stage_changes"];

/// Schema version this build writes.
pub fn schema_version() -> u32 {
    STEPS.last().map_or(0, |(version, _, _)| *version)
}

/// Brings `conn` to [`schema_version`] and checks that every lead table
/// exists. Returns the version found before migrating.
pub fn migrate(conn: &mut Connection) -> DbResult<u32> {
    let found = stored_version(conn)?;
    let supported = schema_version();
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    if found < supported {
        let tx = conn.transaction()?;
        for (version, label, sql) in STEPS.iter().filter(|(version, _, _)| *version > found) {
            tx.execute_batch(sql)?;
            tx.pragma_update(None, "user_version", version)?;
            debug!("event=db_migrate module=db status=step version={version} step={label}");
        }
        tx.commit()?;
        info!("event=db_migrate module=db status=ok from_version={found} to_version={supported}");
    }

    verify_lead_tables(conn)?;
    Ok(found)
}

fn verify_lead_tables(conn: &Connection) -> DbResult<()> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1;")?;
    for table in LEAD_TABLES {
        if !stmt.exists([table])? {
            return Err(DbError::MissingTable(table));
        }
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::{schema_version, STEPS};

    #[test]
    fn steps_are_strictly_increasing_from_one() {
        for (index, (version, _, _)) in STEPS.iter().enumerate() {
            assert_eq!(*version as usize, index + 1);
        }
        assert_eq!(schema_version(), STEPS.len() as u32);
    }
}
