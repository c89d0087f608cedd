use leadflow_core::db::schema::{schema_version, LEAD_TABLES};
use leadflow_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

fn stored_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .expect("read user_version")
}

fn table_exists(conn: &Connection, table_name: &str) -> bool {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [table_name],
        |row| row.get(0),
    )
    .expect("query sqlite_master")
}

#[test]
fn fresh_database_gets_every_lead_table() {
    let conn = open_db_in_memory().expect("open in-memory db");

    assert_eq!(stored_version(&conn), schema_version());
    for table in LEAD_TABLES {
        assert!(table_exists(&conn, table), "table {table} does not exist");
    }
}

#[test]
fn connection_enforces_foreign_keys_and_search_function() {
    let conn = open_db_in_memory().expect("open in-memory db");

    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .expect("read foreign_keys");
    assert_eq!(enabled, 1);

    let matched: bool = conn
        .query_row("SELECT lead_contains('Jürgen MÜLLER', 'müller');", [], |row| {
            row.get(0)
        })
        .expect("call lead_contains");
    assert!(matched);
    let null_matched: bool = conn
        .query_row("SELECT lead_contains(NULL, 'x');", [], |row| row.get(0))
        .expect("call lead_contains on NULL");
    assert!(!null_matched);
}

#[test]
fn reopening_a_migrated_file_keeps_its_leads() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("leadflow.db");

    let conn_first = open_db(&path).expect("open file db");
    conn_first
        .execute(
            "INSERT INTO leads (id, name, email, company, created_at, updated_at)
             VALUES ('00000000-0000-4000-8000-000000000001', 'A', 'a@x.com', 'Acme', 1, 1);",
            [],
        )
        .expect("insert lead row");
    drop(conn_first);

    let conn_second = open_db(&path).expect("reopen file db");
    assert_eq!(stored_version(&conn_second), schema_version());
    let count: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM leads;", [], |row| row.get(0))
        .expect("count leads");
    assert_eq!(count, 1);
}

#[test]
fn newer_schema_version_is_rejected() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).expect("create raw db");
    conn.execute_batch("PRAGMA user_version = 999;")
        .expect("set user_version");
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, schema_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn current_version_without_lead_tables_is_rejected() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("hollow.db");

    let conn = Connection::open(&path).expect("create raw db");
    conn.execute_batch(&format!("PRAGMA user_version = {};", schema_version()))
        .expect("set user_version");
    drop(conn);

    let err = open_db(&path).unwrap_err();
    assert!(matches!(err, DbError::MissingTable("leads")), "got {err}");
}
