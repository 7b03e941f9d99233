use rusqlite::Connection;
use unchaos_core::db::migrations::latest_version;
use unchaos_core::db::{open_db, open_db_in_memory, DbError};

const TABLES: &[&str] = &[
    "notes",
    "snippets",
    "tokens",
    "note_tags",
    "snippet_tags",
    "note_entities",
    "snippet_entities",
    "note_urls",
    "times",
    "note_times",
    "snippet_times",
    "nodes",
    "edges",
    "note_nodes",
    "queue",
];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in TABLES {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn migration_seeds_exactly_one_root_node() {
    let conn = open_db_in_memory().unwrap();
    let (count, name): (i64, String) = conn
        .query_row(
            "SELECT COUNT(*), MAX(name) FROM nodes WHERE is_root = 1;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(name, "ROOT");

    let second_root = conn.execute("INSERT INTO nodes (name, is_root) VALUES ('X', 1);", []);
    assert!(second_root.is_err());
}

#[test]
fn schema_rejects_second_parent() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO nodes (id, name) VALUES (10, 'Work'), (11, 'Home'), (12, 'Desk');
         INSERT INTO edges (from_node, to_node) VALUES (1, 10), (1, 11), (10, 12);",
    )
    .unwrap();

    let second = conn.execute("INSERT INTO edges (from_node, to_node) VALUES (11, 12);", []);
    assert!(second.is_err());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("unchaos.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let roots: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM nodes WHERE is_root = 1;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(roots, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
