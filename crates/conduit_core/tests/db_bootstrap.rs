use conduit_core::db::migrations::latest_version;
use conduit_core::{
    open_store, open_store_in_memory, CallContext, DbError, DbResult, RelationalConnection,
    StoreConfig,
};
use rusqlite::Connection;

#[test]
fn open_store_in_memory_applies_all_migrations() {
    let conn = open_store_in_memory().unwrap();
    let ctx = CallContext::background();

    assert_eq!(conn.schema_version(&ctx).unwrap(), latest_version());
    for table in [
        "users",
        "follows",
        "articles",
        "tags",
        "article_tags",
        "favorite_articles",
        "comments",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn in_memory_store_keeps_one_connection_alive() {
    let conn = open_store_in_memory().unwrap();
    let state = conn.pool_state();
    assert_eq!(state.connections, 1);
    assert_eq!(state.idle_connections, 1);

    // Data written through one checkout is visible through the next one.
    let ctx = CallContext::background();
    conn.run(&ctx, |c| -> DbResult<()> {
        c.execute_batch("CREATE TABLE scratch (v INTEGER); INSERT INTO scratch VALUES (7);")?;
        Ok(())
    })
    .unwrap();
    let value = conn
        .run(&ctx, |c| -> DbResult<i64> {
            Ok(c.query_row("SELECT v FROM scratch;", [], |row| row.get(0))?)
        })
        .unwrap();
    assert_eq!(value, 7);
}

#[test]
fn pooled_connections_enforce_foreign_keys() {
    let conn = open_store_in_memory().unwrap();
    let enabled = conn
        .run(&CallContext::background(), |c| -> DbResult<i64> {
            Ok(c.query_row("PRAGMA foreign_keys;", [], |row| row.get(0))?)
        })
        .unwrap();
    assert_eq!(enabled, 1);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conduit.db");
    let ctx = CallContext::background();

    let first = open_store(&file_config(&path)).unwrap();
    assert_eq!(first.schema_version(&ctx).unwrap(), latest_version());
    drop(first);

    let second = open_store(&file_config(&path)).unwrap();
    assert_eq!(second.schema_version(&ctx).unwrap(), latest_version());
    assert_table_exists(&second, "favorite_articles");
}

#[test]
fn file_store_uses_wal_journal() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_store(&file_config(&dir.path().join("wal.db"))).unwrap();
    let mode = conn
        .run(&CallContext::background(), |c| -> DbResult<String> {
            Ok(c.query_row("PRAGMA journal_mode;", [], |row| row.get(0))?)
        })
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let raw = Connection::open(&path).unwrap();
    raw.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(raw);

    let err = open_store(&file_config(&path)).unwrap_err();
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

fn file_config(path: &std::path::Path) -> StoreConfig {
    StoreConfig {
        max_connections: 2,
        ..StoreConfig::file(path)
    }
}

fn assert_table_exists(conn: &RelationalConnection, table_name: &str) {
    let exists = conn
        .run(&CallContext::background(), |c| -> DbResult<i64> {
            Ok(c.query_row(
                "SELECT EXISTS(
                    SELECT 1
                    FROM sqlite_master
                    WHERE type = 'table' AND name = ?1
                );",
                [table_name],
                |row| row.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

#[test]
fn zero_max_connections_is_rejected_without_panicking() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        max_connections: 0,
        ..StoreConfig::file(dir.path().join("empty-pool.db"))
    };

    let err = open_store(&config).unwrap_err();
    assert!(matches!(err, DbError::InvalidConfig(_)), "unexpected error: {err}");
}
