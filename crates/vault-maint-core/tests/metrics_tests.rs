use rusqlite::Connection;
use std::fs;
use tempfile::tempdir;

use vault_maint_core::metrics::collect;
use vault_maint_core::{Error, StatisticsFreshness, Thresholds};

#[test]
fn test_missing_database_is_not_found() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.sqlite3");

    let result = collect(&path, &Thresholds::default());
    assert!(matches!(result, Err(Error::NotFound(p)) if p == path));
    assert!(!path.exists(), "collecting metrics must not create the file");
}

#[test]
fn test_directory_is_not_found() {
    let dir = tempdir().unwrap();
    let result = collect(dir.path(), &Thresholds::default());
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_garbage_file_is_inaccessible() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.sqlite3");
    fs::write(&path, "this is not an sqlite database\n".repeat(200)).unwrap();

    let result = collect(&path, &Thresholds::default());
    assert!(matches!(result, Err(Error::Inaccessible { .. })));
}

#[test]
fn test_metrics_of_rollback_journal_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.sqlite3");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);
             CREATE TABLE ciphers (id INTEGER PRIMARY KEY, data BLOB);",
        )
        .unwrap();
        for i in 0..100 {
            conn.execute(
                "INSERT INTO ciphers (data) VALUES (zeroblob(2000 + ?1))",
                [i],
            )
            .unwrap();
        }
        conn.execute("DELETE FROM ciphers WHERE id > 20", []).unwrap();
    }

    let metrics = collect(&path, &Thresholds::default()).unwrap();
    assert_eq!(metrics.journal_mode, "delete");
    assert_eq!(metrics.table_count, 2);
    assert_eq!(metrics.wal_size_bytes, 0);
    assert_eq!(metrics.file_size_bytes, fs::metadata(&path).unwrap().len());
    assert_eq!(
        metrics.logical_size_bytes,
        metrics.page_count * metrics.page_size
    );
    assert!(metrics.freelist_count > 0);
    assert!(metrics.freelist_percent > 25.0);
    assert!((metrics.fragmentation_ratio - 1.0).abs() < f64::EPSILON);
    assert_eq!(metrics.statistics_freshness, StatisticsFreshness::Missing);
}

#[test]
fn test_metrics_of_wal_database_with_statistics() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.sqlite3");

    // held open so the WAL is not merged away on close
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         CREATE TABLE sends (id INTEGER PRIMARY KEY, payload TEXT);
         INSERT INTO sends (payload) VALUES ('a'), ('b'), ('c');
         ANALYZE;",
    )
    .unwrap();

    let metrics = collect(&path, &Thresholds::default()).unwrap();
    assert!(metrics.is_wal_mode());
    assert!(metrics.wal_size_bytes > 0);
    assert_eq!(metrics.table_count, 1);
    assert_eq!(metrics.statistics_freshness, StatisticsFreshness::Fresh);

    drop(conn);
}

#[test]
fn test_leftover_wal_is_measured_and_left_alone() {
    let dir = tempdir().unwrap();
    let live = dir.path().join("live.sqlite3");
    let conn = Connection::open(&live).unwrap();
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         CREATE TABLE folders (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO folders (name) VALUES ('work'), ('home');",
    )
    .unwrap();

    // a database whose WAL was left behind with no connection holding it
    let path = dir.path().join("db.sqlite3");
    let wal = dir.path().join("db.sqlite3-wal");
    fs::copy(&live, &path).unwrap();
    fs::copy(dir.path().join("live.sqlite3-wal"), &wal).unwrap();
    drop(conn);

    let main_before = fs::read(&path).unwrap();
    let wal_before = fs::read(&wal).unwrap();
    assert!(!wal_before.is_empty());

    let metrics = collect(&path, &Thresholds::default()).unwrap();
    assert_eq!(metrics.wal_size_bytes, wal_before.len() as u64);
    assert_eq!(metrics.table_count, 1);

    assert_eq!(fs::read(&path).unwrap(), main_before);
    assert_eq!(fs::read(&wal).unwrap(), wal_before);
}
