//! Logical SQL dump taken before any space reclaim.

use crate::error::Error;
use crate::utils::timestamped_path;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Dump the database to `backup_dir/<stem>-pre-reclaim-<timestamp>.sql`.
///
/// The dump is written under a temporary name and renamed once complete, so
/// a returned path always points at a whole backup. Any failure is reported
/// as `BackupFailure`.
pub fn create_backup(
    conn: &Connection,
    db_path: &Path,
    backup_dir: &Path,
) -> Result<PathBuf, Error> {
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    let target = timestamped_path(
        backup_dir,
        &format!("{}-pre-reclaim-", stem),
        "sql",
        chrono::Utc::now(),
    );
    let partial = target.with_extension("sql.partial");

    let result = fs::create_dir_all(backup_dir)
        .map_err(Error::from)
        .and_then(|_| dump_to(conn, &partial))
        .and_then(|bytes| {
            fs::rename(&partial, &target)?;
            Ok(bytes)
        });

    match result {
        Ok(bytes) if bytes > 0 => {
            info!("Backup written to {} ({} bytes)", target.display(), bytes);
            Ok(target)
        }
        Ok(_) => Err(Error::BackupFailure(format!(
            "{} is empty",
            target.display()
        ))),
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(Error::BackupFailure(e.to_string()))
        }
    }
}

fn dump_to(conn: &Connection, path: &Path) -> Result<u64, Error> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    dump_sql(conn, &mut out)?;
    out.flush()?;
    let bytes = out.get_ref().metadata()?.len();
    out.get_ref().sync_all()?;
    Ok(bytes)
}

/// Write schema and rows as SQL text that recreates the database when replayed.
/// Reads happen inside one transaction so the dump is a consistent snapshot.
pub fn dump_sql<W: Write>(conn: &Connection, out: &mut W) -> Result<(), Error> {
    let tx = conn.unchecked_transaction()?;

    writeln!(out, "PRAGMA foreign_keys=OFF;")?;
    writeln!(out, "BEGIN TRANSACTION;")?;

    let tables = schema_objects(
        &tx,
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'table' AND sql IS NOT NULL AND substr(name, 1, 7) <> 'sqlite_'",
    )?;
    for (name, sql) in &tables {
        writeln!(out, "{};", sql)?;
        if sql.trim_start().to_uppercase().starts_with("CREATE VIRTUAL TABLE") {
            continue;
        }
        let rows = dump_rows(&tx, name, out)?;
        debug!("Dumped {} rows from {}", rows, name);
    }

    let has_sequence: i64 = tx.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
        [],
        |row| row.get(0),
    )?;
    if has_sequence > 0 {
        writeln!(out, "DELETE FROM sqlite_sequence;")?;
        dump_rows(&tx, "sqlite_sequence", out)?;
    }

    let others = schema_objects(
        &tx,
        "SELECT name, sql FROM sqlite_master \
         WHERE type IN ('index', 'trigger', 'view') AND sql IS NOT NULL",
    )?;
    for (_, sql) in &others {
        writeln!(out, "{};", sql)?;
    }

    writeln!(out, "COMMIT;")?;
    Ok(())
}

fn schema_objects(conn: &Connection, query: &str) -> Result<Vec<(String, String)>, Error> {
    let mut stmt = conn.prepare(query)?;
    let objects = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<(String, String)>, _>>()?;
    Ok(objects)
}

fn dump_rows<W: Write>(conn: &Connection, table: &str, out: &mut W) -> Result<usize, Error> {
    let ident = quote_identifier(table);
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", ident))?;
    let columns = stmt.column_count();
    let mut rows = stmt.query([])?;
    let mut count = 0;

    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns);
        for i in 0..columns {
            values.push(sql_literal(row.get_ref(i)?));
        }
        writeln!(out, "INSERT INTO {} VALUES({});", ident, values.join(","))?;
        count += 1;
    }
    Ok(count)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) if f.is_infinite() => {
            if f > 0.0 {
                "1e999".to_string()
            } else {
                "-1e999".to_string()
            }
        }
        ValueRef::Real(f) => format!("{:?}", f),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => format!("'{}'", text.replace('\'', "''")),
            // keep the stored bytes exactly; a lossy decode would rewrite them
            Err(_) => format!("CAST({} AS TEXT)", hex_literal(bytes)),
        },
        ValueRef::Blob(bytes) => hex_literal(bytes),
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("X'{}'", hex)
}
