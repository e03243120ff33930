//! SQLite's built-in maintenance primitives.

use crate::error::Error;
use rusqlite::{Connection, Result};
use tracing::debug;

/// Run `PRAGMA integrity_check`; any row other than a single "ok" is a failure.
pub fn integrity_check(conn: &Connection) -> std::result::Result<(), Error> {
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let messages = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>>>()?;

    if messages.len() == 1 && messages[0] == "ok" {
        Ok(())
    } else {
        let mut problems = messages;
        problems.truncate(10);
        Err(Error::IntegrityFailure(problems.join("; ")))
    }
}

/// Frames reported by `PRAGMA wal_checkpoint`.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointStatus {
    pub busy: bool,
    pub log_frames: i64,
    pub checkpointed_frames: i64,
}

/// Merge the WAL into the main file and truncate it to zero bytes.
pub fn wal_checkpoint_truncate(conn: &Connection) -> Result<CheckpointStatus> {
    let status = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
        Ok(CheckpointStatus {
            busy: row.get::<_, i64>(0)? != 0,
            log_frames: row.get(1)?,
            checkpointed_frames: row.get(2)?,
        })
    })?;
    debug!(
        "wal_checkpoint(TRUNCATE): busy={} log={} checkpointed={}",
        status.busy, status.log_frames, status.checkpointed_frames
    );
    Ok(status)
}

pub fn analyze_all(conn: &Connection) -> Result<()> {
    conn.execute_batch("ANALYZE")
}

pub fn analyze_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!("ANALYZE \"{}\"", table.replace('"', "\"\"")))
}

pub fn vacuum(conn: &Connection) -> Result<()> {
    conn.execute_batch("VACUUM")
}

pub fn optimize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA optimize")
}
