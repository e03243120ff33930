use rusqlite::{Connection, OpenFlags, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix SQLite appends to the database path for its write-ahead log.
pub const WAL_SUFFIX: &str = "-wal";

/// Connection to an existing vault database. Never creates the file and
/// never changes its journal mode.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)
    }

    /// Read-only handle for inspection. Closing it never checkpoints or
    /// removes the WAL, so the files on disk stay exactly as found.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        Self::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
    }

    fn open_with_flags(path: &Path, access: OpenFlags) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let db = Database {
            conn,
            path: path.to_path_buf(),
        };
        db.configure_pragmas()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        debug!("Opened {} (busy timeout 5s)", self.path.display());
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pragma_i64(&self, name: &str) -> Result<i64> {
        self.conn.pragma_query_value(None, name, |row| row.get(0))
    }

    pub fn journal_mode(&self) -> Result<String> {
        let mode: String = self
            .conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))?;
        Ok(mode.to_lowercase())
    }

    /// User tables, excluding SQLite's internal `sqlite_*` tables. `LIKE` would
    /// treat `_` as a wildcard and also drop names such as `sqlite1`.
    pub fn user_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND substr(name, 1, 7) <> 'sqlite_' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn has_statistics_table(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_stat1'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

pub fn wal_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push(WAL_SUFFIX);
    PathBuf::from(os)
}

/// Size of the sibling WAL file, zero when it does not exist.
pub fn wal_size(db_path: &Path) -> u64 {
    std::fs::metadata(wal_path(db_path))
        .map(|m| m.len())
        .unwrap_or(0)
}

pub fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}
