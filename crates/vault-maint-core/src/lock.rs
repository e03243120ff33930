use crate::error::Error;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_SUFFIX: &str = ".maint.lock";

/// Advisory lock keyed by database path, so only one maintenance run works
/// on a database at a time. The OS releases it when the holder exits, even
/// if the process is killed.
pub struct RunLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    pub fn for_database(db_path: &Path) -> Result<Self, Error> {
        let path = lock_path(db_path);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self {
            lock: RwLock::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without waiting; `AlreadyRunning` if another run holds it.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, Error> {
        let path = self.path.clone();
        let mut guard = match self.lock.try_write() {
            Ok(guard) => guard,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Err(Error::AlreadyRunning(path)),
            Err(e) => return Err(Error::Io(e)),
        };
        guard.set_len(0)?;
        guard.seek(SeekFrom::Start(0))?;
        writeln!(*guard, "{}", std::process::id())?;
        debug!("Acquired run lock {}", path.display());
        Ok(guard)
    }
}

pub fn lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push(LOCK_SUFFIX);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_run_is_refused_while_first_holds_lock() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("db.sqlite3");

        let mut first = RunLock::for_database(&db).unwrap();
        let guard = first.try_acquire().unwrap();

        let mut second = RunLock::for_database(&db).unwrap();
        assert!(matches!(second.try_acquire(), Err(Error::AlreadyRunning(_))));

        drop(guard);
        assert!(second.try_acquire().is_ok());
    }

    #[test]
    fn test_lock_file_sits_next_to_database() {
        let path = lock_path(Path::new("/data/db.sqlite3"));
        assert_eq!(path, PathBuf::from("/data/db.sqlite3.maint.lock"));
    }
}
