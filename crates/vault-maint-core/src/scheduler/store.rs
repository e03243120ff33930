use crate::error::Error;
use std::cell::RefCell;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// The external table of scheduled entries (a crontab). Entries owned by
/// this tool end with `# <marker>`; everything else is left alone.
pub trait ScheduleStore {
    fn list_entries(&self) -> Result<Vec<String>, Error>;
    fn upsert_entry(&self, marker: &str, entry: &str) -> Result<(), Error>;
    /// Returns whether an entry was present.
    fn remove_entry(&self, marker: &str) -> Result<bool, Error>;
}

pub fn marker_tag(marker: &str) -> String {
    format!("# {}", marker)
}

pub fn has_marker(line: &str, marker: &str) -> bool {
    line.trim_end().ends_with(&marker_tag(marker))
}

/// Replace the marked entry (or append it), keeping every other line in place.
pub fn upsert_lines(lines: &[String], marker: &str, entry: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len() + 1);
    let mut replaced = false;
    for line in lines {
        if has_marker(line, marker) {
            if !replaced {
                out.push(entry.to_string());
                replaced = true;
            }
        } else {
            out.push(line.clone());
        }
    }
    if !replaced {
        out.push(entry.to_string());
    }
    out
}

pub fn remove_lines(lines: &[String], marker: &str) -> (Vec<String>, bool) {
    let kept: Vec<String> = lines
        .iter()
        .filter(|line| !has_marker(line, marker))
        .cloned()
        .collect();
    let removed = kept.len() != lines.len();
    (kept, removed)
}

/// The invoking user's crontab, edited through the `crontab` command.
pub struct CrontabStore {
    program: String,
}

impl CrontabStore {
    pub fn new() -> Self {
        Self {
            program: "crontab".to_string(),
        }
    }

    fn write_all(&self, lines: &[String]) -> Result<(), Error> {
        let mut child = Command::new(&self.program)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            for line in lines {
                writeln!(stdin, "{}", line)?;
            }
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(Error::Other(format!(
                "{} - exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("Installed {} crontab lines", lines.len());
        Ok(())
    }
}

impl Default for CrontabStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleStore for CrontabStore {
    fn list_entries(&self) -> Result<Vec<String>, Error> {
        let output = Command::new(&self.program).arg("-l").output()?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::to_string)
                .collect());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab") {
            Ok(Vec::new())
        } else {
            Err(Error::Other(format!(
                "{} -l exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )))
        }
    }

    fn upsert_entry(&self, marker: &str, entry: &str) -> Result<(), Error> {
        let lines = self.list_entries()?;
        self.write_all(&upsert_lines(&lines, marker, entry))
    }

    fn remove_entry(&self, marker: &str) -> Result<bool, Error> {
        let lines = self.list_entries()?;
        let (kept, removed) = remove_lines(&lines, marker);
        if removed {
            self.write_all(&kept)?;
        }
        Ok(removed)
    }
}

/// In-process store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    lines: RefCell<Vec<String>>,
}

impl MemoryScheduleStore {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: RefCell::new(lines),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn list_entries(&self) -> Result<Vec<String>, Error> {
        Ok(self.lines())
    }

    fn upsert_entry(&self, marker: &str, entry: &str) -> Result<(), Error> {
        let updated = upsert_lines(&self.lines.borrow(), marker, entry);
        *self.lines.borrow_mut() = updated;
        Ok(())
    }

    fn remove_entry(&self, marker: &str) -> Result<bool, Error> {
        let (kept, removed) = remove_lines(&self.lines.borrow(), marker);
        *self.lines.borrow_mut() = kept;
        Ok(removed)
    }
}
