pub mod cron;
pub mod store;

pub use cron::CronSchedule;
pub use store::{CrontabStore, MemoryScheduleStore, ScheduleStore};

use crate::config::ScheduleConfig;
use crate::error::Error;
use crate::utils::timestamped_path;
use chrono::{Local, NaiveDateTime, Utc};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleStatus {
    pub active: bool,
    pub expression: Option<String>,
    pub next_run: Option<NaiveDateTime>,
    pub next_run_description: String,
}

/// Installs and removes the periodic unattended maintenance entry.
///
/// Validation happens before the store is touched, and the store's contents
/// are snapshotted to disk before every change.
pub struct Scheduler<S: ScheduleStore> {
    store: S,
    config: ScheduleConfig,
}

impl<S: ScheduleStore> Scheduler<S> {
    pub fn new(store: S, config: &ScheduleConfig) -> Self {
        Self {
            store,
            config: config.clone(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn install(&self, expression: &str) -> Result<CronSchedule, Error> {
        let schedule = CronSchedule::parse(expression)?;
        let entry = format!(
            "{} {} {}",
            schedule,
            self.config.command,
            store::marker_tag(&self.config.marker)
        );

        self.snapshot()?;
        self.store.upsert_entry(&self.config.marker, &entry)?;
        info!("Installed maintenance schedule: {}", entry);
        Ok(schedule)
    }

    pub fn remove(&self) -> Result<bool, Error> {
        self.snapshot()?;
        let removed = self.store.remove_entry(&self.config.marker)?;
        if removed {
            info!("Removed maintenance schedule ({})", self.config.marker);
        } else {
            info!("No maintenance schedule installed ({})", self.config.marker);
        }
        Ok(removed)
    }

    pub fn status(&self) -> Result<ScheduleStatus, Error> {
        self.status_at(Local::now().naive_local())
    }

    pub fn status_at(&self, now: NaiveDateTime) -> Result<ScheduleStatus, Error> {
        let entry = self
            .store
            .list_entries()?
            .into_iter()
            .find(|line| store::has_marker(line, &self.config.marker));

        let Some(entry) = entry else {
            return Ok(ScheduleStatus {
                active: false,
                expression: None,
                next_run: None,
                next_run_description: "not scheduled".to_string(),
            });
        };

        let expression = entry.split_whitespace().take(5).collect::<Vec<_>>().join(" ");
        let (next_run, next_run_description) = match CronSchedule::parse(&expression) {
            Ok(schedule) => (schedule.next_after(now), schedule.describe_next(now)),
            Err(_) => (None, format!("unrecognised entry '{}'", entry.trim())),
        };
        Ok(ScheduleStatus {
            active: true,
            expression: Some(expression),
            next_run,
            next_run_description,
        })
    }

    /// Copy the current store contents to `snapshot_dir/crontab-<timestamp>.txt`.
    fn snapshot(&self) -> Result<PathBuf, Error> {
        let lines = self.store.list_entries()?;
        fs::create_dir_all(&self.config.snapshot_dir)?;
        let path = timestamped_path(&self.config.snapshot_dir, "crontab-", "txt", Utc::now());
        let mut contents = lines.join("\n");
        contents.push('\n');
        fs::write(&path, contents)?;
        info!("Schedule store snapshot saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> ScheduleConfig {
        ScheduleConfig {
            marker: "vault-maint".to_string(),
            command: "/usr/local/bin/vault-maint --cron".to_string(),
            snapshot_dir: dir.join("snapshots"),
        }
    }

    fn snapshot_count(dir: &std::path::Path) -> usize {
        fs::read_dir(dir.join("snapshots"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_install_preserves_unrelated_entries() {
        let dir = tempdir().unwrap();
        let store = MemoryScheduleStore::new(vec!["15 * * * * /usr/bin/rotate-logs".to_string()]);
        let scheduler = Scheduler::new(store, &config(dir.path()));

        scheduler.install("0 3 * * 0").unwrap();
        assert_eq!(
            scheduler.store().lines(),
            vec![
                "15 * * * * /usr/bin/rotate-logs".to_string(),
                "0 3 * * 0 /usr/local/bin/vault-maint --cron # vault-maint".to_string(),
            ]
        );

        scheduler.install("30 2 * * *").unwrap();
        let lines = scheduler.store().lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("30 2 * * * "));
        assert_eq!(snapshot_count(dir.path()), 2);
    }

    #[test]
    fn test_invalid_schedule_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let original = vec!["15 * * * * /usr/bin/rotate-logs".to_string()];
        let scheduler = Scheduler::new(
            MemoryScheduleStore::new(original.clone()),
            &config(dir.path()),
        );

        let result = scheduler.install("60 3 * * 0");
        assert!(matches!(result, Err(Error::ScheduleValidation { .. })));
        assert_eq!(scheduler.store().lines(), original);
        assert_eq!(snapshot_count(dir.path()), 0);
    }

    #[test]
    fn test_snapshot_holds_previous_contents() {
        let dir = tempdir().unwrap();
        let original = vec!["15 * * * * /usr/bin/rotate-logs".to_string()];
        let scheduler = Scheduler::new(MemoryScheduleStore::new(original), &config(dir.path()));
        scheduler.install("0 3 * * 0").unwrap();

        let snapshot = fs::read_dir(dir.path().join("snapshots"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        assert_eq!(
            fs::read_to_string(snapshot).unwrap(),
            "15 * * * * /usr/bin/rotate-logs\n"
        );
    }

    #[test]
    fn test_status_and_remove() {
        let dir = tempdir().unwrap();
        let scheduler = Scheduler::new(MemoryScheduleStore::default(), &config(dir.path()));
        let now = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        assert!(!scheduler.status_at(now).unwrap().active);

        scheduler.install("0 3 * * 0").unwrap();
        let status = scheduler.status_at(now).unwrap();
        assert!(status.active);
        assert_eq!(status.expression.as_deref(), Some("0 3 * * 0"));
        assert!(status.next_run_description.starts_with("weekly on Sunday at 03:00"));
        assert_eq!(
            status.next_run,
            NaiveDate::from_ymd_opt(2026, 10, 25).and_then(|d| d.and_hms_opt(3, 0, 0))
        );

        assert!(scheduler.remove().unwrap());
        assert!(!scheduler.status_at(now).unwrap().active);
        assert!(!scheduler.remove().unwrap());
    }
}
