use crate::analyzer::{Operation, Recommendation};
use crate::error::Error;
use crate::executor::Mode;
use crate::metrics::DatabaseMetrics;
use crate::utils::{format_bytes, timestamped_path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const REPORT_PREFIX: &str = "maintenance-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation: Operation,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub detail: Option<String>,
    pub bytes_reclaimed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityResult {
    pub passed: bool,
    pub duration_ms: u64,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

/// Everything one maintenance run did, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub database_path: PathBuf,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall time of the run, stored so report consumers need not derive it.
    #[serde(default)]
    pub duration_ms: u64,
    pub metrics: Option<DatabaseMetrics>,
    pub recommendations: Vec<Recommendation>,
    pub pre_check: IntegrityResult,
    pub results: Vec<OperationResult>,
    pub post_check: Option<IntegrityResult>,
    pub backup_path: Option<PathBuf>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl MaintenanceReport {
    /// Failed when the pre-check, any operation, or the post-check failed.
    /// Skips never fail a run.
    pub fn compute_status(&self) -> RunStatus {
        let post_failed = self.post_check.as_ref().map_or(false, |c| !c.passed);
        let op_failed = self.results.iter().any(|r| r.outcome == Outcome::Failed);
        if !self.pre_check.passed || post_failed || op_failed {
            RunStatus::Failed
        } else {
            RunStatus::Success
        }
    }

    /// Stamp the end of the run: finish time, duration and status.
    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = at;
        self.duration_ms = self.duration().as_millis() as u64;
        self.status = self.compute_status();
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn counts(&self) -> ReportCounts {
        let mut counts = ReportCounts {
            total: self.results.len(),
            ..Default::default()
        };
        for result in &self.results {
            match result.outcome {
                Outcome::Success => counts.succeeded += 1,
                Outcome::Failed => counts.failed += 1,
                Outcome::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn bytes_reclaimed(&self) -> u64 {
        self.results.iter().filter_map(|r| r.bytes_reclaimed).sum()
    }

    pub fn result_for(&self, operation: Operation) -> Option<&OperationResult> {
        self.results.iter().find(|r| r.operation == operation)
    }
}

/// Delivery channel for run outcomes (mail, webhook, ...). The reporter
/// only packages the status and message.
pub trait Notifier {
    fn notify(&self, status: RunStatus, message: &str) -> Result<(), Error>;
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, status: RunStatus, message: &str) -> Result<(), Error> {
        match status {
            RunStatus::Success => info!("{}", message),
            RunStatus::Failed => warn!("{}", message),
        }
        Ok(())
    }
}

/// Runs an external command with the status and message as its two arguments.
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, status: RunStatus, message: &str) -> Result<(), Error> {
        let output = Command::new(&self.command)
            .arg(status.as_str())
            .arg(message)
            .output()?;
        if !output.status.success() {
            return Err(Error::Other(format!(
                "notification command '{}' exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("Notification sent via {}", self.command);
        Ok(())
    }
}

/// Stores run reports and renders them for people.
pub struct Reporter {
    reports_dir: PathBuf,
}

impl Reporter {
    pub fn new(reports_dir: &Path) -> Self {
        Self {
            reports_dir: reports_dir.to_path_buf(),
        }
    }

    /// Write the report as JSON to `maintenance-<timestamp>.json`.
    pub fn record(&self, report: &MaintenanceReport) -> Result<PathBuf, Error> {
        fs::create_dir_all(&self.reports_dir)?;
        let path = timestamped_path(&self.reports_dir, REPORT_PREFIX, "json", report.started_at);
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)?;
        info!("Report written to {}", path.display());
        Ok(path)
    }

    /// Delete report files older than `retention_days`. Returns how many went.
    pub fn prune(&self, retention_days: u32) -> Result<usize, Error> {
        let max_age = Duration::from_secs(u64::from(retention_days) * 86_400);
        self.prune_older_than(max_age, SystemTime::now())
    }

    pub fn prune_older_than(&self, max_age: Duration, now: SystemTime) -> Result<usize, Error> {
        let pattern = self
            .reports_dir
            .join(format!("{}*.json", REPORT_PREFIX))
            .to_string_lossy()
            .into_owned();
        let entries = glob::glob(&pattern)
            .map_err(|e| Error::Other(format!("invalid report pattern: {}", e)))?;

        let mut removed = 0;
        for path in entries.flatten() {
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("Cannot read age of {}: {}", path.display(), e);
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                fs::remove_file(&path)?;
                debug!("Pruned report {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn summarize(&self, report: &MaintenanceReport) -> String {
        let counts = report.counts();
        let mut text = String::new();
        let _ = writeln!(
            text,
            "SQLite maintenance {} for {}",
            report.status.as_str().to_uppercase(),
            report.database_path.display()
        );
        let _ = writeln!(
            text,
            "Mode: {}, duration: {:.2}s",
            report.mode.as_str(),
            report.duration().as_secs_f64()
        );
        let _ = writeln!(
            text,
            "Integrity before: {}",
            check_label(Some(&report.pre_check))
        );

        if report.results.is_empty() && report.pre_check.passed {
            let _ = writeln!(text, "No maintenance needed; database is well maintained.");
        }
        for result in &report.results {
            let _ = write!(
                text,
                "  {:<18} {:<7} {:>6} ms",
                result.operation.as_str(),
                result.outcome.as_str(),
                result.duration_ms
            );
            if let Some(detail) = &result.detail {
                let _ = write!(text, "  {}", detail);
            }
            let _ = writeln!(text);
        }

        let _ = writeln!(
            text,
            "Integrity after: {}",
            check_label(report.post_check.as_ref())
        );
        let _ = writeln!(
            text,
            "Operations: {} total, {} succeeded, {} failed, {} skipped",
            counts.total, counts.succeeded, counts.failed, counts.skipped
        );
        if report.bytes_reclaimed() > 0 {
            let _ = writeln!(text, "Space reclaimed: {}", format_bytes(report.bytes_reclaimed()));
        }
        if let Some(backup) = &report.backup_path {
            let _ = writeln!(text, "Backup: {}", backup.display());
        }
        text
    }

    /// One-line message for notification channels.
    pub fn notification_message(&self, report: &MaintenanceReport) -> String {
        let counts = report.counts();
        format!(
            "SQLite maintenance {}: {} operations ({} succeeded, {} failed, {} skipped) in {:.1}s",
            report.status.as_str(),
            counts.total,
            counts.succeeded,
            counts.failed,
            counts.skipped,
            report.duration().as_secs_f64()
        )
    }

    pub fn notify(&self, report: &MaintenanceReport, notifier: &dyn Notifier) -> Result<(), Error> {
        notifier.notify(report.status, &self.notification_message(report))
    }
}

fn check_label(check: Option<&IntegrityResult>) -> String {
    match check {
        None => "not run".to_string(),
        Some(c) if c.passed => "ok".to_string(),
        Some(c) => format!("FAILED ({})", c.detail.as_deref().unwrap_or("unknown")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn result(operation: Operation, outcome: Outcome) -> OperationResult {
        OperationResult {
            operation,
            outcome,
            duration_ms: 5,
            detail: None,
            bytes_reclaimed: None,
        }
    }

    fn passed() -> IntegrityResult {
        IntegrityResult {
            passed: true,
            duration_ms: 1,
            detail: None,
        }
    }

    fn report(results: Vec<OperationResult>) -> MaintenanceReport {
        let now = Utc::now();
        let mut report = MaintenanceReport {
            database_path: PathBuf::from("/data/db.sqlite3"),
            mode: Mode::Unattended,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            metrics: None,
            recommendations: vec![],
            pre_check: passed(),
            results,
            post_check: Some(passed()),
            backup_path: None,
            status: RunStatus::Success,
        };
        report.status = report.compute_status();
        report
    }

    struct Recording(RefCell<Vec<(RunStatus, String)>>);

    impl Notifier for Recording {
        fn notify(&self, status: RunStatus, message: &str) -> Result<(), Error> {
            self.0.borrow_mut().push((status, message.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_skips_do_not_fail_a_run() {
        let r = report(vec![
            result(Operation::WalCheckpoint, Outcome::Skipped),
            result(Operation::ReclaimSpace, Outcome::Skipped),
        ]);
        assert_eq!(r.status, RunStatus::Success);
    }

    #[test]
    fn test_any_failure_fails_the_run() {
        let r = report(vec![
            result(Operation::StatisticsRefresh, Outcome::Success),
            result(Operation::OptimizerHint, Outcome::Failed),
        ]);
        assert_eq!(r.status, RunStatus::Failed);

        let mut r = report(vec![]);
        r.post_check = Some(IntegrityResult {
            passed: false,
            duration_ms: 1,
            detail: Some("row missing from index".into()),
        });
        assert_eq!(r.compute_status(), RunStatus::Failed);
    }

    #[test]
    fn test_finish_stores_duration_in_json() {
        let mut r = report(vec![result(Operation::OptimizerHint, Outcome::Failed)]);
        r.status = RunStatus::Success;
        r.finish(r.started_at + chrono::Duration::milliseconds(1250));

        assert_eq!(r.duration_ms, 1250);
        assert_eq!(r.status, RunStatus::Failed);
        let json: serde_json::Value = serde_json::to_value(&r).unwrap();
        assert_eq!(json["duration_ms"], 1250);
    }

    #[test]
    fn test_counts() {
        let r = report(vec![
            result(Operation::WalCheckpoint, Outcome::Success),
            result(Operation::StatisticsRefresh, Outcome::Success),
            result(Operation::ReclaimSpace, Outcome::Skipped),
            result(Operation::OptimizerHint, Outcome::Failed),
        ]);
        assert_eq!(
            r.counts(),
            ReportCounts {
                total: 4,
                succeeded: 2,
                failed: 1,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_empty_run_summarizes_as_well_maintained() {
        let reporter = Reporter::new(Path::new("reports"));
        let text = reporter.summarize(&report(vec![]));
        assert!(text.contains("SUCCESS"));
        assert!(text.contains("well maintained"));
    }

    #[test]
    fn test_notify_hands_status_and_counts_to_collaborator() {
        let reporter = Reporter::new(Path::new("reports"));
        let notifier = Recording(RefCell::new(Vec::new()));
        let r = report(vec![result(Operation::OptimizerHint, Outcome::Failed)]);

        reporter.notify(&r, &notifier).unwrap();
        let sent = notifier.0.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, RunStatus::Failed);
        assert!(sent[0].1.contains("1 failed"));
    }
}
