pub mod operations;

use crate::analyzer::{Analysis, Operation, Recommendation};
use crate::backup;
use crate::database::{self, Database};
use crate::error::Error;
use crate::lock::RunLock;
use crate::progress::{CheckPhase, ProgressReporter, SilentReporter};
use crate::report::{IntegrityResult, MaintenanceReport, OperationResult, Outcome, RunStatus};
use crate::service::ServiceProbe;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Interactive,
    /// Triggered by the scheduler; never takes locks that would stall a live service.
    Unattended,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Interactive => "interactive",
            Mode::Unattended => "unattended",
        }
    }
}

enum Step {
    Done {
        detail: Option<String>,
        bytes_reclaimed: Option<u64>,
    },
    Skipped(String),
}

impl Step {
    fn done(detail: impl Into<String>) -> Self {
        Step::Done {
            detail: Some(detail.into()),
            bytes_reclaimed: None,
        }
    }
}

/// Runs a plan against one database: integrity check, operations in fixed
/// order, integrity check again.
pub struct Executor<'a> {
    db_path: PathBuf,
    backup_dir: PathBuf,
    probe: &'a dyn ServiceProbe,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Executor<'a> {
    pub fn new(db_path: &Path, backup_dir: &Path, probe: &'a dyn ServiceProbe) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            backup_dir: backup_dir.to_path_buf(),
            probe,
            progress: &SilentReporter,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Execute the plan and return the run's report.
    ///
    /// Errors are reserved for runs that never started: missing database,
    /// unopenable database, or another run holding the lock. A failed
    /// integrity check is reported, not returned.
    pub fn execute(&self, analysis: &Analysis, mode: Mode) -> Result<MaintenanceReport, Error> {
        if !self.db_path.is_file() {
            return Err(Error::NotFound(self.db_path.clone()));
        }

        let mut lock = RunLock::for_database(&self.db_path)?;
        let _guard = lock.try_acquire()?;

        let started_at = Utc::now();
        let db = Database::open(&self.db_path).map_err(|source| Error::Inaccessible {
            path: self.db_path.clone(),
            source,
        })?;
        info!(
            "Starting {} maintenance of {} ({} operations planned)",
            mode.as_str(),
            self.db_path.display(),
            analysis.recommendations.len()
        );

        let pre_check = self.check_integrity(&db, CheckPhase::Before);
        let mut report = MaintenanceReport {
            database_path: self.db_path.clone(),
            mode,
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            metrics: None,
            recommendations: analysis.recommendations.clone(),
            pre_check,
            results: Vec::new(),
            post_check: None,
            backup_path: None,
            status: RunStatus::Success,
        };

        if !report.pre_check.passed {
            error!("Pre-flight integrity check failed; no operations attempted");
            report.finish(Utc::now());
            return Ok(report);
        }

        let mut plan: Vec<&Recommendation> = analysis.recommendations.iter().collect();
        plan.sort_by_key(|r| r.operation);
        plan.dedup_by_key(|r| r.operation);

        for recommendation in plan {
            self.progress.on_operation_start(recommendation);
            let result = self.run_operation(&db, recommendation, mode, &mut report.backup_path);
            self.progress.on_operation_complete(&result);
            report.results.push(result);
        }

        report.post_check = Some(self.check_integrity(&db, CheckPhase::After));
        report.finish(Utc::now());
        info!(
            "Maintenance finished: {} in {:.2}s",
            report.status.as_str(),
            report.duration().as_secs_f64()
        );
        Ok(report)
    }

    fn check_integrity(&self, db: &Database, phase: CheckPhase) -> IntegrityResult {
        self.progress.on_integrity_start(phase);
        let start = Instant::now();
        let outcome = operations::integrity_check(db.connection());
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(()) => IntegrityResult {
                passed: true,
                duration_ms,
                detail: None,
            },
            Err(e) => {
                error!("Integrity check ({:?}) failed: {}", phase, e);
                IntegrityResult {
                    passed: false,
                    duration_ms,
                    detail: Some(e.to_string()),
                }
            }
        };
        self.progress.on_integrity_complete(phase, &result);
        result
    }

    fn run_operation(
        &self,
        db: &Database,
        recommendation: &Recommendation,
        mode: Mode,
        backup_path: &mut Option<PathBuf>,
    ) -> OperationResult {
        let operation = recommendation.operation;
        info!("{}: {}", operation, recommendation.reason);

        let start = Instant::now();
        let step = match operation {
            Operation::WalCheckpoint => self.checkpoint(db),
            Operation::StatisticsRefresh => operations::analyze_all(db.connection())
                .map(|_| Step::done("statistics refreshed"))
                .map_err(Error::from),
            Operation::TableStatistics => self.table_statistics(db),
            Operation::ReclaimSpace => self.reclaim_space(db, mode, backup_path),
            Operation::OptimizerHint => operations::optimize(db.connection())
                .map(|_| Step::done("optimizer pass complete"))
                .map_err(Error::from),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        match step {
            Ok(Step::Done {
                detail,
                bytes_reclaimed,
            }) => {
                info!("{} succeeded in {} ms", operation, duration_ms);
                OperationResult {
                    operation,
                    outcome: Outcome::Success,
                    duration_ms,
                    detail,
                    bytes_reclaimed,
                }
            }
            Ok(Step::Skipped(reason)) => {
                warn!("{} skipped: {}", operation, reason);
                OperationResult {
                    operation,
                    outcome: Outcome::Skipped,
                    duration_ms,
                    detail: Some(reason),
                    bytes_reclaimed: None,
                }
            }
            Err(e) => {
                error!("{} failed: {}", operation, e);
                OperationResult {
                    operation,
                    outcome: Outcome::Failed,
                    duration_ms,
                    detail: Some(e.to_string()),
                    bytes_reclaimed: None,
                }
            }
        }
    }

    fn checkpoint(&self, db: &Database) -> Result<Step, Error> {
        let journal_mode = db.journal_mode()?;
        if journal_mode != "wal" {
            return Ok(Step::Skipped(format!(
                "journal mode is {}, not WAL",
                journal_mode
            )));
        }
        if !database::wal_path(db.path()).exists() {
            return Ok(Step::Skipped("no WAL file present".to_string()));
        }

        let before = database::wal_size(db.path());
        let status = operations::wal_checkpoint_truncate(db.connection())?;
        if status.busy {
            return Err(Error::OperationFailure {
                operation: Operation::WalCheckpoint.to_string(),
                message: "checkpoint could not finish while other connections were reading"
                    .to_string(),
            });
        }
        let after = database::wal_size(db.path());

        Ok(Step::Done {
            detail: Some(format!("WAL {} -> {} bytes", before, after)),
            bytes_reclaimed: Some(before.saturating_sub(after)),
        })
    }

    fn table_statistics(&self, db: &Database) -> Result<Step, Error> {
        let tables = db.user_tables()?;
        for table in &tables {
            operations::analyze_table(db.connection(), table)?;
        }
        Ok(Step::done(format!("{} tables analyzed", tables.len())))
    }

    fn reclaim_space(
        &self,
        db: &Database,
        mode: Mode,
        backup_path: &mut Option<PathBuf>,
    ) -> Result<Step, Error> {
        if self.probe.is_service_running() {
            match mode {
                Mode::Unattended => return Ok(Step::Skipped("service running".to_string())),
                Mode::Interactive => warn!(
                    "Vault service is running; reclaiming space holds an exclusive lock until it finishes"
                ),
            }
        }

        let backup = match backup::create_backup(db.connection(), db.path(), &self.backup_dir) {
            Ok(path) => path,
            Err(e) => {
                return Ok(Step::Skipped(format!(
                    "{}; reclaim not attempted without a backup",
                    e
                )))
            }
        };
        *backup_path = Some(backup.clone());

        let before = database::file_size(db.path())?;
        operations::vacuum(db.connection())?;
        // In WAL mode the rewritten pages land in the WAL first.
        if db.journal_mode()? == "wal" {
            let status = operations::wal_checkpoint_truncate(db.connection())?;
            if status.busy {
                warn!("Post-reclaim checkpoint was blocked; file size may shrink later");
            }
        }
        let after = database::file_size(db.path())?;

        Ok(Step::Done {
            detail: Some(format!(
                "{} -> {} bytes (backup {})",
                before,
                after,
                backup.display()
            )),
            bytes_reclaimed: Some(before.saturating_sub(after)),
        })
    }
}
