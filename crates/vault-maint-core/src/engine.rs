use crate::analyzer::{self, Analysis, Operation};
use crate::config::AppConfig;
use crate::error::Error;
use crate::executor::{Executor, Mode};
use crate::metrics::{self, DatabaseMetrics};
use crate::progress::ProgressReporter;
use crate::report::{
    CommandNotifier, LogNotifier, MaintenanceReport, Notifier, Reporter, RunStatus,
};
use crate::service::{DockerProbe, FixedProbe, ServiceProbe};
use std::cell::Cell;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// What a run should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Whatever the analyzer recommends for the current metrics.
    Analyzed,
    /// Every operation, ignoring the analyzer.
    Comprehensive,
    Single(Operation),
}

pub struct MaintenanceEngine {
    config: AppConfig,
    probe: Box<dyn ServiceProbe>,
    /// Service state seen in the current plan/execute cycle; cleared by `plan`.
    service_running: Cell<Option<bool>>,
}

impl MaintenanceEngine {
    pub fn new(config: AppConfig) -> Self {
        let probe: Box<dyn ServiceProbe> = if config.service.probe_enabled {
            Box::new(DockerProbe::new(&config.service.container_name))
        } else {
            Box::new(FixedProbe(false))
        };
        Self {
            config,
            probe,
            service_running: Cell::new(None),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn ServiceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_db_path(mut self, path: &str) -> Self {
        self.config.database_path = PathBuf::from(path);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Checks the service at most once per cycle, so the confirmation prompt and
    /// the executor's skip rule see the same answer.
    pub fn is_service_running(&self) -> bool {
        if let Some(running) = self.service_running.get() {
            return running;
        }
        let running = self.probe.is_service_running();
        self.service_running.set(Some(running));
        running
    }

    pub fn collect(&self, reporter: &dyn ProgressReporter) -> Result<DatabaseMetrics, Error> {
        reporter.on_collect_start();
        let metrics = metrics::collect(&self.config.database_path, &self.config.thresholds)?;
        reporter.on_collect_complete(&metrics);
        Ok(metrics)
    }

    /// Collect metrics and build the plan. Never mutates the database.
    pub fn plan(
        &self,
        plan: Plan,
        reporter: &dyn ProgressReporter,
    ) -> Result<(DatabaseMetrics, Analysis), Error> {
        self.service_running.set(None);
        let metrics = self.collect(reporter)?;
        let analysis = match plan {
            Plan::Analyzed => analyzer::analyze(&metrics, &self.config.thresholds),
            Plan::Comprehensive => Analysis::comprehensive(),
            Plan::Single(operation) => Analysis::single(operation),
        };

        if analysis.is_empty() {
            info!("No maintenance needed; database is well maintained");
        }
        for recommendation in &analysis.recommendations {
            debug!(
                "Planned {} ({}): {}",
                recommendation.operation,
                recommendation.priority.as_str(),
                recommendation.reason
            );
        }
        Ok((metrics, analysis))
    }

    /// Execute a plan built by [`plan`](Self::plan).
    pub fn execute(
        &self,
        metrics: DatabaseMetrics,
        analysis: &Analysis,
        mode: Mode,
        reporter: &dyn ProgressReporter,
    ) -> Result<MaintenanceReport, Error> {
        let executor = Executor::new(&self.config.database_path, &self.config.backup_dir, self)
            .with_progress(reporter);
        let mut report = executor.execute(analysis, mode)?;
        report.metrics = Some(metrics);
        Ok(report)
    }

    pub fn run(
        &self,
        plan: Plan,
        mode: Mode,
        reporter: &dyn ProgressReporter,
    ) -> Result<MaintenanceReport, Error> {
        let (metrics, analysis) = self.plan(plan, reporter)?;
        self.execute(metrics, &analysis, mode, reporter)
    }

    /// Store the report and drop reports past the retention window.
    pub fn record(&self, report: &MaintenanceReport) -> Result<PathBuf, Error> {
        let reporter = Reporter::new(&self.config.reports_dir);
        let path = reporter.record(report)?;
        match reporter.prune(self.config.report_retention_days) {
            Ok(0) => {}
            Ok(removed) => info!("Pruned {} expired reports", removed),
            Err(e) => warn!("Report retention cleanup failed: {}", e),
        }
        Ok(path)
    }

    /// Send the run outcome through the configured channel. Successful runs
    /// are only announced when `notify.on_success` is set.
    pub fn notify(&self, report: &MaintenanceReport) -> Result<(), Error> {
        if report.status == RunStatus::Success && !self.config.notify.on_success {
            return Ok(());
        }
        let notifier: Box<dyn Notifier> = match &self.config.notify.command {
            Some(command) => Box::new(CommandNotifier::new(command)),
            None => Box::new(LogNotifier),
        };
        Reporter::new(&self.config.reports_dir).notify(report, notifier.as_ref())
    }
}

impl ServiceProbe for MaintenanceEngine {
    fn is_service_running(&self) -> bool {
        MaintenanceEngine::is_service_running(self)
    }
}
