use crate::analyzer::Recommendation;
use crate::metrics::DatabaseMetrics;
use crate::report::{IntegrityResult, OperationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    Before,
    After,
}

/// Trait for reporting maintenance progress.
///
/// CLI implements with indicatif spinners; unattended runs use `SilentReporter`.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_collect_start(&self) {}
    fn on_collect_complete(&self, _metrics: &DatabaseMetrics) {}
    fn on_integrity_start(&self, _phase: CheckPhase) {}
    fn on_integrity_complete(&self, _phase: CheckPhase, _result: &IntegrityResult) {}
    fn on_operation_start(&self, _recommendation: &Recommendation) {}
    fn on_operation_complete(&self, _result: &OperationResult) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
