//! Decision engine: turns a metrics snapshot into an ordered maintenance plan.
//!
//! Every rule is evaluated independently against the thresholds; all rules
//! that match contribute. `analyze` does no I/O and keeps no state, so the
//! same inputs always produce the same plan.

use crate::config::Thresholds;
use crate::metrics::{DatabaseMetrics, StatisticsFreshness};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maintenance primitives, declared in the order they always execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    WalCheckpoint,
    StatisticsRefresh,
    TableStatistics,
    ReclaimSpace,
    OptimizerHint,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::WalCheckpoint,
        Operation::StatisticsRefresh,
        Operation::TableStatistics,
        Operation::ReclaimSpace,
        Operation::OptimizerHint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::WalCheckpoint => "WAL_CHECKPOINT",
            Operation::StatisticsRefresh => "STATISTICS_REFRESH",
            Operation::TableStatistics => "TABLE_STATISTICS",
            Operation::ReclaimSpace => "RECLAIM_SPACE",
            Operation::OptimizerHint => "OPTIMIZER_HINT",
        }
    }

    /// Takes an exclusive lock and rewrites the whole file.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Operation::ReclaimSpace)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown operation '{0}' (expected one of: checkpoint, analyze, table_statistics, vacuum, optimize)")]
pub struct ParseOperationError(String);

impl FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "wal_checkpoint" | "checkpoint" | "wal" => Ok(Operation::WalCheckpoint),
            "statistics_refresh" | "analyze" | "statistics" => Ok(Operation::StatisticsRefresh),
            "table_statistics" | "table_analyze" => Ok(Operation::TableStatistics),
            "reclaim_space" | "vacuum" | "reclaim" => Ok(Operation::ReclaimSpace),
            "optimizer_hint" | "optimize" => Ok(Operation::OptimizerHint),
            _ => Err(ParseOperationError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub operation: Operation,
    pub priority: Priority,
    pub reason: String,
}

impl Recommendation {
    pub fn new(operation: Operation, priority: Priority, reason: impl Into<String>) -> Self {
        Self {
            operation,
            priority,
            reason: reason.into(),
        }
    }
}

/// The plan for one run, kept in execution order with at most one entry per operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub recommendations: Vec<Recommendation>,
}

impl Analysis {
    pub fn new(mut recommendations: Vec<Recommendation>) -> Self {
        recommendations.sort_by_key(|r| r.operation);
        recommendations.dedup_by_key(|r| r.operation);
        Self { recommendations }
    }

    /// Every operation, regardless of metrics.
    pub fn comprehensive() -> Self {
        Self::new(
            Operation::ALL
                .iter()
                .map(|op| {
                    Recommendation::new(
                        *op,
                        Priority::Normal,
                        "comprehensive maintenance requested",
                    )
                })
                .collect(),
        )
    }

    pub fn single(operation: Operation) -> Self {
        Self::new(vec![Recommendation::new(
            operation,
            Priority::Normal,
            "operation requested explicitly",
        )])
    }

    /// An empty plan means the database is well maintained.
    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }

    pub fn contains(&self, operation: Operation) -> bool {
        self.recommendations.iter().any(|r| r.operation == operation)
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.recommendations.iter().map(|r| r.operation).collect()
    }

    pub fn reasons(&self) -> Vec<&str> {
        self.recommendations.iter().map(|r| r.reason.as_str()).collect()
    }

    pub fn without(mut self, operation: Operation) -> Self {
        self.recommendations.retain(|r| r.operation != operation);
        self
    }
}

pub fn analyze(metrics: &DatabaseMetrics, thresholds: &Thresholds) -> Analysis {
    let mut recommendations = Vec::new();
    let db_mb = metrics.file_size_mb();
    let wal_mb = metrics.wal_size_mb();

    // Statistics
    let stats_reason = match metrics.statistics_freshness {
        StatisticsFreshness::Missing => Some("query planner statistics are missing".to_string()),
        StatisticsFreshness::Stale => Some(format!(
            "query planner statistics are stale (database unchanged for over {} days)",
            thresholds.statistics.stale_days
        )),
        StatisticsFreshness::Moderate if db_mb > thresholds.size.sizeable_mb => Some(format!(
            "statistics are aging on a {:.1} MB database",
            db_mb
        )),
        _ => None,
    };
    if let Some(reason) = stats_reason {
        recommendations.push(Recommendation::new(
            Operation::StatisticsRefresh,
            Priority::Normal,
            reason,
        ));
    }

    let stats_outdated = matches!(
        metrics.statistics_freshness,
        StatisticsFreshness::Missing | StatisticsFreshness::Stale
    );
    if metrics.table_count > 3 && stats_outdated {
        recommendations.push(Recommendation::new(
            Operation::TableStatistics,
            Priority::Normal,
            format!(
                "{} tables with {} statistics",
                metrics.table_count,
                metrics.statistics_freshness.as_str()
            ),
        ));
    }

    // WAL
    if wal_mb > thresholds.wal.critical_mb {
        recommendations.push(Recommendation::new(
            Operation::WalCheckpoint,
            Priority::High,
            format!("large WAL ({:.1} MB) needs merging", wal_mb),
        ));
    } else if wal_mb > thresholds.wal.warning_mb && db_mb < thresholds.size.large_mb {
        recommendations.push(Recommendation::new(
            Operation::WalCheckpoint,
            Priority::Normal,
            format!(
                "WAL ({:.1} MB) is significant relative to database size ({:.1} MB)",
                wal_mb, db_mb
            ),
        ));
    }

    // Space reclaim
    if let Some(reclaim) = reclaim_recommendation(metrics, thresholds) {
        let checkpoint_planned = recommendations
            .iter()
            .any(|r| r.operation == Operation::WalCheckpoint);
        if !checkpoint_planned && wal_mb > thresholds.wal.trivial_mb {
            recommendations.push(Recommendation::new(
                Operation::WalCheckpoint,
                Priority::Normal,
                format!("WAL ({:.1} MB) must be merged before reclaiming space", wal_mb),
            ));
        }
        recommendations.push(reclaim);
    }

    // Optimizer
    if metrics.statistics_freshness != StatisticsFreshness::Missing
        && db_mb > thresholds.size.minimal_mb
    {
        recommendations.push(Recommendation::new(
            Operation::OptimizerHint,
            Priority::Low,
            "routine planner optimization pass",
        ));
    }

    Analysis::new(recommendations)
}

/// All space rules are checked; the single recommendation carries the
/// highest tier that fired and every matching reason in rule order.
fn reclaim_recommendation(
    metrics: &DatabaseMetrics,
    thresholds: &Thresholds,
) -> Option<Recommendation> {
    let ratio = metrics.fragmentation_ratio;
    let freelist = metrics.freelist_percent;
    let db_mb = metrics.file_size_mb();
    let mut triggers: Vec<(Priority, String)> = Vec::new();

    if ratio > thresholds.fragmentation.critical {
        triggers.push((
            Priority::High,
            format!(
                "fragmentation ratio {:.2} exceeds critical {:.2}",
                ratio, thresholds.fragmentation.critical
            ),
        ));
    }
    if ratio > thresholds.fragmentation.warning && freelist > thresholds.freelist_percent.warning {
        triggers.push((
            Priority::Normal,
            format!(
                "fragmentation ratio {:.2} with {:.1}% free pages",
                ratio, freelist
            ),
        ));
    }
    if db_mb > thresholds.size.huge_mb && ratio > thresholds.size.huge_fragmentation_ratio {
        triggers.push((
            Priority::Normal,
            format!(
                "{:.0} MB database with fragmentation ratio {:.2}",
                db_mb, ratio
            ),
        ));
    }
    if freelist > thresholds.freelist_percent.critical {
        triggers.push((
            Priority::Normal,
            format!(
                "{:.1}% free pages exceeds critical {:.1}%",
                freelist, thresholds.freelist_percent.critical
            ),
        ));
    }

    let priority = triggers.iter().map(|(p, _)| *p).max()?;
    let reason = triggers
        .into_iter()
        .map(|(_, reason)| reason)
        .collect::<Vec<_>>()
        .join("; ");
    Some(Recommendation::new(Operation::ReclaimSpace, priority, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: f64 = 1024.0 * 1024.0;

    /// Metrics with directly chosen ratios, on a 512 KB database.
    fn metrics(
        ratio: f64,
        freelist_pct: f64,
        wal_mb: f64,
        stats: StatisticsFreshness,
    ) -> DatabaseMetrics {
        let mut m = DatabaseMetrics::from_raw(512 * 1024, 128, 4096, 0, 0, 2, "wal", stats);
        m.fragmentation_ratio = ratio;
        m.freelist_percent = freelist_pct;
        m.wal_size_bytes = (wal_mb * MB) as u64;
        m
    }

    #[test]
    fn test_critical_fragmentation_yields_high_priority_reclaim_only() {
        let m = metrics(1.6, 5.0, 0.2, StatisticsFreshness::Fresh);
        let analysis = analyze(&m, &Thresholds::default());
        assert_eq!(analysis.operations(), vec![Operation::ReclaimSpace]);
        assert_eq!(analysis.recommendations[0].priority, Priority::High);
    }

    #[test]
    fn test_large_wal_yields_checkpoint_only() {
        let m = metrics(1.0, 2.0, 12.0, StatisticsFreshness::Fresh);
        let analysis = analyze(&m, &Thresholds::default());
        assert_eq!(analysis.operations(), vec![Operation::WalCheckpoint]);
        assert_eq!(analysis.recommendations[0].priority, Priority::High);
        assert!(analysis.reasons()[0].contains("needs merging"));
    }

    #[test]
    fn test_well_maintained_database_needs_nothing() {
        let m = metrics(1.0, 0.0, 0.0, StatisticsFreshness::Fresh);
        assert!(analyze(&m, &Thresholds::default()).is_empty());
    }

    #[test]
    fn test_analyze_is_pure() {
        let t = Thresholds::default();
        let m = metrics(1.45, 30.0, 7.0, StatisticsFreshness::Stale);
        assert_eq!(analyze(&m, &t), analyze(&m, &t));
    }

    #[test]
    fn test_missing_statistics_with_many_tables() {
        let mut m = metrics(1.0, 0.0, 0.0, StatisticsFreshness::Missing);
        m.table_count = 6;
        let analysis = analyze(&m, &Thresholds::default());
        assert_eq!(
            analysis.operations(),
            vec![Operation::StatisticsRefresh, Operation::TableStatistics]
        );
    }

    #[test]
    fn test_moderate_statistics_only_refreshed_on_sizeable_database() {
        let t = Thresholds::default();
        let small = metrics(1.0, 0.0, 0.0, StatisticsFreshness::Moderate);
        assert!(!analyze(&small, &t).contains(Operation::StatisticsRefresh));

        let mut big = small.clone();
        big.file_size_bytes = (50.0 * MB) as u64;
        let analysis = analyze(&big, &t);
        assert!(analysis.contains(Operation::StatisticsRefresh));
        assert!(analysis.contains(Operation::OptimizerHint));
        assert!(!analysis.contains(Operation::TableStatistics));
    }

    #[test]
    fn test_wal_warning_ignored_on_large_database() {
        let t = Thresholds::default();
        let mut m = metrics(1.0, 0.0, 6.0, StatisticsFreshness::Fresh);
        assert!(analyze(&m, &t).contains(Operation::WalCheckpoint));

        m.file_size_bytes = (200.0 * MB) as u64;
        assert!(!analyze(&m, &t).contains(Operation::WalCheckpoint));
    }

    #[test]
    fn test_reclaim_tiers() {
        let t = Thresholds::default();

        let warning_pair = metrics(1.35, 12.0, 0.0, StatisticsFreshness::Fresh);
        let rec = &analyze(&warning_pair, &t).recommendations[0];
        assert_eq!(rec.operation, Operation::ReclaimSpace);
        assert_eq!(rec.priority, Priority::Normal);

        // fragmentation warning alone is not enough
        let ratio_only = metrics(1.35, 2.0, 0.0, StatisticsFreshness::Fresh);
        assert!(analyze(&ratio_only, &t).is_empty());

        let freelist_critical = metrics(1.0, 30.0, 0.0, StatisticsFreshness::Fresh);
        let rec = &analyze(&freelist_critical, &t).recommendations[0];
        assert_eq!(rec.priority, Priority::Normal);

        let mut huge = metrics(1.25, 0.0, 0.0, StatisticsFreshness::Fresh);
        huge.file_size_bytes = (600.0 * MB) as u64;
        assert!(analyze(&huge, &t).contains(Operation::ReclaimSpace));
    }

    #[test]
    fn test_single_reclaim_carries_highest_tier_and_all_reasons() {
        let m = metrics(1.8, 40.0, 0.0, StatisticsFreshness::Fresh);
        let analysis = analyze(&m, &Thresholds::default());
        let reclaims: Vec<_> = analysis
            .recommendations
            .iter()
            .filter(|r| r.operation == Operation::ReclaimSpace)
            .collect();
        assert_eq!(reclaims.len(), 1);
        assert_eq!(reclaims[0].priority, Priority::High);
        assert_eq!(reclaims[0].reason.matches("; ").count(), 2);
    }

    #[test]
    fn test_reclaim_with_non_trivial_wal_adds_checkpoint_first() {
        let m = metrics(1.6, 0.0, 3.0, StatisticsFreshness::Fresh);
        let analysis = analyze(&m, &Thresholds::default());
        assert_eq!(
            analysis.operations(),
            vec![Operation::WalCheckpoint, Operation::ReclaimSpace]
        );
    }

    #[test]
    fn test_plan_is_in_execution_order() {
        let mut m = metrics(1.6, 30.0, 12.0, StatisticsFreshness::Stale);
        m.table_count = 5;
        m.file_size_bytes = (20.0 * MB) as u64;
        let ops = analyze(&m, &Thresholds::default()).operations();
        assert_eq!(ops, Operation::ALL.to_vec());
    }

    #[test]
    fn test_operation_names_parse() {
        assert_eq!("vacuum".parse::<Operation>().unwrap(), Operation::ReclaimSpace);
        assert_eq!("WAL_CHECKPOINT".parse::<Operation>().unwrap(), Operation::WalCheckpoint);
        assert_eq!("table-statistics".parse::<Operation>().unwrap(), Operation::TableStatistics);
        assert!("reindex".parse::<Operation>().is_err());
    }

    #[test]
    fn test_comprehensive_plan_has_every_operation() {
        assert_eq!(Analysis::comprehensive().operations(), Operation::ALL.to_vec());
    }
}
