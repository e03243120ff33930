use crate::config::{bytes_to_mb, Severity, StatisticsThresholds, Thresholds};
use crate::database::{self, Database};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticsFreshness {
    Missing,
    Fresh,
    Moderate,
    Stale,
}

impl StatisticsFreshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticsFreshness::Missing => "missing",
            StatisticsFreshness::Fresh => "fresh",
            StatisticsFreshness::Moderate => "moderate",
            StatisticsFreshness::Stale => "stale",
        }
    }

    /// Classify by the age of the database file, when planner statistics exist at all.
    pub fn from_age(
        has_statistics: bool,
        age: Duration,
        thresholds: &StatisticsThresholds,
    ) -> Self {
        if !has_statistics {
            return StatisticsFreshness::Missing;
        }
        let fresh = Duration::from_secs(thresholds.fresh_hours * 3600);
        let stale = Duration::from_secs(thresholds.stale_days * 86_400);
        if age < fresh {
            StatisticsFreshness::Fresh
        } else if age < stale {
            StatisticsFreshness::Moderate
        } else {
            StatisticsFreshness::Stale
        }
    }
}

/// Snapshot of one database's physical layout, taken fresh for every analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetrics {
    pub file_size_bytes: u64,
    pub logical_size_bytes: u64,
    pub page_count: u64,
    pub page_size: u64,
    pub freelist_count: u64,
    pub freelist_percent: f64,
    pub fragmentation_ratio: f64,
    pub wal_size_bytes: u64,
    pub table_count: u64,
    pub journal_mode: String,
    pub statistics_freshness: StatisticsFreshness,
}

impl DatabaseMetrics {
    /// Derive the computed fields from raw counts. An empty database has a
    /// fragmentation ratio of exactly 1.0.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        file_size_bytes: u64,
        page_count: u64,
        page_size: u64,
        freelist_count: u64,
        wal_size_bytes: u64,
        table_count: u64,
        journal_mode: impl Into<String>,
        statistics_freshness: StatisticsFreshness,
    ) -> Self {
        let logical_size_bytes = page_count.saturating_mul(page_size);
        let fragmentation_ratio = if page_count == 0 || logical_size_bytes == 0 {
            1.0
        } else {
            file_size_bytes as f64 / logical_size_bytes as f64
        };
        let freelist_percent = if page_count == 0 {
            0.0
        } else {
            freelist_count as f64 * 100.0 / page_count as f64
        };

        Self {
            file_size_bytes,
            logical_size_bytes,
            page_count,
            page_size,
            freelist_count,
            freelist_percent,
            fragmentation_ratio,
            wal_size_bytes,
            table_count,
            journal_mode: journal_mode.into(),
            statistics_freshness,
        }
    }

    pub fn file_size_mb(&self) -> f64 {
        bytes_to_mb(self.file_size_bytes)
    }

    pub fn wal_size_mb(&self) -> f64 {
        bytes_to_mb(self.wal_size_bytes)
    }

    pub fn is_wal_mode(&self) -> bool {
        self.journal_mode.eq_ignore_ascii_case("wal")
    }

    pub fn health(&self, thresholds: &Thresholds) -> MetricsHealth {
        let statistics = match self.statistics_freshness {
            StatisticsFreshness::Fresh | StatisticsFreshness::Moderate => Severity::Ok,
            StatisticsFreshness::Stale | StatisticsFreshness::Missing => Severity::Warning,
        };
        MetricsHealth {
            fragmentation: thresholds.fragmentation.severity(self.fragmentation_ratio),
            freelist: thresholds.freelist_percent.severity(self.freelist_percent),
            wal: thresholds.wal.tiers().severity(self.wal_size_mb()),
            statistics,
        }
    }
}

/// Per-metric severities, for dashboards and `--metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsHealth {
    pub fragmentation: Severity,
    pub freelist: Severity,
    pub wal: Severity,
    pub statistics: Severity,
}

impl MetricsHealth {
    pub fn overall(&self) -> Severity {
        self.fragmentation
            .max(self.freelist)
            .max(self.wal)
            .max(self.statistics)
    }
}

/// Read the current metrics of the database at `db_path`.
///
/// A missing file is `NotFound`; a file that exists but cannot be queried
/// (corrupt, locked, not a database) is `Inaccessible`. The database is
/// opened read-only and nothing on disk changes, even with a leftover WAL.
pub fn collect(db_path: &Path, thresholds: &Thresholds) -> Result<DatabaseMetrics, Error> {
    let metadata = match fs::metadata(db_path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(Error::NotFound(db_path.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::NotFound(db_path.to_path_buf()))
        }
        Err(e) => return Err(Error::Io(e)),
    };
    let file_size_bytes = metadata.len();
    let age = metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .unwrap_or_default();

    let inaccessible = |source: rusqlite::Error| Error::Inaccessible {
        path: db_path.to_path_buf(),
        source,
    };

    // Before connecting, so the WAL is measured as found on disk.
    let wal_size_bytes = database::wal_size(db_path);

    let db = Database::open_read_only(db_path).map_err(inaccessible)?;
    let page_count = db.pragma_i64("page_count").map_err(inaccessible)?.max(0) as u64;
    let page_size = db.pragma_i64("page_size").map_err(inaccessible)?.max(0) as u64;
    let freelist_count = db.pragma_i64("freelist_count").map_err(inaccessible)?.max(0) as u64;
    let journal_mode = db.journal_mode().map_err(inaccessible)?;
    let table_count = db.user_tables().map_err(inaccessible)?.len() as u64;
    let has_statistics = db.has_statistics_table().map_err(inaccessible)?;
    drop(db);

    let freshness = StatisticsFreshness::from_age(has_statistics, age, &thresholds.statistics);

    let metrics = DatabaseMetrics::from_raw(
        file_size_bytes,
        page_count,
        page_size,
        freelist_count,
        wal_size_bytes,
        table_count,
        journal_mode,
        freshness,
    );
    debug!(
        "Metrics for {}: {} pages x {} B, {} free ({:.1}%), ratio {:.2}, WAL {} B, stats {}",
        db_path.display(),
        metrics.page_count,
        metrics.page_size,
        metrics.freelist_count,
        metrics.freelist_percent,
        metrics.fragmentation_ratio,
        metrics.wal_size_bytes,
        metrics.statistics_freshness.as_str(),
    );
    Ok(metrics)
}
