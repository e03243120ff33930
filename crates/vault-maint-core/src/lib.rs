pub mod analyzer;
pub mod backup;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod executor;
pub mod lock;
pub mod metrics;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod service;
pub mod utils;

pub use analyzer::{analyze, Analysis, Operation, Priority, Recommendation};
pub use config::{AppConfig, Thresholds};
pub use engine::{MaintenanceEngine, Plan};
pub use error::Error;
pub use executor::{Executor, Mode};
pub use metrics::{DatabaseMetrics, StatisticsFreshness};
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{MaintenanceReport, Outcome, Reporter, RunStatus};
pub use service::{FixedProbe, ServiceProbe};
