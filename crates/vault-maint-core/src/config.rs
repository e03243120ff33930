use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "VAULT_MAINT";
const DEFAULT_CONFIG_NAME: &str = "VaultMaint";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub reports_dir: PathBuf,
    pub report_retention_days: u32,
    pub backup_dir: PathBuf,
    pub service: ServiceConfig,
    pub schedule: ScheduleConfig,
    pub notify: NotifyConfig,
    pub thresholds: Thresholds,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("/data/db.sqlite3"),
            reports_dir: PathBuf::from("./reports"),
            report_retention_days: 30,
            backup_dir: PathBuf::from("./backups"),
            service: ServiceConfig::default(),
            schedule: ScheduleConfig::default(),
            notify: NotifyConfig::default(),
            thresholds: Thresholds::default(),
        }
    }
}

/// How the live vault service is detected.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub container_name: String,
    pub probe_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            container_name: "vaultwarden".to_string(),
            probe_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Comment tag identifying our entry in the cron store.
    pub marker: String,
    pub command: String,
    pub snapshot_dir: PathBuf,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            marker: "vault-maint:sqlite-maintenance".to_string(),
            command: "vault-maint --cron".to_string(),
            snapshot_dir: PathBuf::from("./backups/crontab"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub command: Option<String>,
    pub on_success: bool,
}

/// Metric health levels, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Alert,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Warning => "warning",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Tiers {
    pub warning: f64,
    pub alert: f64,
    pub critical: f64,
}

impl Tiers {
    /// Values strictly above a bound reach its tier.
    pub fn severity(&self, value: f64) -> Severity {
        if value > self.critical {
            Severity::Critical
        } else if value > self.alert {
            Severity::Alert
        } else if value > self.warning {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WalThresholds {
    /// At or below this size the WAL is not worth a checkpoint before a reclaim.
    pub trivial_mb: f64,
    pub warning_mb: f64,
    pub alert_mb: f64,
    pub critical_mb: f64,
}

impl Default for WalThresholds {
    fn default() -> Self {
        Self {
            trivial_mb: 1.0,
            warning_mb: 5.0,
            alert_mb: 8.0,
            critical_mb: 10.0,
        }
    }
}

impl WalThresholds {
    pub fn tiers(&self) -> Tiers {
        Tiers {
            warning: self.warning_mb,
            alert: self.alert_mb,
            critical: self.critical_mb,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SizeThresholds {
    pub minimal_mb: f64,
    pub sizeable_mb: f64,
    pub large_mb: f64,
    pub huge_mb: f64,
    pub huge_fragmentation_ratio: f64,
}

impl Default for SizeThresholds {
    fn default() -> Self {
        Self {
            minimal_mb: 1.0,
            sizeable_mb: 10.0,
            large_mb: 100.0,
            huge_mb: 500.0,
            huge_fragmentation_ratio: 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatisticsThresholds {
    pub fresh_hours: u64,
    pub stale_days: u64,
}

impl Default for StatisticsThresholds {
    fn default() -> Self {
        Self {
            fresh_hours: 24,
            stale_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub fragmentation: Tiers,
    pub freelist_percent: Tiers,
    pub wal: WalThresholds,
    pub size: SizeThresholds,
    pub statistics: StatisticsThresholds,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fragmentation: Tiers {
                warning: 1.3,
                alert: 1.4,
                critical: 1.5,
            },
            freelist_percent: Tiers {
                warning: 10.0,
                alert: 15.0,
                critical: 25.0,
            },
            wal: WalThresholds::default(),
            size: SizeThresholds::default(),
            statistics: StatisticsThresholds::default(),
        }
    }
}

/// Build the configuration from defaults, then the config file, then
/// `VAULT_MAINT__*` environment variables. A missing default file is fine;
/// an explicitly named one must exist.
pub fn load_configuration(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file_source = match config_path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name(DEFAULT_CONFIG_NAME).required(false),
    };

    let builder = Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

pub fn mb_to_bytes(mb: f64) -> f64 {
    mb * 1024.0 * 1024.0
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
