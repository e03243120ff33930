use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use vault_maint_core::{Operation, Plan};

#[derive(Debug, Parser)]
#[command(name = "vault-maint", version)]
#[command(about = "Adaptive SQLite maintenance for the vault database", long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .args([
            "analyze_only",
            "schedule",
            "unschedule",
            "schedule_status",
            "metrics",
            "print_config",
        ])
        .multiple(false)
))]
pub struct Cli {
    /// Print the maintenance plan without changing anything
    #[arg(long)]
    pub analyze_only: bool,

    /// Unattended run: no prompts, skip space reclaim while the service is up
    #[arg(long, visible_alias = "cron")]
    pub auto: bool,

    /// Run a single named operation (checkpoint, analyze, table_statistics, vacuum, optimize)
    #[arg(long, value_name = "NAME", conflicts_with = "comprehensive")]
    pub operation: Option<Operation>,

    /// Run every operation regardless of metrics
    #[arg(long)]
    pub comprehensive: bool,

    /// Install the periodic unattended run, e.g. "0 3 * * 0"
    #[arg(long, value_name = "CRON_EXPR")]
    pub schedule: Option<String>,

    /// Remove the periodic unattended run
    #[arg(long)]
    pub unschedule: bool,

    /// Show whether the periodic run is installed and when it next fires
    #[arg(long)]
    pub schedule_status: bool,

    /// Print current database metrics with their severities
    #[arg(long)]
    pub metrics: bool,

    /// Print configuration values
    #[arg(long)]
    pub print_config: bool,

    /// Answer yes to confirmation prompts
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Configuration file (defaults to ./VaultMaint.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configured path
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,
}

impl Cli {
    pub fn plan(&self) -> Plan {
        match self.operation {
            Some(operation) => Plan::Single(operation),
            None if self.comprehensive => Plan::Comprehensive,
            None => Plan::Analyzed,
        }
    }
}
