mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::*;
use commands::Cli;
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info, warn};
use vault_maint_core::scheduler::{CrontabStore, Scheduler};
use vault_maint_core::utils::format_bytes;
use vault_maint_core::{
    AppConfig, MaintenanceEngine, MaintenanceReport, Mode, Operation, ProgressReporter, Reporter,
    RunStatus, SilentReporter,
};

const EXIT_RUN_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    dotenv().ok();

    let args = Cli::parse();

    // cron mail does not render escape codes
    let _guard = logging::init_logger(!args.auto);
    if args.auto {
        colored::control::set_override(false);
    }

    let mut config = match vault_maint_core::config::load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }

    let result = if args.print_config {
        println!("Configuration: {:#?}", config);
        Ok(ExitCode::SUCCESS)
    } else if let Some(expression) = &args.schedule {
        run_schedule(&config, expression)
    } else if args.unschedule {
        run_unschedule(&config)
    } else if args.schedule_status {
        run_schedule_status(&config)
    } else if args.metrics {
        run_metrics(config)
    } else if args.analyze_only {
        run_analyze_only(config, &args)
    } else {
        run_maintenance(config, &args)
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("Error: {:#}", err);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run_maintenance(config: AppConfig, args: &Cli) -> anyhow::Result<ExitCode> {
    let engine = MaintenanceEngine::new(config);
    let mode = if args.auto {
        Mode::Unattended
    } else {
        Mode::Interactive
    };

    let cli_reporter = CliReporter::new();
    let reporter: &dyn ProgressReporter = match mode {
        Mode::Interactive => &cli_reporter,
        Mode::Unattended => &SilentReporter,
    };

    let (metrics, mut analysis) = engine
        .plan(args.plan(), reporter)
        .context("cannot plan maintenance")?;

    if mode == Mode::Interactive
        && analysis.contains(Operation::ReclaimSpace)
        && engine.is_service_running()
    {
        warn!(
            "{} is running; reclaiming space locks the database for the whole rewrite",
            engine.config().service.container_name
        );
        let confirmed = args.yes
            || prompt_confirm("Reclaim space while the service is running?", Some(false))?;
        if !confirmed {
            info!("Leaving {} out of this run", Operation::ReclaimSpace);
            analysis = analysis.without(Operation::ReclaimSpace);
        }
    }

    let report = engine
        .execute(metrics, &analysis, mode, reporter)
        .context("maintenance run aborted")?;

    print_summary(&engine, &report);

    if let Err(err) = engine.record(&report) {
        error!("Failed to store report: {}", err);
    }
    if let Err(err) = engine.notify(&report) {
        error!("Failed to send notification: {}", err);
    }

    Ok(match report.status {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::Failed => ExitCode::from(EXIT_RUN_FAILED),
    })
}

fn run_analyze_only(config: AppConfig, args: &Cli) -> anyhow::Result<ExitCode> {
    let engine = MaintenanceEngine::new(config);
    let (_, analysis) = engine.plan(args.plan(), &CliReporter::new())?;

    if analysis.is_empty() {
        println!("{}", "No maintenance needed; database is well maintained.".green());
        return Ok(ExitCode::SUCCESS);
    }

    println!("Planned operations (dry run, nothing executed):");
    for recommendation in &analysis.recommendations {
        println!(
            "  {:<18} {:<6} {}",
            recommendation.operation.as_str().cyan(),
            recommendation.priority.as_str(),
            recommendation.reason
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run_metrics(config: AppConfig) -> anyhow::Result<ExitCode> {
    let engine = MaintenanceEngine::new(config);
    let metrics = engine.collect(&SilentReporter)?;
    let health = metrics.health(&engine.config().thresholds);

    println!("Database: {}", engine.config().database_path.display());
    println!("  File size:      {}", format_bytes(metrics.file_size_bytes));
    println!("  Logical size:   {}", format_bytes(metrics.logical_size_bytes));
    println!(
        "  Pages:          {} x {} bytes, {} free",
        metrics.page_count, metrics.page_size, metrics.freelist_count
    );
    println!(
        "  Fragmentation:  {:.3} [{}]",
        metrics.fragmentation_ratio,
        health.fragmentation.as_str()
    );
    println!(
        "  Freelist:       {:.1}% [{}]",
        metrics.freelist_percent,
        health.freelist.as_str()
    );
    println!(
        "  WAL:            {} [{}] (journal mode {})",
        format_bytes(metrics.wal_size_bytes),
        health.wal.as_str(),
        metrics.journal_mode
    );
    println!(
        "  Statistics:     {} [{}]",
        metrics.statistics_freshness.as_str(),
        health.statistics.as_str()
    );
    println!("  Tables:         {}", metrics.table_count);
    println!("  Overall:        {}", health.overall().as_str().bold());
    Ok(ExitCode::SUCCESS)
}

fn run_schedule(config: &AppConfig, expression: &str) -> anyhow::Result<ExitCode> {
    let scheduler = Scheduler::new(CrontabStore::new(), &config.schedule);
    let schedule = scheduler.install(expression)?;
    let status = scheduler.status()?;
    println!(
        "Scheduled '{}': {}",
        schedule.expression().green(),
        status.next_run_description
    );
    Ok(ExitCode::SUCCESS)
}

fn run_unschedule(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let scheduler = Scheduler::new(CrontabStore::new(), &config.schedule);
    if scheduler.remove()? {
        println!("Maintenance schedule removed");
    } else {
        println!("No maintenance schedule was installed");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_schedule_status(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let scheduler = Scheduler::new(CrontabStore::new(), &config.schedule);
    let status = scheduler.status()?;
    match status.expression {
        Some(expression) if status.active => println!(
            "{} '{}': {}",
            "Active".green(),
            expression,
            status.next_run_description
        ),
        _ => println!("{}", "Not scheduled".yellow()),
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(engine: &MaintenanceEngine, report: &MaintenanceReport) {
    let summary = Reporter::new(&engine.config().reports_dir).summarize(report);
    println!();
    for line in summary.lines() {
        println!("{}", line);
    }

    let counts = report.counts();
    let status = match report.status {
        RunStatus::Success => report.status.as_str().to_uppercase().green(),
        RunStatus::Failed => report.status.as_str().to_uppercase().red(),
    };
    info!(
        "{}: {} succeeded, {} failed, {} skipped, {} reclaimed",
        status,
        format!("{}", counts.succeeded).green(),
        format!("{}", counts.failed).red(),
        format!("{}", counts.skipped).yellow(),
        format_bytes(report.bytes_reclaimed()).cyan(),
    );
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            // stdin closed: nobody to ask
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" | "YES" => return Ok(true),
            "N" | "NO" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
