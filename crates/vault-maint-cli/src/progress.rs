use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use vault_maint_core::progress::CheckPhase;
use vault_maint_core::report::{IntegrityResult, OperationResult};
use vault_maint_core::utils::format_bytes;
use vault_maint_core::{DatabaseMetrics, Outcome, ProgressReporter, Recommendation};

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Interactive progress: one spinner per phase, a tick line when it ends.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn start_spinner(&self, message: String) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_spinner(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

fn phase_label(phase: CheckPhase) -> &'static str {
    match phase {
        CheckPhase::Before => "before",
        CheckPhase::After => "after",
    }
}

impl ProgressReporter for CliReporter {
    fn on_collect_start(&self) {
        self.start_spinner("Collecting database metrics...".to_string());
    }

    fn on_collect_complete(&self, metrics: &DatabaseMetrics) {
        self.finish_spinner();
        eprintln!(
            "  {} Metrics: {} file, fragmentation {:.2}, freelist {:.1}%, WAL {}",
            "✓".green(),
            format_bytes(metrics.file_size_bytes),
            metrics.fragmentation_ratio,
            metrics.freelist_percent,
            format_bytes(metrics.wal_size_bytes)
        );
    }

    fn on_integrity_start(&self, phase: CheckPhase) {
        self.start_spinner(format!("Integrity check ({})...", phase_label(phase)));
    }

    fn on_integrity_complete(&self, phase: CheckPhase, result: &IntegrityResult) {
        self.finish_spinner();
        if result.passed {
            eprintln!(
                "  {} Integrity check ({}) passed in {} ms",
                "✓".green(),
                phase_label(phase),
                result.duration_ms
            );
        } else {
            eprintln!(
                "  {} Integrity check ({}) failed: {}",
                "✗".red(),
                phase_label(phase),
                result.detail.as_deref().unwrap_or("unknown problem")
            );
        }
    }

    fn on_operation_start(&self, recommendation: &Recommendation) {
        self.start_spinner(format!(
            "{} ({})...",
            recommendation.operation, recommendation.reason
        ));
    }

    fn on_operation_complete(&self, result: &OperationResult) {
        self.finish_spinner();
        let mark = match result.outcome {
            Outcome::Success => "✓".green(),
            Outcome::Failed => "✗".red(),
            Outcome::Skipped => "-".yellow(),
        };
        match &result.detail {
            Some(detail) => eprintln!(
                "  {} {} {} in {} ms: {}",
                mark,
                result.operation,
                result.outcome.as_str(),
                result.duration_ms,
                detail
            ),
            None => eprintln!(
                "  {} {} {} in {} ms",
                mark,
                result.operation,
                result.outcome.as_str(),
                result.duration_ms
            ),
        }
    }
}
