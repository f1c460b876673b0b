//! CLI output formatting

use crate::{
    core::{state::StepStatus, validation::ValidationResult},
    execution::{ChainStatus, ExecutionEvent},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static FILE: Emoji<'_, '_> = Emoji("📄 ", "> ");

/// Spinner shown while a chain runs
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a step status for display
pub fn format_step_status(status: StepStatus) -> String {
    match status {
        StepStatus::Completed => style("COMPLETED").green().to_string(),
        StepStatus::Failed => style("FAILED").red().to_string(),
    }
}

pub fn format_chain_status(status: ChainStatus) -> String {
    match status {
        ChainStatus::Completed => style("COMPLETED").green().to_string(),
        ChainStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::FileSelected { run_id, step_id, path } => format!(
            "{} {} → {} ({})",
            FILE,
            style(path).bold(),
            style(step_id).cyan(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StepStarted { step_id, path, .. } => {
            format!("{} {} {}", SPINNER, style(step_id).cyan(), style(path).dim())
        }
        ExecutionEvent::StepCompleted { step_id, outputs, next_steps, .. } => {
            let mut line = format!("{} {}", CHECK, style(step_id).green());
            for output in outputs {
                line.push_str(&format!("\n    {} {}", style("wrote").dim(), output));
            }
            if !next_steps.is_empty() {
                line.push_str(&format!(
                    "\n    {} {}",
                    style("next").dim(),
                    style(next_steps.join(", ")).cyan()
                ));
            }
            line
        }
        ExecutionEvent::StepFailed { step_id, phase, error, .. } => format!(
            "{} {} ({}): {}",
            CROSS,
            style(step_id).red(),
            phase,
            style(error).dim()
        ),
        ExecutionEvent::ChainCompleted { source, status, steps_run, .. } => format!(
            "{} {} {} after {} step(s)",
            INFO,
            style(source).bold(),
            format_chain_status(*status),
            steps_run
        ),
    }
}

/// Human-readable validation report
pub fn format_validation(result: &ValidationResult) -> Vec<String> {
    let mut lines = Vec::new();
    if result.is_valid {
        lines.push(format!("{} Pipeline configuration is valid!", CHECK));
    } else {
        lines.push(format!("{} Validation failed:", CROSS));
    }
    lines.push(format!(
        "  Entry points: {}",
        style(if result.entry_points.is_empty() {
            "none".to_string()
        } else {
            result.entry_points.join(", ")
        })
        .cyan()
    ));
    for error in &result.errors {
        lines.push(format!("  {} {}", CROSS, style(error).red()));
    }
    for warning in &result.warnings {
        lines.push(format!("  {} {}", WARN, style(warning).yellow()));
    }
    lines
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
