//! CLI output formatting

use crate::{
    core::{ExecutionStatus, TaskStatus},
    execution::ExecutionEvent,
    persistence::RunSummary,
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
pub static CACHED: Emoji<'_, '_> = Emoji("📦 ", "= ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a task status for display
pub fn format_task_status(status: &TaskStatus) -> String {
    match status {
        TaskStatus::Pending => style("PENDING").dim().to_string(),
        TaskStatus::SkippedCached { .. } => style("CACHED").cyan().to_string(),
        TaskStatus::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        TaskStatus::Failed { .. } => style("FAILED").red().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Whether an artifact exists, as shown by `list --tasks`
pub fn format_cache_state(exists: Option<bool>) -> String {
    match exists {
        Some(true) => style("cached").green().to_string(),
        Some(false) => style("missing").dim().to_string(),
        None => style("unknown").yellow().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    format!(
        "{} {} - {} - {} ({} run, {} cached, {} failed of {}) - {}",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.executed_tasks,
        summary.cached_tasks,
        summary.failed_tasks,
        summary.total_tasks,
        style(format!("{:.0}%", summary.progress * 100.0)).cyan()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_tasks,
        } => format!(
            "{} Starting pipeline {} ({}, {} tasks)",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(execution_id)).dim(),
            total_tasks
        ),
        ExecutionEvent::TaskStarted { task } => format!("{} {}", SPINNER, style(task).cyan()),
        ExecutionEvent::TaskCached { task, locator } => format!(
            "{} {} (cached at {})",
            CACHED,
            style(task).cyan(),
            style(locator).dim()
        ),
        ExecutionEvent::TaskSucceeded { task, locator } => format!(
            "{} {} → {}",
            CHECK,
            style(task).green(),
            style(locator).dim()
        ),
        ExecutionEvent::TaskFailed { task, error } => {
            format!("{} {}: {}", CROSS, style(task).red(), style(error).dim())
        }
        ExecutionEvent::PipelineCompleted {
            execution_id,
            pipeline_name,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format!("{:?}", other),
            };
            format!(
                "{} Pipeline {} ({}) {}",
                INFO,
                style(pipeline_name).bold(),
                style(short_id(execution_id)).dim(),
                status_str
            )
        }
    }
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
