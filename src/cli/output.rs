// Output formatting and display for CLI

use crate::health::HealthVerdict;
use crate::logs::LogLine;
use crate::process::StopReport;
use crate::supervisor::StatusReport;
use chrono::{DateTime, Local};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print the status table and restart budget
pub fn print_status(report: &StatusReport) {
    #[derive(Tabled)]
    struct StatusRow {
        #[tabled(rename = "Workload")]
        workload: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "Health")]
        health: String,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Memory")]
        memory: String,
        #[tabled(rename = "Restarts")]
        restarts: String,
    }

    if report.pid.is_none() {
        println!("{}", report.headline().yellow());
    }

    let row = StatusRow {
        workload: truncate(&report.workload, 24),
        state: if report.running {
            "running".green().to_string()
        } else {
            "not running".bright_black().to_string()
        },
        pid: report
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string()),
        uptime: report
            .uptime_secs
            .map(|secs| format_duration(&Duration::from_secs(secs)))
            .unwrap_or_else(|| "-".to_string()),
        health: report
            .verdict
            .as_ref()
            .map(format_verdict_colored)
            .unwrap_or_else(|| "-".to_string()),
        cpu: format!("{:.1}%", report.resources.cpu_percent),
        memory: format!("{:.1}%", report.resources.memory_percent),
        restarts: format!(
            "{}/{}",
            report.restarts.restarts_in_window, report.restarts.max_restarts
        ),
    };

    let mut table = Table::new(vec![row]);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);

    if let Some(ref verdict) = report.verdict {
        if !verdict.is_healthy() {
            println!("  {:<15} {}", "Detail:".bold(), verdict);
        }
    }
    if let Some(ref started_at) = report.started_at {
        println!("  {:<15} {}", "Started:".bold(), started_at);
    }
    if let Some(last) = report.restarts.last_restart {
        println!("  {:<15} {}", "Last Restart:".bold(), format_timestamp(last));
    }
    if report.restarts.budget_exhausted() {
        println!(
            "  {:<15} {}",
            "Budget:".bold(),
            "exhausted for the current window".yellow()
        );
    }
    match report.supervisor_pid {
        Some(pid) => println!("  {:<15} running (PID {})", "Supervisor:".bold(), pid),
        None => println!("  {:<15} {}", "Supervisor:".bold(), "not running".dimmed()),
    }
    println!(
        "{}",
        format!(
            "Restart window: {} within {}",
            report.restarts.restarts_in_window,
            format_duration(&Duration::from_secs(report.restarts.window_secs))
        )
        .dimmed()
        .italic()
    );
}

/// Print the recent lines of one log
pub fn print_log_section(path: &Path, lines: Option<&[String]>) {
    println!("\n{}", path.display().to_string().bold().underline());

    match lines {
        None => println!("{}", "  (log does not exist yet)".yellow()),
        Some([]) => println!("{}", "  (empty)".dimmed()),
        Some(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
    }
}

/// Print one mirrored log line
pub fn print_log_line(line: &LogLine) {
    let now = Local::now();
    println!(
        "{} {} {}",
        format!("[{}]", now.format("%H:%M:%S")).dimmed(),
        format!("[{}]", line.source).cyan(),
        line.text
    );
}

/// Summarise what `stop` had to do
pub fn describe_stop(report: &StopReport) -> String {
    if !report.was_running() {
        return "Workload was not running".to_string();
    }

    let mut message = format!(
        "Stopped {} process(es): {} graceful, {} forced",
        report.matched, report.graceful, report.forced
    );
    if report.survivors > 0 {
        message.push_str(&format!(", {} still present", report.survivors));
    }
    message
}

fn format_verdict_colored(verdict: &HealthVerdict) -> String {
    let label = verdict.label();
    match verdict {
        HealthVerdict::Healthy => label.green().to_string(),
        HealthVerdict::ResourceExhausted { .. } => label.yellow().to_string(),
        HealthVerdict::Unresponsive { .. } => label.yellow().bold().to_string(),
        HealthVerdict::Dead | HealthVerdict::ErrorDetected { .. } => {
            label.red().bold().to_string()
        }
    }
}

/// Format a wall-clock time in local time
fn format_timestamp(at: SystemTime) -> String {
    let datetime: DateTime<Local> = at.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format a duration in human-readable format
fn format_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Truncate a string to a maximum number of characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Create a spinner for long operations
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a spinner with success
pub fn finish_progress_success(pb: ProgressBar, message: &str) {
    pb.finish_with_message(format!("{} {}", "✓".green(), message));
}

/// Finish a spinner with error
pub fn finish_progress_error(pb: ProgressBar, message: &str) {
    pb.finish_with_message(format!("{} {}", "✗".red(), message));
}
