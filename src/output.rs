use std::path::Path;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use reclaim::disk_info::DiskSpace;
use reclaim::progress::ProgressSink;
use reclaim::report::{CategoryOutcome, RunSummary};
use reclaim::security::{SecurityLevel, SecuritySummary, SecurityVerdict};
use reclaim::utils::{display_path, format_size};

pub fn print_banner() {
    println!(
        "{}",
        format!("reclaim - Disk Space Reclamation v{}", env!("CARGO_PKG_VERSION"))
            .bold()
            .cyan()
    );
    println!();
}

pub fn print_scan_header(label: &str) {
    println!("{}", format!("=== {label} ===").bold().white());
}

fn print_category_row(outcome: &CategoryOutcome, deleting: bool) {
    let r = &outcome.result;
    let count = if deleting {
        format!("{} of {} files", r.files_deleted, r.files_scanned)
    } else {
        format!("{} files", r.files_scanned)
    };
    let status = if r.success {
        "ok".green()
    } else {
        "errors".red().bold()
    };
    println!(
        "  {:<24} {:>18}  {:>10}  {:>6.1}s  {}",
        outcome.category.label(),
        count.dimmed(),
        format_size(r.bytes_freed).green(),
        outcome.elapsed.as_secs_f64(),
        status
    );
    for error in r.errors().into_iter().take(3) {
        println!("    {}", error.red());
    }
}

pub fn print_summary(summary: &RunSummary, deleting: bool) {
    print_scan_header(&format!("{} Summary", summary.kind.label()));
    for outcome in &summary.outcomes {
        print_category_row(outcome, deleting);
    }
    print_separator();
    let label = if deleting {
        "Total freed:"
    } else {
        "Total reclaimable:"
    };
    println!(
        "  {:<24} {:>18}  {}",
        label.bold(),
        format!("{} files", summary.total.files_scanned).dimmed(),
        format_size(summary.total.bytes_freed).green().bold()
    );
    if summary.stopped {
        print_warning("stopped before every category finished");
    }
    if !summary.failures.is_empty() {
        println!();
        println!(
            "{} {}",
            "Failed deletions:".bold(),
            format!("{} total", summary.failure_total).dimmed()
        );
        for (kind, count) in &summary.failures {
            println!("  {:<24} {}", kind, count.to_string().yellow());
        }
    }
    println!();
}

pub fn print_separator() {
    println!("  {}", "─".repeat(70).dimmed());
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "Warning:".red().bold(), msg.red());
}

pub fn print_info(msg: &str) {
    println!("{} {}", "Info:".cyan().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}

pub fn print_dry_run_footer() {
    println!(
        "{}",
        "This was a dry run. Run `reclaim clean --confirm` to delete."
            .yellow()
            .bold()
    );
}

pub fn print_no_confirm_warning() {
    println!(
        "{}",
        "No --confirm flag provided. Running as a dry run."
            .yellow()
            .bold()
    );
    println!();
}

pub fn print_disk_space(path: &Path, before: &DiskSpace, after: &DiskSpace) {
    println!(
        "{} {} free on {} ({:.1}% used, {} gained)",
        "Disk:".cyan().bold(),
        format_size(after.available).green(),
        display_path(path),
        after.usage_percent(),
        format_size(after.gained_since(before)).green().bold()
    );
}

pub fn print_verdict(path: &Path, verdict: &SecurityVerdict) {
    let level = match verdict.level {
        SecurityLevel::Safe => verdict.level.label().green(),
        SecurityLevel::Moderate => verdict.level.label().yellow(),
        SecurityLevel::HighRisk => verdict.level.label().red(),
        SecurityLevel::Critical => verdict.level.label().red().bold(),
    };
    println!("{}  {}", level, display_path(path).dimmed());
    for factor in &verdict.risk_factors {
        println!("    - {factor}");
    }
}

pub fn print_security_summary(summary: &SecuritySummary) {
    println!();
    print_scan_header("Security Summary");
    println!(
        "  safe {}  moderate {}  high risk {}  critical {}",
        summary.safe.to_string().green(),
        summary.moderate.to_string().yellow(),
        summary.high_risk.to_string().red(),
        summary.critical.to_string().red().bold()
    );
    for (factor, count) in summary.common_risk_factors.iter().take(5) {
        println!("  {count:>4}  {}", factor.dimmed());
    }
    for rec in &summary.recommendations {
        print_info(rec);
    }
}

/// Progress sink drawing an indicatif bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn update(&self, message: &str, current: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(current);
        self.bar.set_message(message.to_string());
    }

    fn finish(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}
