//! Full-run summaries and the plain-text report written from them.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::catalog::Category;
use crate::cleaner::CleanupResult;
use crate::utils::format_size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Scan,
    Cleanup,
}

impl RunKind {
    pub fn label(self) -> &'static str {
        match self {
            RunKind::Scan => "Scan",
            RunKind::Cleanup => "Cleanup",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryOutcome {
    pub category: Category,
    pub result: CleanupResult,
    pub elapsed: Duration,
}

/// Everything one full scan or cleanup produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub kind: RunKind,
    pub dry_run: bool,
    pub started: DateTime<Local>,
    pub outcomes: Vec<CategoryOutcome>,
    pub total: CleanupResult,
    /// Failed deletions by kind, most frequent first.
    pub failures: Vec<(&'static str, usize)>,
    /// Failed deletions including those no longer retained by kind.
    pub failure_total: u64,
    pub stopped: bool,
}

impl RunSummary {
    pub fn new(kind: RunKind, dry_run: bool) -> Self {
        Self {
            kind,
            dry_run,
            started: Local::now(),
            outcomes: Vec::new(),
            total: CleanupResult::new(),
            failures: Vec::new(),
            failure_total: 0,
            stopped: false,
        }
    }

    pub fn push(&mut self, outcome: CategoryOutcome) {
        self.total.merge(outcome.result.clone());
        self.outcomes.push(outcome);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        let _ = writeln!(out, "Reclaim {} Summary Report{mode}", self.kind.label());
        let _ = writeln!(out, "Generated: {}", self.started.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out);

        for outcome in &self.outcomes {
            let r = &outcome.result;
            let _ = writeln!(out, "{}:", outcome.category.label());
            let _ = writeln!(out, "  Files Scanned: {}", r.files_scanned);
            let _ = writeln!(out, "  Files Deleted: {}", r.files_deleted);
            let _ = writeln!(out, "  Bytes Freed: {}", format_size(r.bytes_freed));
            let _ = writeln!(out, "  Time: {:.1}s", outcome.elapsed.as_secs_f64());
            let status = if r.success { "Success" } else { "Failed" };
            let _ = writeln!(out, "  Status: {status}");
            for error in r.errors() {
                let _ = writeln!(out, "    - {error}");
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "Summary Totals:");
        let _ = writeln!(out, "  Total Files Scanned: {}", self.total.files_scanned);
        let _ = writeln!(out, "  Total Files Deleted: {}", self.total.files_deleted);
        let _ = writeln!(out, "  Total Space Freed: {}", format_size(self.total.bytes_freed));
        if self.stopped {
            let _ = writeln!(out, "  Stopped before every category ran");
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Failed Deletions ({} total):", self.failure_total);
            for (kind, count) in &self.failures {
                let _ = writeln!(out, "  {kind}: {count}");
            }
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(category: Category, scanned: u64, error: Option<&str>) -> CategoryOutcome {
        let mut result = CleanupResult {
            files_scanned: scanned,
            bytes_freed: scanned * 1024,
            ..CleanupResult::new()
        };
        if let Some(e) = error {
            result.record_error(e);
        }
        CategoryOutcome {
            category,
            result,
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn totals_cover_every_category() {
        let mut summary = RunSummary::new(RunKind::Scan, false);
        summary.push(outcome(Category::TempFiles, 3, None));
        summary.push(outcome(Category::BrowserCache, 2, Some("boom")));
        assert_eq!(summary.total.files_scanned, 5);
        assert!(!summary.total.success);

        let text = summary.render();
        assert!(text.contains("Temp Files:"));
        assert!(text.contains("Status: Failed"));
        assert!(text.contains("    - boom"));
        assert!(text.contains("Total Files Scanned: 5"));
    }

    #[test]
    fn writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/run.txt");
        let mut summary = RunSummary::new(RunKind::Cleanup, true);
        summary.failures = vec![("Active use", 2)];
        summary.failure_total = 120;
        summary.write_to(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Reclaim Cleanup Summary Report (dry run)"));
        assert!(text.contains("Failed Deletions (120 total):"));
        assert!(text.contains("Active use: 2"));
    }
}
