//! Top-level sequencing of category runs.
//!
//! A category run never takes the orchestrator down with it: a panic inside
//! one becomes a failed [`CleanupResult`] and the next category still runs.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;

use crate::catalog::Category;
use crate::categories::{cleaner_for, RunContext};
use crate::cleaner::CleanupResult;
use crate::config::Settings;
use crate::error::ConfigError;
use crate::executor::{panic_message, StopFlag};
use crate::report::{CategoryOutcome, RunKind, RunSummary};
use crate::security::{SecuritySummary, SecurityVerdict};

pub struct CleanupOrchestrator {
    ctx: RunContext,
}

impl CleanupOrchestrator {
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        Ok(Self::with_context(RunContext::new(settings)?))
    }

    pub fn with_context(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Ask running work to wind down. Idempotent; safe from any thread.
    pub fn stop(&self) {
        log::info!("stop requested");
        self.ctx.stop.stop();
    }

    pub fn resume(&self) {
        self.ctx.stop.resume();
    }

    /// Handle for stopping from another thread.
    pub fn stop_flag(&self) -> StopFlag {
        self.ctx.stop.clone()
    }

    pub fn scan(&self, category: Category) -> CleanupResult {
        match category {
            Category::All => self.perform_full_scan(),
            other => self.run_guarded(other, RunKind::Scan),
        }
    }

    pub fn clean(&self, category: Category) -> CleanupResult {
        match category {
            Category::All => self.perform_full_cleanup(),
            other => self.run_guarded(other, RunKind::Cleanup),
        }
    }

    pub fn scan_temp_files(&self) -> CleanupResult {
        self.scan(Category::TempFiles)
    }

    pub fn clean_temp_files(&self) -> CleanupResult {
        self.clean(Category::TempFiles)
    }

    pub fn scan_browser_cache(&self) -> CleanupResult {
        self.scan(Category::BrowserCache)
    }

    pub fn clean_browser_cache(&self) -> CleanupResult {
        self.clean(Category::BrowserCache)
    }

    pub fn scan_system_files(&self) -> CleanupResult {
        self.scan(Category::SystemFiles)
    }

    pub fn clean_system_files(&self) -> CleanupResult {
        self.clean(Category::SystemFiles)
    }

    pub fn scan_development_files(&self) -> CleanupResult {
        self.scan(Category::DevelopmentFiles)
    }

    pub fn clean_development_files(&self) -> CleanupResult {
        self.clean(Category::DevelopmentFiles)
    }

    pub fn scan_media_files(&self) -> CleanupResult {
        self.scan(Category::MediaFiles)
    }

    pub fn clean_media_files(&self) -> CleanupResult {
        self.clean(Category::MediaFiles)
    }

    pub fn scan_gaming_files(&self) -> CleanupResult {
        self.scan(Category::GamingFiles)
    }

    pub fn clean_gaming_files(&self) -> CleanupResult {
        self.clean(Category::GamingFiles)
    }

    pub fn scan_system_optimization(&self) -> CleanupResult {
        self.scan(Category::SystemOptimization)
    }

    pub fn clean_system_optimization(&self) -> CleanupResult {
        self.clean(Category::SystemOptimization)
    }

    pub fn scan_recycle_bin(&self) -> CleanupResult {
        self.scan(Category::RecycleBin)
    }

    pub fn clean_recycle_bin(&self) -> CleanupResult {
        self.clean(Category::RecycleBin)
    }

    pub fn perform_full_scan(&self) -> CleanupResult {
        self.full_run(RunKind::Scan).total
    }

    pub fn perform_full_cleanup(&self) -> CleanupResult {
        self.full_run(RunKind::Cleanup).total
    }

    /// Run every category and return the per-category breakdown. The
    /// report is written when the settings name a report path.
    pub fn full_run(&self, kind: RunKind) -> RunSummary {
        self.ctx.clear_failures();
        let mut summary = RunSummary::new(kind, self.ctx.settings.dry_run);
        log::info!("Starting full {}", kind.label().to_lowercase());

        let parallel = self.ctx.settings.max_parallel_categories;
        if parallel > 1 {
            for outcome in self.run_parallel(kind, parallel) {
                summary.push(outcome);
            }
        } else {
            let total = Category::CONCRETE.len();
            for (i, &category) in Category::CONCRETE.iter().enumerate() {
                if self.ctx.stop.is_set() {
                    break;
                }
                self.ctx.progress.update(
                    &format!("{} {}", kind.label(), category.label()),
                    i as u64,
                    total as u64,
                );
                summary.push(self.timed(category, kind));
            }
        }
        summary.stopped = self.ctx.stop.is_set();
        summary.failures = self.ctx.failure_summary();
        summary.failure_total = self.ctx.failure_total();

        log::info!(
            "Full {} finished: {} files scanned, {} deleted, {} bytes",
            kind.label().to_lowercase(),
            summary.total.files_scanned,
            summary.total.files_deleted,
            summary.total.bytes_freed
        );
        if let Some(path) = &self.ctx.settings.report_path {
            match summary.write_to(path) {
                Ok(()) => log::info!("report written to {}", path.display()),
                Err(e) => log::error!("cannot write report {}: {e}", path.display()),
            }
        }
        summary
    }

    /// Categories on a small outer pool; each still gets its own batch pool.
    fn run_parallel(&self, kind: RunKind, threads: usize) -> Vec<CategoryOutcome> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("reclaim-category-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!("cannot build category pool ({e}), running sequentially");
                return Category::CONCRETE
                    .iter()
                    .map(|&c| self.timed(c, kind))
                    .collect();
            }
        };
        pool.install(|| {
            Category::CONCRETE
                .par_iter()
                .map(|&c| self.timed(c, kind))
                .collect()
        })
    }

    fn timed(&self, category: Category, kind: RunKind) -> CategoryOutcome {
        let started = Instant::now();
        let result = self.run_guarded(category, kind);
        CategoryOutcome {
            category,
            result,
            elapsed: started.elapsed(),
        }
    }

    fn run_guarded(&self, category: Category, kind: RunKind) -> CleanupResult {
        let label = category.label();
        let cleaner = cleaner_for(category);
        log::info!("Starting {} of {label}", kind.label().to_lowercase());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match kind {
            RunKind::Scan => cleaner.scan(&self.ctx),
            RunKind::Cleanup => cleaner.clean(&self.ctx),
        }));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                log::error!("{label} failed: {msg}");
                CleanupResult::failure(format!("Error during {label}: {msg}"))
            }
        };

        if result.success {
            log::info!(
                "{label}: {} scanned, {} deleted",
                result.files_scanned,
                result.files_deleted
            );
        } else {
            log::warn!("{label} finished with errors: {}", result.error_message);
        }
        self.ctx.progress.finish(&format!("{label} done"));
        result
    }

    /// Classify specific files and summarize the verdicts.
    pub fn assess(&self, paths: &[PathBuf]) -> (Vec<(PathBuf, SecurityVerdict)>, SecuritySummary) {
        let classifier = self.ctx.classifier();
        let verdicts: Vec<(PathBuf, SecurityVerdict)> = paths
            .iter()
            .map(|p| (p.clone(), classifier.classify_path(p)))
            .collect();
        let summary = SecuritySummary::from_verdicts(verdicts.iter().map(|(_, v)| v));
        (verdicts, summary)
    }

    /// Failed deletions since the last full run, grouped by kind.
    pub fn failure_summary(&self) -> Vec<(&'static str, usize)> {
        self.ctx.failure_summary()
    }

    pub fn failure_total(&self) -> u64 {
        self.ctx.failure_total()
    }
}
