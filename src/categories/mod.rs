//! Category runners and the state they share during one operation.
//!
//! Every runner follows the same flow: resolve its locations, collect
//! candidate files, order them with its scorer, then hand them to a
//! [`BatchExecutor`] through a [`FilePipeline`].

mod development;
mod general;
mod recycle_bin;
mod system_optimization;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use development::{
    detect_project_kinds, discover_projects, is_safe_development_file, DevelopmentFiles,
    ProjectKind,
};
pub use general::PathCategory;
pub use recycle_bin::{RecycleBin, RecycleBinCleaner, TrashDir};
pub use system_optimization::{is_dangerous_system_path, tiers_for_mode, SystemOptimization};

use crate::backup::BackupSession;
use crate::catalog::{Category, PathCatalog};
use crate::cleaner::{Cleaner, CleanupResult, FailedDeletion, FailureLog, ItemReport};
use crate::config::{ProfileKind, Settings};
use crate::deleter::{BackupThenDelete, DeleteOptions, DeletionStrategy, DirectDelete};
use crate::error::ConfigError;
use crate::executor::{BatchExecutor, StopFlag};
use crate::expander::PathExpander;
use crate::processes::{OpenFileIndex, OpenFileProbe};
use crate::progress::{LogProgress, Progress, ProgressSink};
use crate::security::{passes_quick_filter, SafetyClassifier};
use crate::walker::{CandidateFile, TreeWalker, WalkBudget};

/// Whether an operation only reports or also deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Scan,
    Clean { dry_run: bool },
}

impl Mode {
    /// True when files actually leave the disk.
    pub fn deletes(self) -> bool {
        matches!(self, Mode::Clean { dry_run: false })
    }
}

/// Shared state for every category run of one orchestrator.
pub struct RunContext {
    pub settings: Settings,
    pub catalog: PathCatalog,
    pub expander: PathExpander,
    pub stop: StopFlag,
    pub progress: Progress,
    failures: Mutex<FailureLog>,
    open_files: Option<Arc<dyn OpenFileProbe>>,
    recycle_bin: Arc<dyn RecycleBin>,
}

impl RunContext {
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        let catalog = settings.catalog()?;
        let expander = PathExpander::new(catalog.high_priority());
        let progress = Progress::new(Arc::new(LogProgress), settings.progress_interval());
        Ok(Self {
            settings,
            catalog,
            expander,
            stop: StopFlag::new(),
            progress,
            failures: Mutex::new(FailureLog::new()),
            open_files: None,
            recycle_bin: Arc::new(TrashDir::platform()),
        })
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Progress::new(sink, self.settings.progress_interval());
        self
    }

    /// Use a fixed open-file source instead of a fresh process snapshot per run.
    pub fn with_open_files(mut self, probe: Arc<dyn OpenFileProbe>) -> Self {
        self.open_files = Some(probe);
        self
    }

    pub fn with_recycle_bin(mut self, bin: Arc<dyn RecycleBin>) -> Self {
        self.recycle_bin = bin;
        self
    }

    pub fn with_expander(mut self, expander: PathExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn recycle_bin(&self) -> &dyn RecycleBin {
        self.recycle_bin.as_ref()
    }

    /// Mode of a clean call under the current settings.
    pub fn clean_mode(&self) -> Mode {
        Mode::Clean {
            dry_run: self.settings.dry_run,
        }
    }

    pub fn classifier(&self) -> SafetyClassifier {
        let probe = match &self.open_files {
            Some(probe) => probe.clone(),
            None => Arc::new(OpenFileIndex::snapshot()),
        };
        SafetyClassifier::new(self.settings.classifier.clone(), probe)
    }

    /// Delete strategy for one category run.
    pub fn deleter(&self, category: Category) -> Arc<dyn DeletionStrategy> {
        let direct = DirectDelete::new(DeleteOptions {
            min_age: std::time::Duration::from_secs(self.settings.min_file_age_secs),
            attempts: self.settings.retry_attempts,
            backoff: self.settings.retry_backoff(),
        });
        if !self.settings.backup.enabled {
            return Arc::new(direct);
        }
        let session = BackupSession::new(
            &self.settings.backup.resolved_dir(),
            category,
            self.settings.backup.max_file_bytes,
        );
        log::info!("backing up {} to {}", category.label(), session.dir().display());
        Arc::new(BackupThenDelete::new(direct, Arc::new(session)))
    }

    /// Build the per-file pipeline. Full classification is used while the
    /// candidate count stays within the configured limit.
    pub(crate) fn pipeline(&self, category: Category, mode: Mode, candidates: usize) -> FilePipeline {
        let gate = if !self.settings.security_checks {
            Gate::Open
        } else if candidates <= self.settings.classifier.full_classification_limit {
            Gate::Full(Arc::new(self.classifier()))
        } else {
            log::debug!(
                "{}: {candidates} candidates, using the quick filter",
                category.label()
            );
            Gate::Quick
        };
        FilePipeline {
            gate,
            deleter: self.deleter(category),
            mode,
            reject: None,
            verbose: self.settings.verbose,
        }
    }

    /// Run a sorted candidate list through the executor for `category`.
    pub(crate) fn execute(
        &self,
        category: Category,
        files: Vec<CandidateFile>,
        pipeline: FilePipeline,
    ) -> CleanupResult {
        let profile = self.settings.profile(ProfileKind::for_category(category));
        let executor = BatchExecutor::new(profile.exec, self.stop.clone());
        let run = executor.run(
            category.label(),
            files,
            move |file: &CandidateFile| pipeline.process(file),
            &self.progress,
        );
        if run.timed_out > 0 {
            log::warn!(
                "{}: {} of {} batches timed out",
                category.label(),
                run.timed_out,
                run.batches
            );
        }
        if run.stopped {
            log::info!(
                "{}: stopped after {} of {} batches",
                category.label(),
                run.completed,
                run.batches
            );
        }
        self.record_failures(run.failures);
        run.result
    }

    pub(crate) fn record_failures(&self, failures: Vec<FailedDeletion>) {
        if failures.is_empty() {
            return;
        }
        if let Ok(mut log) = self.failures.lock() {
            log.extend(failures);
        }
    }

    /// Failures grouped by kind, most frequent first.
    pub fn failure_summary(&self) -> Vec<(&'static str, usize)> {
        self.failures.lock().map(|l| l.summary()).unwrap_or_default()
    }

    /// Failures recorded since the last clear, retained or not.
    pub fn failure_total(&self) -> u64 {
        self.failures.lock().map(|l| l.total()).unwrap_or(0)
    }

    pub fn clear_failures(&self) {
        if let Ok(mut log) = self.failures.lock() {
            log.clear();
        }
    }
}

enum Gate {
    Full(Arc<SafetyClassifier>),
    Quick,
    Open,
}

/// Per-file decision chain run inside a batch: gate, then report or delete.
pub(crate) struct FilePipeline {
    gate: Gate,
    deleter: Arc<dyn DeletionStrategy>,
    mode: Mode,
    reject: Option<fn(&Path) -> bool>,
    /// Log every per-file decision.
    verbose: bool,
}

impl FilePipeline {
    /// Extra category-specific veto checked before the safety gate.
    pub(crate) fn rejecting(mut self, reject: fn(&Path) -> bool) -> Self {
        self.reject = Some(reject);
        self
    }

    fn admits(&self, file: &CandidateFile) -> bool {
        if self.reject.is_some_and(|reject| reject(&file.path)) {
            if self.verbose {
                log::debug!("rejected {}", file.path.display());
            }
            return false;
        }
        match &self.gate {
            Gate::Full(classifier) => {
                let verdict = classifier.classify(file);
                if !verdict.is_safe && self.verbose {
                    log::debug!(
                        "skipped {} ({}): {}",
                        file.path.display(),
                        verdict.level,
                        verdict.risk_factors.join(", ")
                    );
                }
                verdict.is_safe
            }
            Gate::Quick => passes_quick_filter(&file.path),
            Gate::Open => true,
        }
    }

    pub(crate) fn process(&self, file: &CandidateFile) -> ItemReport {
        if !self.admits(file) {
            return ItemReport::skipped();
        }
        let dry_run = match self.mode {
            Mode::Scan => return CleanupResult::file(file.size, false).into(),
            Mode::Clean { dry_run } => dry_run,
        };
        match self.deleter.delete(&file.path, dry_run) {
            Ok(()) => {
                if self.verbose && !dry_run {
                    log::debug!("deleted {}", file.path.display());
                }
                CleanupResult::file(file.size, !dry_run).into()
            }
            Err(err) => {
                let failure = FailedDeletion::new(file.path.clone(), &err);
                let result = if err.is_expected() {
                    log::debug!("left {}: {err}", file.path.display());
                    CleanupResult::new()
                } else {
                    log::warn!("failed to delete {}: {err}", file.path.display());
                    CleanupResult::failure(format!("{}: {err}", file.path.display()))
                };
                ItemReport {
                    result,
                    failure: Some(failure),
                }
            }
        }
    }
}

/// Files under `root` within `budget`; a file root yields itself.
pub(crate) fn candidates_under(root: &Path, budget: WalkBudget) -> Vec<CandidateFile> {
    if root.is_file() {
        return match CandidateFile::probe(root) {
            Ok(file) => vec![file],
            Err(err) => {
                log::debug!("{err}");
                Vec::new()
            }
        };
    }
    TreeWalker::new(root, budget).collect()
}

/// Drop later duplicates of a path, keeping the first occurrence.
pub(crate) fn dedup_files(files: &mut Vec<CandidateFile>) {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    files.retain(|f| seen.insert(f.path.clone()));
}

/// One runner per concrete category, in full-run order.
pub fn all_cleaners() -> Vec<Box<dyn Cleaner>> {
    Category::CONCRETE.iter().map(|&c| cleaner_for(c)).collect()
}

pub fn cleaner_for(category: Category) -> Box<dyn Cleaner> {
    match category {
        Category::DevelopmentFiles => Box::new(DevelopmentFiles),
        Category::SystemOptimization => Box::new(SystemOptimization),
        Category::RecycleBin => Box::new(RecycleBinCleaner),
        other => Box::new(PathCategory::new(other)),
    }
}

pub fn find_cleaner(name: &str) -> Option<Box<dyn Cleaner>> {
    name.parse::<Category>()
        .ok()
        .filter(|c| *c != Category::All)
        .map(cleaner_for)
}

pub fn all_cleaner_names() -> Vec<&'static str> {
    Category::CONCRETE.iter().map(|c| c.name()).collect()
}


#[cfg(test)]
mod tests {
    use super::testing::{context, old_file};
    use super::*;

    #[test]
    fn registry_covers_every_concrete_category() {
        let names = all_cleaner_names();
        assert_eq!(names.len(), 8);
        assert!(find_cleaner("temp-files").is_some());
        assert!(find_cleaner("Recycle_Bin").is_some());
        assert!(find_cleaner("all").is_none());
        assert!(find_cleaner("nope").is_none());
        for (cleaner, name) in all_cleaners().iter().zip(names) {
            assert_eq!(cleaner.name(), name);
        }
    }

    #[test]
    fn pipeline_scan_counts_without_deleting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tmp");
        old_file(&path, 10);
        let ctx = context(Category::TempFiles, Vec::new());
        let pipeline = ctx.pipeline(Category::TempFiles, Mode::Scan, 1);
        let report = pipeline.process(&CandidateFile::probe(&path).unwrap());
        assert_eq!(report.result.files_scanned, 1);
        assert_eq!(report.result.files_deleted, 0);
        assert_eq!(report.result.bytes_freed, 10);
        assert!(path.exists());
    }

    #[test]
    fn expected_failures_are_recorded_but_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.tmp");
        fs_write(&path);
        let ctx = context(Category::TempFiles, Vec::new());
        let pipeline = ctx.pipeline(Category::TempFiles, Mode::Clean { dry_run: false }, 1);
        let report = pipeline.process(&CandidateFile::probe(&path).unwrap());
        assert!(report.result.success);
        assert_eq!(report.result.files_scanned, 0);
        assert_eq!(report.failure.map(|f| f.kind), Some("Active use"));
        assert!(path.exists());
    }

    #[test]
    fn reject_hook_vetoes_before_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagefile.sys");
        old_file(&path, 4);
        let ctx = context(Category::SystemOptimization, Vec::new());
        let pipeline = ctx
            .pipeline(Category::SystemOptimization, Mode::Scan, 1)
            .rejecting(is_dangerous_system_path);
        let report = pipeline.process(&CandidateFile::probe(&path).unwrap());
        assert_eq!(report.result.files_scanned, 0);
    }

    fn fs_write(path: &Path) {
        std::fs::write(path, b"fresh").unwrap();
    }
}
