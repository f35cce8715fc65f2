use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{candidates_under, dedup_files, Mode, RunContext};
use crate::catalog::Category;
use crate::cleaner::{Cleaner, CleanupResult};
use crate::config::ProfileKind;
use crate::scoring::GeneralScorer;
use crate::security::normalized;
use crate::utils;
use crate::walker::{large_files_first, CandidateFile, TreeWalker, WalkBudget};

/// Files at least this large are taken first from system locations.
const LARGE_FILE_BYTES: u64 = 100 * 1024;
/// Below this many large files, a shallow walk tops up the list.
const TOP_UP_BELOW: usize = 100;
const TOP_UP_DEPTH: usize = 3;

const SYSTEM_MARKERS: &[&str] = &[
    "/windows/",
    "/programdata/",
    "/program files",
    "/var/log",
    "/var/tmp",
    "/var/cache",
    "/library/logs",
];

/// A category driven entirely by its catalog templates: temp files,
/// browser caches, system files, media and gaming caches.
pub struct PathCategory {
    category: Category,
}

impl PathCategory {
    pub fn new(category: Category) -> Self {
        Self { category }
    }

    fn run(&self, ctx: &RunContext, mode: Mode) -> CleanupResult {
        let label = self.category.label();
        let templates = ctx.catalog.templates(self.category);
        if templates.is_empty() {
            return CleanupResult::failure(format!("No paths defined for {label}"));
        }

        let present = ctx.expander.prioritize(ctx.expander.expand(&templates));
        log::info!(
            "{label}: {} of {} locations present",
            present.len(),
            templates.len()
        );
        if present.is_empty() {
            return CleanupResult::new();
        }

        let budget = ctx.settings.profile(ProfileKind::for_category(self.category)).walk;
        let mut roots: Vec<PathBuf> = Vec::new();
        let mut files: Vec<CandidateFile> = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        'templates: for template in &present {
            for root in ctx.expander.resolve(template) {
                if ctx.stop.is_set() {
                    break 'templates;
                }
                if !seen.insert(root.clone()) {
                    continue;
                }
                let found = if root.is_dir() && self.is_system_location(&root) {
                    system_candidates(&root, budget)
                } else {
                    candidates_under(&root, budget)
                };
                log::debug!("{}: {} candidates", root.display(), found.len());
                if root.is_dir() {
                    roots.push(root);
                }
                files.extend(found);
            }
        }
        dedup_files(&mut files);
        if files.is_empty() {
            return CleanupResult::new();
        }

        let scorer = GeneralScorer;
        files.sort_by_cached_key(|f| Reverse(scorer.sort_key(f)));

        let pipeline = ctx.pipeline(self.category, mode, files.len());
        let result = ctx.execute(self.category, files, pipeline);

        if mode.deletes() && result.files_deleted > 0 && ctx.settings.remove_empty_dirs {
            let removed: usize = roots.iter().map(|r| utils::remove_empty_dirs(r)).sum();
            if removed > 0 {
                log::debug!("{label}: removed {removed} empty directories");
            }
        }
        result
    }

    fn is_system_location(&self, root: &Path) -> bool {
        if self.category == Category::SystemFiles {
            return true;
        }
        let s = normalized(root);
        SYSTEM_MARKERS.iter().any(|m| s.contains(m))
    }
}

impl Cleaner for PathCategory {
    fn category(&self) -> Category {
        self.category
    }

    fn scan(&self, ctx: &RunContext) -> CleanupResult {
        self.run(ctx, Mode::Scan)
    }

    fn clean(&self, ctx: &RunContext) -> CleanupResult {
        self.run(ctx, ctx.clean_mode())
    }
}

/// Large files of the directory itself first, then a shallow walk when
/// there are few of them.
fn system_candidates(root: &Path, budget: WalkBudget) -> Vec<CandidateFile> {
    let mut files = large_files_first(root, LARGE_FILE_BYTES);
    if files.len() < TOP_UP_BELOW {
        let depth = budget.max_depth.min(TOP_UP_DEPTH);
        files.extend(TreeWalker::bounded(root, WalkBudget::new(budget.max_files, depth)));
        dedup_files(&mut files);
    }
    files.truncate(budget.max_files);
    files
}

#[cfg(test)]
mod tests {
    use super::super::testing::{context, old_file};
    use super::*;
    use std::fs;

    fn template(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn no_templates_is_a_failure() {
        let ctx = context(Category::MediaFiles, Vec::new());
        let result = PathCategory::new(Category::MediaFiles).scan(&ctx);
        assert!(!result.success);
        assert!(result.error_message.contains("No paths defined"));
    }

    #[test]
    fn missing_locations_scan_clean() {
        let ctx = context(
            Category::TempFiles,
            vec!["/definitely/missing/reclaim-*".to_string()],
        );
        let result = PathCategory::new(Category::TempFiles).scan(&ctx);
        assert!(result.success);
        assert_eq!(result.files_scanned, 0);
        assert_eq!(result.bytes_freed, 0);
    }

    #[test]
    fn clean_deletes_old_files_and_prunes_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        old_file(&dir.path().join("a.tmp"), 100);
        old_file(&dir.path().join("nested/b.log"), 50);

        let ctx = context(Category::TempFiles, vec![template(dir.path())]);
        let result = PathCategory::new(Category::TempFiles).clean(&ctx);
        assert!(result.success, "{}", result.error_message);
        assert_eq!(result.files_scanned, 2);
        assert_eq!(result.files_deleted, 2);
        assert_eq!(result.bytes_freed, 150);
        assert!(dir.path().exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn overlapping_templates_count_files_once() {
        let dir = tempfile::tempdir().unwrap();
        old_file(&dir.path().join("sub/a.tmp"), 10);
        let ctx = context(
            Category::BrowserCache,
            vec![template(dir.path()), template(&dir.path().join("sub"))],
        );
        let result = PathCategory::new(Category::BrowserCache).scan(&ctx);
        assert_eq!(result.files_scanned, 1);
        assert!(dir.path().join("sub/a.tmp").exists());
    }

    #[test]
    fn large_candidate_sets_fall_back_to_the_quick_filter() {
        let dir = tempfile::tempdir().unwrap();
        old_file(&dir.path().join("drivers_cache.tmp"), 20);
        old_file(&dir.path().join("plain.tmp"), 30);

        let mut ctx = context(Category::TempFiles, vec![template(dir.path())]);
        let full = PathCategory::new(Category::TempFiles).scan(&ctx);
        assert_eq!(full.files_scanned, 2);

        ctx.settings.classifier.full_classification_limit = 0;
        let quick = PathCategory::new(Category::TempFiles).scan(&ctx);
        assert_eq!(quick.files_scanned, 1);
        assert_eq!(quick.bytes_freed, 30);
    }

    #[test]
    fn system_candidates_put_large_files_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("small.log"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("big.log"), vec![0u8; 200 * 1024]).unwrap();
        let files = system_candidates(dir.path(), WalkBudget::new(100, 4));
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("big.log"));
    }
}
