use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{Mode, RunContext};
use crate::catalog::Category;
use crate::cleaner::{Cleaner, CleanupResult};
use crate::config::{OptimizationMode, ProfileKind};
use crate::scoring::{OptimizationScorer, OptimizationTier, PriorityScorer};
use crate::security::normalized;
use crate::walker::{CandidateFile, TreeWalker, WalkBudget};

/// Registry hives, paging files and boot loaders. Never candidates, whatever
/// template they were found under.
const DANGEROUS_PATHS: &[&str] = &[
    "system32/config/sam",
    "system32/config/system",
    "system32/config/software",
    "system32/config/security",
    "system32/config/default",
    "pagefile.sys",
    "hiberfil.sys",
    "swapfile.sys",
    "bootmgr",
    "ntldr",
    "boot.ini",
];

pub fn is_dangerous_system_path(path: &Path) -> bool {
    let s = normalized(path);
    DANGEROUS_PATHS.iter().any(|d| s.contains(d))
}

/// Tiers processed under each mode, most valuable first.
pub fn tiers_for_mode(mode: OptimizationMode) -> &'static [OptimizationTier] {
    use OptimizationTier::*;
    match mode {
        OptimizationMode::Conservative => &[Critical],
        OptimizationMode::Standard => &[Critical, High],
        OptimizationMode::Aggressive => &[Critical, High, Medium],
        OptimizationMode::Expert => &[Critical, High, Medium, Low],
    }
}

pub struct SystemOptimization;

impl SystemOptimization {
    fn run(&self, ctx: &RunContext, mode: Mode) -> CleanupResult {
        let category = Category::SystemOptimization;
        let templates = ctx.catalog.templates(category);
        if templates.is_empty() {
            return CleanupResult::failure("No paths defined for System Optimization");
        }

        let tiers = tiers_for_mode(ctx.settings.optimization_mode);
        let mut grouped: Vec<(OptimizationTier, Vec<String>)> =
            tiers.iter().map(|&t| (t, Vec::new())).collect();
        for template in templates {
            match OptimizationTier::of_template(&template) {
                Some(tier) => {
                    if let Some((_, list)) = grouped.iter_mut().find(|(t, _)| *t == tier) {
                        list.push(template);
                    }
                }
                None => log::debug!("no optimization tier for {template}"),
            }
        }

        let budget = ctx.settings.profile(ProfileKind::Optimization).walk;
        let scorer = OptimizationScorer;
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut total = CleanupResult::new();

        for (tier, list) in grouped {
            if ctx.stop.is_set() {
                break;
            }
            let present = ctx.expander.prioritize(ctx.expander.expand(&list));
            if present.is_empty() {
                continue;
            }

            let walk = WalkBudget::new(budget.max_files, tier.walk_depth());
            let mut scored: Vec<(u64, CandidateFile)> = Vec::new();
            for template in &present {
                for root in ctx.expander.resolve(template) {
                    if is_dangerous_system_path(&root) {
                        continue;
                    }
                    let found: Vec<CandidateFile> = if root.is_file() {
                        CandidateFile::probe(&root).into_iter().collect()
                    } else {
                        TreeWalker::bounded(&root, walk).collect()
                    };
                    for file in found {
                        if file.size == 0
                            || is_dangerous_system_path(&file.path)
                            || !seen.insert(file.path.clone())
                        {
                            continue;
                        }
                        let score = scorer.score(&file);
                        if score >= tier.threshold() {
                            scored.push((score, file));
                        }
                    }
                }
            }
            log::info!(
                "System Optimization: {} {} tier candidates",
                scored.len(),
                tier.label()
            );
            if scored.is_empty() {
                continue;
            }

            scored.sort_by_key(|(score, _)| Reverse(*score));
            let files: Vec<CandidateFile> = scored.into_iter().map(|(_, f)| f).collect();
            let pipeline = ctx
                .pipeline(category, mode, files.len())
                .rejecting(is_dangerous_system_path);
            total.merge(ctx.execute(category, files, pipeline));
        }
        total
    }
}

impl Cleaner for SystemOptimization {
    fn category(&self) -> Category {
        Category::SystemOptimization
    }

    fn scan(&self, ctx: &RunContext) -> CleanupResult {
        self.run(ctx, Mode::Scan)
    }

    fn clean(&self, ctx: &RunContext) -> CleanupResult {
        self.run(ctx, ctx.clean_mode())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{context, old_file};
    use super::*;

    #[test]
    fn modes_widen_monotonically() {
        let mut previous = 0;
        for mode in [
            OptimizationMode::Conservative,
            OptimizationMode::Standard,
            OptimizationMode::Aggressive,
            OptimizationMode::Expert,
        ] {
            let tiers = tiers_for_mode(mode);
            assert_eq!(tiers[0], OptimizationTier::Critical);
            assert!(tiers.len() > previous);
            previous = tiers.len();
        }
    }

    #[test]
    fn dangerous_paths_are_recognised() {
        assert!(is_dangerous_system_path(Path::new(r"C:\pagefile.sys")));
        assert!(is_dangerous_system_path(Path::new(
            "/mnt/c/Windows/System32/config/SAM"
        )));
        assert!(!is_dangerous_system_path(Path::new("/var/log/syslog.1")));
    }

    #[test]
    fn conservative_mode_skips_lower_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let backup = dir.path().join("backup");
        old_file(&logs.join("app.log"), 64);
        old_file(&logs.join("pagefile.sys"), 64);
        old_file(&logs.join("empty.log"), 0);
        old_file(&backup.join("old.bak"), 64);

        let mut ctx = context(
            Category::SystemOptimization,
            vec![
                logs.to_string_lossy().into_owned(),
                backup.to_string_lossy().into_owned(),
            ],
        );
        ctx.settings.optimization_mode = OptimizationMode::Conservative;

        let result = SystemOptimization.scan(&ctx);
        assert!(result.success, "{}", result.error_message);
        assert_eq!(result.files_scanned, 1);
        assert_eq!(result.bytes_freed, 64);
    }
}
