//! Desirability-to-delete scores.
//!
//! Each scorer is used by exactly one family of categories to order its own
//! candidates. Scores from different scorers are not comparable.

use std::path::Path;
use std::sync::LazyLock;

use glob::{MatchOptions, Pattern};

use crate::security::normalized;
use crate::walker::CandidateFile;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;

pub trait PriorityScorer: Send + Sync {
    fn score(&self, file: &CandidateFile) -> u64;
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Extension tier, location keywords and size.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneralScorer;

impl GeneralScorer {
    const HIGH: &'static [&'static str] = &["tmp", "temp", "cache", "log", "bak", "old"];
    const MEDIUM: &'static [&'static str] = &["dmp", "evtx", "etl", "blf", "regtrans-ms"];
    const LOW: &'static [&'static str] = &["db", "dat", "idx", "lock"];

    /// Score plus one point per MiB, used to order general cleanup batches.
    pub fn sort_key(&self, file: &CandidateFile) -> u64 {
        self.score(file) + file.size / MB
    }
}

impl PriorityScorer for GeneralScorer {
    fn score(&self, file: &CandidateFile) -> u64 {
        let ext = extension(&file.path);
        let path = normalized(&file.path);
        let mut score = 0;

        if Self::HIGH.contains(&ext.as_str()) {
            score += 100;
        } else if Self::MEDIUM.contains(&ext.as_str()) {
            score += 50;
        } else if Self::LOW.contains(&ext.as_str()) {
            score += 25;
        }

        if path.contains("temp") || path.contains("cache") {
            score += 30;
        }
        if path.contains("log") {
            score += 20;
        }
        if path.contains("old") || path.contains("backup") {
            score += 15;
        }

        score += match file.size {
            s if s > 10 * MB => 50,
            s if s > MB => 25,
            s if s > 100 * KB => 10,
            _ => 0,
        };
        score
    }
}

const LARGE_PACKAGE_PATTERNS: &[&str] = &[
    "*.nupkg", "*.jar", "*.war", "*.aar", "*.tgz", "*.tar.gz", "*.whl", "*.egg", "*.gem",
    "*.vsix", "*.dmg", "*.iso", "*.deb", "*.rpm",
];

static LARGE_PACKAGES: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    LARGE_PACKAGE_PATTERNS
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
});

/// Cache locations by tier, written with backslashes as in the catalog.
const DEV_CACHE_TIERS: &[(u64, &[&str])] = &[
    (
        150,
        &[
            r"node_modules\.cache",
            "__pycache__",
            r".gradle\caches",
            r"bin\Debug",
            r"bin\Release",
            "obj",
            r"target\debug",
            r"target\release",
        ],
    ),
    (
        100,
        &[
            r".vscode\extensions",
            r".idea\caches",
            r"Library\Cache",
            ".pub-cache",
            r"vendor\cache",
        ],
    ),
    (50, &[r".git\objects", "logs", "temp"]),
];

const DEV_INDICATORS: &[&str] = &[
    "cache",
    "temp",
    "tmp",
    "build",
    "dist",
    "target",
    "bin",
    "obj",
    "node_modules",
    "__pycache__",
    ".gradle",
    "logs",
    "debug",
    "release",
];

/// Package archives, tiered cache locations and build-output indicators.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevelopmentScorer;

impl PriorityScorer for DevelopmentScorer {
    fn score(&self, file: &CandidateFile) -> u64 {
        let path = normalized(&file.path);
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let mut score = 0;

        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        if LARGE_PACKAGES.iter().any(|p| p.matches_with(&name, options)) {
            score += 200;
        }

        for (points, patterns) in DEV_CACHE_TIERS {
            let hit = patterns
                .iter()
                .any(|p| path.contains(&p.replace('\\', "/").to_lowercase()));
            if hit {
                score += points;
            }
        }

        score += 75 * DEV_INDICATORS.iter().filter(|i| path.contains(*i)).count() as u64;

        score += match file.size {
            s if s > 50 * MB => 100,
            s if s > 10 * MB => 75,
            s if s > MB => 50,
            _ => 0,
        };
        score
    }
}

/// Weight classes of the system-optimization catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptimizationTier {
    Critical,
    High,
    Medium,
    Low,
}

impl OptimizationTier {
    pub const ALL: [OptimizationTier; 4] = [
        OptimizationTier::Critical,
        OptimizationTier::High,
        OptimizationTier::Medium,
        OptimizationTier::Low,
    ];

    pub fn weight(self) -> u64 {
        match self {
            OptimizationTier::Critical => 300,
            OptimizationTier::High => 200,
            OptimizationTier::Medium => 100,
            OptimizationTier::Low => 50,
        }
    }

    /// Minimum file score for a file found under a template of this tier.
    pub fn threshold(self) -> u64 {
        match self {
            OptimizationTier::Critical => 200,
            OptimizationTier::High => 150,
            OptimizationTier::Medium => 100,
            OptimizationTier::Low => 50,
        }
    }

    /// Walk depth for templates of this tier.
    pub fn walk_depth(self) -> usize {
        match self {
            OptimizationTier::Critical | OptimizationTier::High => 4,
            OptimizationTier::Medium | OptimizationTier::Low => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OptimizationTier::Critical => "critical",
            OptimizationTier::High => "high",
            OptimizationTier::Medium => "medium",
            OptimizationTier::Low => "low",
        }
    }

    fn groups(self) -> &'static [OptimizationGroup] {
        use OptimizationGroup::*;
        match self {
            OptimizationTier::Critical => &[Prefetch, Thumbnail, IconCache, LogFiles, CrashDumps],
            OptimizationTier::High => &[SearchIndex, UpdateCache, ErrorReports, TempInstaller, DriverCache],
            OptimizationTier::Medium => &[FontCache, RegistryBackup, EventLogs, PerformanceLogs, NetworkCache],
            OptimizationTier::Low => &[BackupFiles, ActivationCache, MediaCache, RecentFiles],
        }
    }

    /// Highest tier whose keyword list matches a catalog template.
    pub fn of_template(template: &str) -> Option<Self> {
        let t = template.replace('\\', "/").to_lowercase();
        Self::ALL.into_iter().find(|tier| {
            tier.groups()
                .iter()
                .any(|g| g.template_keywords().iter().any(|k| t.contains(k)))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptimizationGroup {
    Prefetch,
    Thumbnail,
    IconCache,
    LogFiles,
    CrashDumps,
    SearchIndex,
    UpdateCache,
    ErrorReports,
    TempInstaller,
    DriverCache,
    FontCache,
    RegistryBackup,
    EventLogs,
    PerformanceLogs,
    NetworkCache,
    BackupFiles,
    ActivationCache,
    MediaCache,
    RecentFiles,
}

impl OptimizationGroup {
    /// Substrings that place a concrete file in this group.
    fn file_patterns(self) -> &'static [&'static str] {
        use OptimizationGroup::*;
        match self {
            Prefetch => &["prefetch", ".pf"],
            Thumbnail => &["thumbcache", "thumbnail"],
            IconCache => &["iconcache", "fntcache"],
            LogFiles => &[".log", "logs", "/logfiles/"],
            CrashDumps => &[".dmp", "minidump", "crashdumps"],
            SearchIndex => &["search", "webcache"],
            UpdateCache => &["softwaredistribution", "windowsupdate"],
            ErrorReports => &["wer", "reportqueue"],
            TempInstaller => &["installer", "msi"],
            DriverCache => &["driverstore", "inf"],
            FontCache => &["fontcache", "fntcache"],
            RegistryBackup => &["regback", "txr"],
            EventLogs => &[".evtx", "winevt"],
            PerformanceLogs => &[".etl", "wmi", "wdi"],
            NetworkCache => &["inetcache", "iecompat"],
            BackupFiles => &["backup", ".bak"],
            ActivationCache => &["spp", "softwareprotection"],
            MediaCache => &["media player", "wmdb"],
            RecentFiles => &["recent", "automaticdestinations"],
        }
    }

    /// Substrings that place a catalog template in this group.
    fn template_keywords(self) -> &'static [&'static str] {
        use OptimizationGroup::*;
        match self {
            Prefetch => &["prefetch"],
            Thumbnail => &["thumbcache", "thumbnail"],
            IconCache => &["iconcache", "fntcache"],
            LogFiles => &["logs", ".log"],
            CrashDumps => &["minidump", "crashdumps", ".dmp", "crash"],
            SearchIndex => &["search", "webcache"],
            UpdateCache => &["softwaredistribution", "windowsupdate"],
            ErrorReports => &["wer", "reportqueue", "diagnosticreports"],
            TempInstaller => &["installer", "msi"],
            DriverCache => &["driverstore", "inf"],
            FontCache => &["fontcache", "fontconfig"],
            RegistryBackup => &["regback", "txr"],
            EventLogs => &["winevt", ".evtx"],
            PerformanceLogs => &["wmi", "wdi", ".etl"],
            NetworkCache => &["inetcache", "iecompat"],
            BackupFiles => &["backup"],
            ActivationCache => &["spp"],
            MediaCache => &["media player"],
            RecentFiles => &["recent", "automaticdestinations"],
        }
    }
}

/// Weighted optimization groups, size and a few disposable extensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptimizationScorer;

impl PriorityScorer for OptimizationScorer {
    fn score(&self, file: &CandidateFile) -> u64 {
        let path = normalized(&file.path);
        let mut score = 0;

        for tier in OptimizationTier::ALL {
            let hit = tier
                .groups()
                .iter()
                .any(|g| g.file_patterns().iter().any(|p| path.contains(p)));
            if hit {
                score += tier.weight();
            }
        }

        score += match file.size {
            s if s > 100 * MB => 150,
            s if s > 10 * MB => 100,
            s if s > MB => 50,
            _ => 0,
        };

        if matches!(extension(&file.path).as_str(), "log" | "tmp" | "dmp" | "etl" | "pf") {
            score += 75;
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn candidate(path: &str, size: u64) -> CandidateFile {
        CandidateFile {
            path: PathBuf::from(path),
            size,
            modified: None,
            accessed: None,
        }
    }

    #[test]
    fn general_score_adds_every_component() {
        let s = GeneralScorer;
        // ext 100 + temp 30 + log 20 + size 50
        assert_eq!(s.score(&candidate("/var/temp/app.log", 20 * MB)), 200);
        // ext 50, nothing else
        assert_eq!(s.score(&candidate("/data/crash.dmp", 10)), 50);
        assert_eq!(s.score(&candidate("/x/y/z", 0)), 0);
        assert_eq!(s.sort_key(&candidate("/x/y/z", 3 * MB)), 25 + 3);
    }

    #[test]
    fn development_tiers_count_once_indicators_stack() {
        let s = DevelopmentScorer;
        // package 200 + no tier + "build" 75
        assert_eq!(s.score(&candidate("/p/build/lib.whl", 10)), 275);
        // high tier 150, indicators "cache" and "__pycache__" 150
        assert_eq!(s.score(&candidate("/p/__pycache__/m.pyc", 10)), 150 + 150);
        assert_eq!(
            s.score(&candidate("/p/target/release/app.bin", 60 * MB)),
            150 + 75 * 3 + 100
        );
    }

    #[test]
    fn optimization_weights_each_tier_once() {
        let s = OptimizationScorer;
        // prefetch (critical 300) + .pf ext 75
        assert_eq!(s.score(&candidate("/win/Prefetch/APP.pf", 10)), 375);
        // log_files critical 300 + backup_files low 50 + .log 75
        assert_eq!(s.score(&candidate("/backup/x.log", 10)), 425);
    }

    #[test]
    fn scores_are_never_negative_for_odd_inputs() {
        let scorers: [&dyn PriorityScorer; 3] = [&GeneralScorer, &DevelopmentScorer, &OptimizationScorer];
        for path in ["", "/", "noext", "/a/.hidden", "/UPPER/CASE.TMP"] {
            for s in scorers {
                let _ = s.score(&candidate(path, u64::MAX / 4));
            }
        }
    }

    #[test]
    fn templates_land_in_their_highest_tier() {
        assert_eq!(
            OptimizationTier::of_template(r"%WINDIR%\Prefetch\*.pf"),
            Some(OptimizationTier::Critical)
        );
        assert_eq!(
            OptimizationTier::of_template(r"%WINDIR%\SoftwareDistribution\Download\*"),
            Some(OptimizationTier::High)
        );
        assert_eq!(
            OptimizationTier::of_template(r"%LOCALAPPDATA%\Microsoft\Windows\INetCache\*"),
            Some(OptimizationTier::Medium)
        );
        assert_eq!(
            OptimizationTier::of_template(r"%LOCALAPPDATA%\D3DSCache\*"),
            None
        );
    }
}
