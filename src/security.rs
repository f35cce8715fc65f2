//! Per-file safety classification.
//!
//! Seven independent checks each contribute risk factors and a minimum
//! [`SecurityLevel`]; the verdict takes the most restrictive. Every check runs
//! even after one has already forced `Critical`, so the verdict lists every
//! reason. Probe failures fail closed.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};

use regex::RegexSet;

use crate::config::ClassifierSettings;
use crate::error::ProbeError;
use crate::processes::OpenFileProbe;
use crate::utils::format_size;
use crate::walker::CandidateFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityLevel {
    Safe,
    Moderate,
    HighRisk,
    Critical,
}

impl SecurityLevel {
    /// Safe and Moderate files may be deleted.
    pub fn is_deletable(self) -> bool {
        self <= SecurityLevel::Moderate
    }

    pub fn label(self) -> &'static str {
        match self {
            SecurityLevel::Safe => "safe",
            SecurityLevel::Moderate => "moderate",
            SecurityLevel::HighRisk => "high risk",
            SecurityLevel::Critical => "critical",
        }
    }

    fn recommendations(self) -> Vec<String> {
        let lines: &[&str] = match self {
            SecurityLevel::Safe => &["Safe to delete without backup"],
            SecurityLevel::Moderate => &[
                "Safe to delete with backup",
                "Verify file is not needed before deletion",
            ],
            SecurityLevel::HighRisk => &[
                "Requires special handling",
                "Create backup before any action",
                "Manual verification recommended",
            ],
            SecurityLevel::Critical => &["DO NOT DELETE", "Critical system file or high-risk content"],
        };
        lines.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityVerdict {
    pub is_safe: bool,
    pub level: SecurityLevel,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
}

impl SecurityVerdict {
    fn new(level: SecurityLevel, risk_factors: Vec<String>) -> Self {
        Self {
            is_safe: level.is_deletable(),
            level,
            risk_factors,
            recommendations: level.recommendations(),
        }
    }

    fn critical(reason: impl Into<String>) -> Self {
        Self::new(SecurityLevel::Critical, vec![reason.into()])
    }
}

/// OS-critical directory roots. Matched case-insensitively on separator boundaries.
const CRITICAL_DIRS: &[&str] = &[
    r"C:\Windows\System32",
    r"C:\Windows\SysWOW64",
    r"C:\Windows\Boot",
    r"C:\Windows\Microsoft.NET",
    r"C:\Windows\assembly",
    r"C:\Windows\WinSxS",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/usr/lib",
    "/lib",
    "/lib64",
    "/boot",
    "/etc",
    "/System",
];

const CRITICAL_NAME_PATTERNS: &[&str] = &[
    r".*\.exe$",
    r".*\.dll$",
    r".*\.sys$",
    r".*\.ini$",
    r".*\.cfg$",
    r".*\.reg$",
    r".*boot.*",
    r".*system.*",
    r".*ntuser.*",
];

static CRITICAL_NAMES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(CRITICAL_NAME_PATTERNS.iter().map(|p| format!("(?i)^{p}")))
        .expect("critical name patterns are valid")
});

const HIGH_RISK_EXTENSIONS: &[&str] = &[
    "exe", "dll", "sys", "bat", "cmd", "ps1", "vbs", "js", "jar", "msi", "reg", "inf",
];

const SAFE_EXTENSIONS: &[&str] = &[
    "tmp", "temp", "log", "bak", "old", "cache", "cookies", "history", "chk", "gid", "dmp",
];

const CONFIG_KEYWORDS: &[&str] = &[
    "config", "setting", "registry", "key=", "value=", "password", "token", "secret", "api_key",
];

/// Substrings that reject a path outright in the quick pre-filter.
const QUICK_DENY: &[&str] = &[
    "system32",
    "syswow64",
    "drivers",
    "boot",
    "recovery",
    "windows/system",
    "program files",
    "programdata",
    ".exe",
    ".dll",
    ".sys",
    ".ini",
    ".cfg",
];

const SNIFF_BYTES: usize = 1024;

/// Lower-cased, forward-slash form used for every substring/prefix test.
pub(crate) fn normalized(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

/// Cheap substring gate for high-throughput paths. `true` means "may proceed".
pub fn passes_quick_filter(path: &Path) -> bool {
    let s = normalized(path);
    !QUICK_DENY.iter().any(|d| s.contains(d))
}

#[derive(Default)]
struct Assessment {
    level: Option<SecurityLevel>,
    factors: Vec<String>,
}

impl Assessment {
    fn raise(&mut self, level: SecurityLevel, factor: String) {
        self.level = Some(self.level.map_or(level, |l| l.max(level)));
        self.factors.push(factor);
    }

    fn finish(self) -> SecurityVerdict {
        SecurityVerdict::new(self.level.unwrap_or(SecurityLevel::Safe), self.factors)
    }
}

pub struct SafetyClassifier {
    settings: ClassifierSettings,
    open_files: Arc<dyn OpenFileProbe>,
    critical_dirs: Vec<String>,
}

impl SafetyClassifier {
    pub fn new(settings: ClassifierSettings, open_files: Arc<dyn OpenFileProbe>) -> Self {
        let critical_dirs = CRITICAL_DIRS
            .iter()
            .map(|d| normalized(Path::new(d)))
            .collect();
        Self {
            settings,
            open_files,
            critical_dirs,
        }
    }

    /// Classify a candidate against its current on-disk state.
    pub fn classify(&self, file: &CandidateFile) -> SecurityVerdict {
        self.classify_path(&file.path)
    }

    pub fn classify_path(&self, path: &Path) -> SecurityVerdict {
        let fresh = match CandidateFile::probe(path) {
            Ok(f) => f,
            Err(ProbeError::NotFound { .. }) => return SecurityVerdict::critical("File does not exist"),
            Err(ProbeError::NotAFile { .. }) => return SecurityVerdict::critical("Path is not a file"),
            Err(err) => {
                log::warn!("security check failed for {}: {err}", path.display());
                return SecurityVerdict::critical(format!("Security check error: {err}"));
            }
        };

        let mut a = Assessment::default();
        self.check_critical_dirs(&fresh.path, &mut a);
        self.check_critical_names(&fresh.path, &mut a);
        self.check_extension(&fresh.path, &mut a);
        self.check_age(&fresh, &mut a);
        self.check_size(&fresh, &mut a);
        self.check_in_use(&fresh.path, &mut a);
        self.check_content(&fresh, &mut a);
        a.finish()
    }

    fn check_critical_dirs(&self, path: &Path, a: &mut Assessment) {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let s = normalized(&absolute);
        for (dir, original) in self.critical_dirs.iter().zip(CRITICAL_DIRS) {
            let inside = s
                .strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
            if inside {
                a.raise(
                    SecurityLevel::Critical,
                    format!("File in critical system directory: {original}"),
                );
            }
        }
    }

    fn check_critical_names(&self, path: &Path, a: &mut Assessment) {
        let name = file_name(path);
        for idx in CRITICAL_NAMES.matches(&name).iter() {
            a.raise(
                SecurityLevel::Critical,
                format!("Matches critical pattern: {}", CRITICAL_NAME_PATTERNS[idx]),
            );
        }
    }

    fn check_extension(&self, path: &Path, a: &mut Assessment) {
        match extension(path) {
            None => a.raise(SecurityLevel::Moderate, "No file extension".to_string()),
            Some(ext) if HIGH_RISK_EXTENSIONS.contains(&ext.as_str()) => {
                a.raise(SecurityLevel::HighRisk, format!("High-risk extension: .{ext}"))
            }
            Some(ext) if SAFE_EXTENSIONS.contains(&ext.as_str()) => {}
            Some(ext) => a.raise(SecurityLevel::Moderate, format!("Unknown extension: .{ext}")),
        }
    }

    fn check_age(&self, file: &CandidateFile, a: &mut Assessment) {
        let min_age = Duration::from_secs(self.settings.min_age_secs);
        let recent = Duration::from_secs(self.settings.recent_access_secs);

        match file.modified.map(age) {
            Some(modified) if modified < min_age => a.raise(
                SecurityLevel::Moderate,
                format!("File too recent: {:.1} minutes old", modified.as_secs_f64() / 60.0),
            ),
            Some(_) => {}
            None => a.raise(
                SecurityLevel::Moderate,
                "Modification time unavailable".to_string(),
            ),
        }
        if let Some(accessed) = file.accessed.map(age) {
            if accessed < recent {
                a.raise(
                    SecurityLevel::Moderate,
                    format!(
                        "File recently accessed: {:.1} minutes ago",
                        accessed.as_secs_f64() / 60.0
                    ),
                );
            }
        }
    }

    fn check_size(&self, file: &CandidateFile, a: &mut Assessment) {
        if file.size > self.settings.large_file_bytes {
            a.raise(
                SecurityLevel::Moderate,
                format!("Large file size: {}", format_size(file.size)),
            );
        } else if file.size == 0 {
            a.raise(SecurityLevel::Moderate, "Empty file".to_string());
        }
    }

    fn check_in_use(&self, path: &Path, a: &mut Assessment) {
        if let Some(holder) = self.open_files.holder(path) {
            a.raise(SecurityLevel::HighRisk, format!("File in use by process: {holder}"));
        }
    }

    fn check_content(&self, file: &CandidateFile, a: &mut Assessment) {
        if file.size > self.settings.sniff_limit_bytes {
            return;
        }
        let text = match sniff_text(&file.path) {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(err) => {
                log::debug!("content check skipped for {}: {err}", file.path.display());
                return;
            }
        };
        let lower = text.to_lowercase();
        if let Some(keyword) = CONFIG_KEYWORDS.iter().find(|k| lower.contains(*k)) {
            a.raise(
                SecurityLevel::Moderate,
                format!("Contains {keyword}-like content"),
            );
        }
    }
}

fn age(t: SystemTime) -> Duration {
    SystemTime::now().duration_since(t).unwrap_or(Duration::ZERO)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
}

/// First KiB as text, or `None` when the bytes are not UTF-8.
/// A multi-byte sequence cut at the boundary still counts as text.
fn sniff_text(path: &Path) -> std::io::Result<Option<String>> {
    let mut buf = Vec::with_capacity(SNIFF_BYTES);
    File::open(path)?
        .take(SNIFF_BYTES as u64)
        .read_to_end(&mut buf)?;
    match std::str::from_utf8(&buf) {
        Ok(s) => Ok(Some(s.to_string())),
        Err(e) if e.error_len().is_none() => {
            Ok(Some(String::from_utf8_lossy(&buf[..e.valid_up_to()]).into_owned()))
        }
        Err(_) => Ok(None),
    }
}

/// Aggregate view over many verdicts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecuritySummary {
    pub total: usize,
    pub safe: usize,
    pub moderate: usize,
    pub high_risk: usize,
    pub critical: usize,
    /// Risk factors with their counts, most common first.
    pub common_risk_factors: Vec<(String, usize)>,
    pub recommendations: Vec<String>,
}

impl SecuritySummary {
    pub fn from_verdicts<'a>(verdicts: impl IntoIterator<Item = &'a SecurityVerdict>) -> Self {
        let mut summary = Self::default();
        let mut factors: HashMap<String, usize> = HashMap::new();
        for verdict in verdicts {
            summary.total += 1;
            match verdict.level {
                SecurityLevel::Safe => summary.safe += 1,
                SecurityLevel::Moderate => summary.moderate += 1,
                SecurityLevel::HighRisk => summary.high_risk += 1,
                SecurityLevel::Critical => summary.critical += 1,
            }
            for factor in &verdict.risk_factors {
                *factors.entry(factor.clone()).or_default() += 1;
            }
        }
        let mut common: Vec<_> = factors.into_iter().collect();
        common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        summary.common_risk_factors = common;

        if summary.critical > 0 {
            summary
                .recommendations
                .push("Review critical files before any operations".to_string());
        }
        if summary.high_risk > 0 {
            summary
                .recommendations
                .push("Handle high-risk files with extra caution".to_string());
        }
        if summary.moderate > 0 {
            summary
                .recommendations
                .push("Use backup for moderate-risk files".to_string());
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::OpenFileIndex;
    use std::fs;

    fn classifier(index: OpenFileIndex) -> SafetyClassifier {
        SafetyClassifier::new(ClassifierSettings::default(), Arc::new(index))
    }

    fn write_aged(path: &Path, contents: &[u8]) {
        fs::write(path, contents).unwrap();
        let old = SystemTime::now() - Duration::from_secs(2 * 3600);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_times(fs::FileTimes::new().set_modified(old).set_accessed(old))
            .unwrap();
    }

    #[test]
    fn old_temp_file_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leftover.tmp");
        write_aged(&path, b"scratch data");

        let verdict = classifier(OpenFileIndex::empty()).classify_path(&path);
        assert_eq!(verdict.level, SecurityLevel::Safe, "{:?}", verdict.risk_factors);
        assert!(verdict.is_safe);
        assert_eq!(verdict.recommendations, vec!["Safe to delete without backup"]);
    }

    #[test]
    fn ntuser_is_critical_regardless_of_age_or_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NTUSER.DAT");
        write_aged(&path, b"hive");

        let verdict = classifier(OpenFileIndex::empty()).classify_path(&path);
        assert_eq!(verdict.level, SecurityLevel::Critical);
        assert!(!verdict.is_safe);
        assert!(verdict
            .risk_factors
            .iter()
            .any(|f| f.contains("ntuser")));
        // later checks still ran
        assert!(verdict.risk_factors.iter().any(|f| f.contains("Unknown extension")));
    }

    #[test]
    fn fresh_unknown_and_config_like_files_are_moderate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, b"api_key = hunter2").unwrap();

        let verdict = classifier(OpenFileIndex::empty()).classify_path(&path);
        assert_eq!(verdict.level, SecurityLevel::Moderate);
        assert!(verdict.is_safe);
        let joined = verdict.risk_factors.join("|");
        assert!(joined.contains("Unknown extension: .md"));
        assert!(joined.contains("File too recent"));
        assert!(joined.contains("-like content"));
    }

    #[test]
    fn binary_content_gives_no_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.cache");
        let mut bytes = vec![0xff, 0xfe, 0x00, 0x9f];
        bytes.extend_from_slice(b"password=secret token");
        write_aged(&path, &bytes);

        assert_eq!(sniff_text(&path).unwrap(), None);
        let verdict = classifier(OpenFileIndex::empty()).classify_path(&path);
        assert_eq!(verdict.level, SecurityLevel::Safe, "{:?}", verdict.risk_factors);
        assert!(!verdict.risk_factors.iter().any(|f| f.contains("-like content")));
    }

    #[test]
    fn text_cut_mid_character_still_counts_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.log");
        let mut bytes = vec![b'a'; SNIFF_BYTES - 1];
        bytes.extend_from_slice("é".as_bytes());
        write_aged(&path, &bytes);

        let text = sniff_text(&path).unwrap().unwrap();
        assert_eq!(text.len(), SNIFF_BYTES - 1);
    }

    #[test]
    fn open_file_is_high_risk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.log");
        write_aged(&path, b"x");
        let mut index = OpenFileIndex::empty();
        index.insert(path.canonicalize().unwrap(), "writer", 7);

        let verdict = classifier(index).classify_path(&path);
        assert_eq!(verdict.level, SecurityLevel::HighRisk);
        assert!(!verdict.is_safe);
        assert!(verdict.risk_factors.iter().any(|f| f.contains("writer (PID: 7)")));
    }

    #[test]
    fn missing_and_non_files_fail_closed() {
        let dir = tempfile::tempdir().unwrap();
        let c = classifier(OpenFileIndex::empty());
        assert_eq!(c.classify_path(&dir.path().join("gone.tmp")).level, SecurityLevel::Critical);
        assert_eq!(c.classify_path(dir.path()).level, SecurityLevel::Critical);
    }

    #[test]
    fn critical_dirs_match_on_boundaries() {
        let c = classifier(OpenFileIndex::empty());
        let mut a = Assessment::default();
        c.check_critical_dirs(Path::new("/usr/lib/libc.so"), &mut a);
        assert_eq!(a.level, Some(SecurityLevel::Critical));

        let mut b = Assessment::default();
        c.check_critical_dirs(Path::new("/usr/libexec/tool.tmp"), &mut b);
        assert_eq!(b.level, None);
    }

    #[test]
    fn quick_filter_rejects_system_looking_paths() {
        assert!(!passes_quick_filter(Path::new(r"C:\Windows\System32\foo.tmp")));
        assert!(!passes_quick_filter(Path::new("/cache/plugin.DLL")));
        assert!(passes_quick_filter(Path::new("/home/u/.cache/x.tmp")));
    }

    #[test]
    fn summary_counts_levels() {
        let verdicts = vec![
            SecurityVerdict::new(SecurityLevel::Safe, vec![]),
            SecurityVerdict::new(SecurityLevel::Moderate, vec!["Empty file".into()]),
            SecurityVerdict::new(SecurityLevel::Critical, vec!["Empty file".into()]),
        ];
        let summary = SecuritySummary::from_verdicts(&verdicts);
        assert_eq!(summary.total, 3);
        assert_eq!((summary.safe, summary.moderate, summary.critical), (1, 1, 1));
        assert_eq!(summary.common_risk_factors, vec![("Empty file".to_string(), 2)]);
        assert_eq!(summary.recommendations.len(), 2);
    }
}
