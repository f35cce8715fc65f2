use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::catalog::Category;
use crate::categories::RunContext;
use crate::error::DeleteError;

/// Outcome of scanning or cleaning some set of paths.
///
/// Results from files, batches, paths and categories are folded together
/// with [`CleanupResult::merge`]; counters add up, error messages are joined
/// with `"; "` and the success flag is the logical AND of the parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    pub files_scanned: u64,
    pub files_deleted: u64,
    pub bytes_freed: u64,
    pub error_message: String,
    pub success: bool,
}

impl Default for CleanupResult {
    fn default() -> Self {
        Self {
            files_scanned: 0,
            files_deleted: 0,
            bytes_freed: 0,
            error_message: String::new(),
            success: true,
        }
    }
}

impl CleanupResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// A failed result carrying only a message.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut result = Self::default();
        result.record_error(message);
        result
    }

    /// One file counted as scanned (and deleted when `deleted`).
    pub fn file(size: u64, deleted: bool) -> Self {
        Self {
            files_scanned: 1,
            files_deleted: u64::from(deleted),
            bytes_freed: size,
            ..Self::default()
        }
    }

    /// Append a message and mark the result failed.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !message.is_empty() {
            if !self.error_message.is_empty() {
                self.error_message.push_str("; ");
            }
            self.error_message.push_str(&message);
        }
        self.success = false;
    }

    pub fn merge(&mut self, other: CleanupResult) {
        self.files_scanned += other.files_scanned;
        self.files_deleted += other.files_deleted;
        self.bytes_freed += other.bytes_freed;
        if !other.success {
            self.record_error(other.error_message);
        }
    }

    /// Fold any number of results into one.
    pub fn merged(results: impl IntoIterator<Item = CleanupResult>) -> Self {
        results.into_iter().fold(Self::default(), |mut acc, r| {
            acc.merge(r);
            acc
        })
    }

    /// Distinct error messages, in first-seen order.
    pub fn errors(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for part in self.error_message.split("; ").filter(|p| !p.is_empty()) {
            if !seen.contains(&part) {
                seen.push(part);
            }
        }
        seen
    }
}

/// A file the engine tried and failed to delete.
#[derive(Debug, Clone)]
pub struct FailedDeletion {
    pub path: PathBuf,
    pub kind: &'static str,
    pub error: String,
    pub timestamp: DateTime<Local>,
}

impl FailedDeletion {
    pub fn new(path: PathBuf, error: &DeleteError) -> Self {
        Self {
            path,
            kind: error.kind_label(),
            error: error.to_string(),
            timestamp: Local::now(),
        }
    }
}

/// Bounded record of failed deletions.
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: Vec<FailedDeletion>,
    total: u64,
}

impl FailureLog {
    const HIGH_WATER: usize = 100;
    const RETAIN: usize = 50;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: FailedDeletion) {
        self.entries.push(failure);
        self.total += 1;
        if self.entries.len() > Self::HIGH_WATER {
            let excess = self.entries.len() - Self::RETAIN;
            self.entries.drain(..excess);
        }
    }

    pub fn extend(&mut self, failures: impl IntoIterator<Item = FailedDeletion>) {
        for failure in failures {
            self.push(failure);
        }
    }

    pub fn entries(&self) -> &[FailedDeletion] {
        &self.entries
    }

    /// Failures ever recorded, including ones dropped from retention.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }

    /// Retained failures grouped by kind, most frequent first.
    pub fn summary(&self) -> Vec<(&'static str, usize)> {
        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.kind).or_default() += 1;
        }
        let mut summary: Vec<_> = counts.into_iter().collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        summary
    }
}

/// What one worker produced for one candidate.
#[derive(Debug, Default)]
pub struct ItemReport {
    pub result: CleanupResult,
    pub failure: Option<FailedDeletion>,
}

impl ItemReport {
    pub fn skipped() -> Self {
        Self::default()
    }
}

impl From<CleanupResult> for ItemReport {
    fn from(result: CleanupResult) -> Self {
        Self {
            result,
            failure: None,
        }
    }
}

/// The trait every cleanup category implements.
pub trait Cleaner: Send + Sync {
    fn category(&self) -> Category;

    /// Machine-readable name used in --category flag (e.g. "temp-files").
    fn name(&self) -> &'static str {
        self.category().name()
    }

    /// Human-readable label for display (e.g. "Temp Files").
    fn label(&self) -> &'static str {
        self.category().label()
    }

    /// Report what would be reclaimed. Never deletes anything.
    fn scan(&self, ctx: &RunContext) -> CleanupResult;

    /// Delete eligible files, or behave like a dry run when the context says so.
    fn clean(&self, ctx: &RunContext) -> CleanupResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(scanned: u64, deleted: u64, bytes: u64, err: Option<&str>) -> CleanupResult {
        let mut r = CleanupResult {
            files_scanned: scanned,
            files_deleted: deleted,
            bytes_freed: bytes,
            ..CleanupResult::default()
        };
        if let Some(msg) = err {
            r.record_error(msg);
        }
        r
    }

    #[test]
    fn merge_sums_and_ands() {
        let mut total = sample(3, 2, 100, None);
        total.merge(sample(1, 1, 50, Some("disk on fire")));
        total.merge(sample(2, 0, 10, Some("still on fire")));

        assert_eq!(total.files_scanned, 6);
        assert_eq!(total.files_deleted, 3);
        assert_eq!(total.bytes_freed, 160);
        assert!(!total.success);
        assert_eq!(total.error_message, "disk on fire; still on fire");
    }

    #[test]
    fn merge_is_associative_on_counters_and_flag() {
        let a = sample(1, 1, 10, None);
        let b = sample(2, 1, 20, Some("b"));
        let c = sample(4, 3, 40, Some("c"));

        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut bc = b.clone();
        bc.merge(c.clone());
        let mut right = a.clone();
        right.merge(bc);

        let mut reversed = c;
        reversed.merge(b);
        reversed.merge(a);

        for r in [&right, &reversed] {
            assert_eq!(r.files_scanned, left.files_scanned);
            assert_eq!(r.files_deleted, left.files_deleted);
            assert_eq!(r.bytes_freed, left.bytes_freed);
            assert_eq!(r.success, left.success);
            let mut errs = r.errors();
            errs.sort();
            assert_eq!(errs, vec!["b", "c"]);
        }
    }

    #[test]
    fn default_is_successful_and_empty() {
        let r = CleanupResult::merged(Vec::new());
        assert!(r.success);
        assert_eq!(r.files_scanned, 0);
        assert!(r.error_message.is_empty());
    }

    #[test]
    fn failure_log_keeps_most_recent() {
        let mut log = FailureLog::new();
        for i in 0..101 {
            log.push(FailedDeletion::new(
                PathBuf::from(format!("/tmp/f{i}")),
                &DeleteError::ActiveUse,
            ));
        }
        assert_eq!(log.entries().len(), 50);
        assert_eq!(log.total(), 101);
        assert_eq!(log.entries()[0].path, PathBuf::from("/tmp/f51"));
        assert_eq!(log.entries()[49].path, PathBuf::from("/tmp/f100"));
    }

    #[test]
    fn failure_summary_groups_by_kind() {
        let mut log = FailureLog::new();
        log.push(FailedDeletion::new("/a".into(), &DeleteError::ActiveUse));
        log.push(FailedDeletion::new("/b".into(), &DeleteError::ActiveUse));
        log.push(FailedDeletion::new("/c".into(), &DeleteError::Protected));

        assert_eq!(log.summary(), vec![("Active use", 2), ("Protected", 1)]);
    }
}
