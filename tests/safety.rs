use std::fs::{self, FileTimes};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use reclaim::backup::{read_manifest, BackupSession};
use reclaim::catalog::Category;
use reclaim::config::ClassifierSettings;
use reclaim::deleter::{BackupThenDelete, DeleteOptions, DeletionStrategy, DirectDelete};
use reclaim::processes::OpenFileIndex;
use reclaim::scoring::{DevelopmentScorer, GeneralScorer, OptimizationScorer, PriorityScorer};
use reclaim::security::{SafetyClassifier, SecurityLevel};
use reclaim::walker::{CandidateFile, TreeWalker, WalkBudget};

fn old_file(path: &Path, bytes: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![1u8; bytes]).unwrap();
    let old = SystemTime::now() - Duration::from_secs(3 * 3600);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_times(FileTimes::new().set_modified(old))
        .unwrap();
}

fn quick_delete() -> DirectDelete {
    DirectDelete::new(DeleteOptions {
        backoff: Duration::from_millis(1),
        ..DeleteOptions::default()
    })
}

#[test]
fn deleting_twice_succeeds_twice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stale.tmp");
    old_file(&path, 16);

    let strategy = quick_delete();
    assert!(strategy.delete(&path, false).is_ok());
    assert!(strategy.delete(&path, false).is_ok());
    assert!(!path.exists());
}

#[test]
fn walk_respects_depth_and_skips_system32() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    old_file(&root.join("top.tmp"), 1);
    old_file(&root.join("one/two/three/deep.tmp"), 1);
    old_file(&root.join("SyStEm32/driver.tmp"), 1);

    let files: Vec<CandidateFile> = TreeWalker::new(root, WalkBudget::new(1000, 2)).collect();
    for file in &files {
        let depth = file.path.strip_prefix(root).unwrap().components().count();
        assert!(depth <= 2, "{} too deep", file.path.display());
        assert!(!file.path.to_string_lossy().contains("SyStEm32"));
    }
    assert!(files.iter().any(|f| f.path.ends_with("top.tmp")));

    let unbounded: Vec<CandidateFile> =
        TreeWalker::new(root, WalkBudget::new(usize::MAX, 64)).collect();
    assert!(unbounded.iter().all(|f| !f.path.to_string_lossy().contains("SyStEm32")));
    assert!(unbounded.iter().any(|f| f.path.ends_with("deep.tmp")));
}

#[test]
fn critical_names_fail_closed() {
    let dir = tempfile::tempdir().unwrap();
    let hive = dir.path().join("ntuser.dat");
    old_file(&hive, 10);

    let classifier = SafetyClassifier::new(
        ClassifierSettings::default(),
        Arc::new(OpenFileIndex::empty()),
    );
    let verdict = classifier.classify(&CandidateFile::probe(&hive).unwrap());
    assert!(!verdict.is_safe);
    assert_eq!(verdict.level, SecurityLevel::Critical);

    let gone = classifier.classify_path(&dir.path().join("missing.tmp"));
    assert_eq!(gone.level, SecurityLevel::Critical);
}

#[test]
fn scoring_handles_odd_names_and_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        ("", 0u64),
        ("noext", 1),
        ("a.tmp", 10 * 1024 * 1024 * 1024),
        ("Prefetch/APP.EXE-1234.pf", 5 * 1024 * 1024),
        ("node_modules/.cache/x.whl", 60 * 1024 * 1024),
    ];
    let scorers: [&dyn PriorityScorer; 3] =
        [&GeneralScorer, &DevelopmentScorer, &OptimizationScorer];
    for (name, size) in cases {
        let file = CandidateFile {
            path: dir.path().join(name),
            size,
            modified: None,
            accessed: None,
        };
        for scorer in scorers {
            assert!(scorer.score(&file) < u64::MAX);
        }
    }
}

#[test]
fn oversized_file_skips_backup_but_is_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    let big = dir.path().join("huge.tmp");
    let small = dir.path().join("small.tmp");
    old_file(&big, 8 * 1024);
    old_file(&small, 100);

    let session = Arc::new(BackupSession::new(store.path(), Category::TempFiles, 1024));
    let strategy = BackupThenDelete::new(quick_delete(), session.clone());
    assert!(strategy.delete(&big, false).is_ok());
    assert!(strategy.delete(&small, false).is_ok());
    assert!(!big.exists());
    assert!(!small.exists());

    let manifest = read_manifest(session.dir()).unwrap();
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest[0].original, small);
}
