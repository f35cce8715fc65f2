//! Bounded concurrent batch execution.
//!
//! Items are cut into contiguous batches (callers sort them by priority
//! first). Batches run on a per-call rayon pool; each batch processes its
//! items sequentially and sends one outcome over a channel. The calling thread
//! is the only consumer, so merging needs no lock.
//!
//! A slow item is only logged. A batch running past `batch_timeout` is
//! cancelled and its result dropped. The whole call is capped at
//! `min(batch_timeout * batches, category_timeout)`. After a stop request no
//! new batch starts; in-flight batches end at their next item and are waited
//! for, but only batches that ran to completion count toward the result.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};

use crate::cleaner::{CleanupResult, FailedDeletion, ItemReport};
use crate::progress::Progress;

/// How often the collector wakes to look for overdue batches.
const TICK: Duration = Duration::from_millis(50);

/// Cooperative cancellation. Stays set until [`StopFlag::resume`].
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionProfile {
    pub batch_size: usize,
    /// Hard cap on pool threads.
    pub max_workers: usize,
    /// Pool threads per available CPU.
    pub cpu_multiplier: usize,
    /// Items slower than this are logged.
    pub item_timeout: Duration,
    /// A batch running longer than this is cancelled and its result dropped.
    pub batch_timeout: Duration,
    pub category_timeout: Duration,
}

impl ExecutionProfile {
    pub fn pool_size(&self, batches: usize) -> usize {
        let by_cpu = self.cpu_multiplier.max(1) * num_cpus::get();
        self.max_workers.min(batches).min(by_cpu).max(1)
    }

    fn overall_timeout(&self, batches: usize) -> Duration {
        let per_batch = self
            .batch_timeout
            .saturating_mul(u32::try_from(batches).unwrap_or(u32::MAX));
        per_batch.min(self.category_timeout)
    }
}

#[derive(Debug, Default)]
struct BatchOutcome {
    result: CleanupResult,
    failures: Vec<FailedDeletion>,
    processed: usize,
    /// Left before its last item because of a stop, cancel or abandon.
    interrupted: bool,
}

enum Message {
    Started { batch: usize, at: Instant },
    Finished { batch: usize, outcome: BatchOutcome },
}

/// Aggregate of one [`BatchExecutor::run`] call.
#[derive(Debug, Default)]
pub struct BatchRun {
    pub result: CleanupResult,
    pub failures: Vec<FailedDeletion>,
    pub batches: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub stopped: bool,
    pub deadline_hit: bool,
}

pub struct BatchExecutor {
    profile: ExecutionProfile,
    stop: StopFlag,
}

impl BatchExecutor {
    pub fn new(profile: ExecutionProfile, stop: StopFlag) -> Self {
        Self { profile, stop }
    }

    /// Process `items` with `worker`, at most `pool_size` batches at a time.
    pub fn run<T, F>(&self, label: &str, items: Vec<T>, worker: F, progress: &Progress) -> BatchRun
    where
        T: Send + 'static,
        F: Fn(&T) -> ItemReport + Send + Sync + 'static,
    {
        let mut run = BatchRun::default();
        if items.is_empty() {
            return run;
        }

        let total_items = items.len() as u64;
        let batches = split_batches(items, self.profile.batch_size);
        run.batches = batches.len();
        let pool_size = self.profile.pool_size(batches.len());

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .thread_name(|i| format!("reclaim-batch-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                log::error!("{label}: cannot start worker pool: {err}");
                run.result.record_error(format!("cannot start worker pool: {err}"));
                return run;
            }
        };
        log::debug!(
            "{label}: {} items in {} batches on {pool_size} workers",
            total_items,
            batches.len()
        );

        let worker = Arc::new(worker);
        let abandon = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded::<Message>();
        let cancels: Vec<Arc<AtomicBool>> = (0..batches.len())
            .map(|_| Arc::new(AtomicBool::new(false)))
            .collect();
        let mut pending = batches.into_iter().enumerate();

        let submit = |pending: &mut dyn Iterator<Item = (usize, Vec<T>)>| -> bool {
            let Some((idx, batch)) = pending.next() else {
                return false;
            };
            let job = BatchJob {
                idx,
                items: batch,
                worker: worker.clone(),
                stop: self.stop.clone(),
                cancel: cancels[idx].clone(),
                abandon: abandon.clone(),
                item_timeout: self.profile.item_timeout,
                tx: tx.clone(),
            };
            pool.spawn_fifo(move || job.run());
            true
        };

        let mut in_flight = 0usize;
        for _ in 0..pool_size {
            if self.stop.is_set() || !submit(&mut pending) {
                break;
            }
            in_flight += 1;
        }

        let started_at = Instant::now();
        // None when the configured timeout does not fit in an Instant
        let deadline = started_at.checked_add(self.profile.overall_timeout(run.batches));
        let mut running: HashMap<usize, Instant> = HashMap::new();
        let mut items_done = 0u64;
        let mut discarded = 0usize;

        while in_flight > 0 {
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                log::warn!("{label}: stopped waiting after {:?}", now - started_at);
                run.deadline_hit = true;
                break;
            }
            let wait = deadline.map_or(TICK, |d| TICK.min(d.saturating_duration_since(now)));
            match rx.recv_timeout(wait) {
                Ok(Message::Started { batch, at }) => {
                    running.insert(batch, at);
                }
                Ok(Message::Finished { batch, outcome }) => {
                    running.remove(&batch);
                    if cancels[batch].load(Ordering::SeqCst) {
                        // timed out earlier; already accounted for
                        continue;
                    }
                    in_flight -= 1;
                    if outcome.interrupted {
                        discarded += outcome.processed;
                        run.stopped = true;
                        break;
                    }
                    run.completed += 1;
                    items_done += outcome.processed as u64;
                    run.result.merge(outcome.result);
                    run.failures.extend(outcome.failures);
                    progress.update(
                        &format!("{label}: {} files processed", run.result.files_scanned),
                        items_done,
                        total_items,
                    );

                    if self.stop.is_set() {
                        run.stopped = true;
                        break;
                    }
                    if submit(&mut pending) {
                        in_flight += 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            let overdue: Vec<usize> = running
                .iter()
                .filter(|(_, at)| now.duration_since(**at) > self.profile.batch_timeout)
                .map(|(b, _)| *b)
                .collect();
            for batch in overdue {
                running.remove(&batch);
                cancels[batch].store(true, Ordering::SeqCst);
                in_flight -= 1;
                run.timed_out += 1;
                log::warn!(
                    "{label}: batch {batch} timed out after {:?}",
                    self.profile.batch_timeout
                );
                if !self.stop.is_set() && submit(&mut pending) {
                    in_flight += 1;
                }
            }

            if self.stop.is_set() {
                run.stopped = true;
                break;
            }
        }

        abandon.store(true, Ordering::SeqCst);
        drop(tx);
        // wait for in-flight batches so no file is caught mid-delete; a batch
        // that still ran to completion before seeing the stop is kept
        while in_flight > 0 && deadline.is_none_or(|d| Instant::now() < d) {
            match rx.recv_timeout(TICK) {
                Ok(Message::Finished { batch, outcome }) => {
                    if cancels[batch].load(Ordering::SeqCst) {
                        continue;
                    }
                    in_flight -= 1;
                    if outcome.interrupted {
                        discarded += outcome.processed;
                        continue;
                    }
                    run.completed += 1;
                    run.result.merge(outcome.result);
                    run.failures.extend(outcome.failures);
                }
                Ok(Message::Started { .. }) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if run.stopped {
            log::info!(
                "{label}: stop requested, {}/{} batches merged, {discarded} items of interrupted batches not counted",
                run.completed,
                run.batches
            );
        }
        run
    }
}

fn split_batches<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let size = batch_size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);
    for item in items {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

struct BatchJob<T, F> {
    idx: usize,
    items: Vec<T>,
    worker: Arc<F>,
    stop: StopFlag,
    cancel: Arc<AtomicBool>,
    abandon: Arc<AtomicBool>,
    item_timeout: Duration,
    tx: Sender<Message>,
}

impl<T, F> BatchJob<T, F>
where
    F: Fn(&T) -> ItemReport,
{
    fn halted(&self) -> bool {
        self.stop.is_set()
            || self.cancel.load(Ordering::SeqCst)
            || self.abandon.load(Ordering::SeqCst)
    }

    fn run(self) {
        let _ = self.tx.send(Message::Started {
            batch: self.idx,
            at: Instant::now(),
        });
        let mut outcome = BatchOutcome::default();

        for item in &self.items {
            if self.halted() {
                outcome.interrupted = true;
                break;
            }
            let began = Instant::now();
            match panic::catch_unwind(AssertUnwindSafe(|| (self.worker)(item))) {
                Ok(report) => {
                    outcome.result.merge(report.result);
                    outcome.failures.extend(report.failure);
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    log::error!("worker panicked: {msg}");
                    outcome.result.record_error(format!("Worker panicked: {msg}"));
                }
            }
            outcome.processed += 1;
            let took = began.elapsed();
            if took > self.item_timeout {
                log::warn!("batch {}: one item took {took:?}", self.idx);
            }
        }

        let _ = self.tx.send(Message::Finished {
            batch: self.idx,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn profile(batch_size: usize, workers: usize) -> ExecutionProfile {
        ExecutionProfile {
            batch_size,
            max_workers: workers,
            cpu_multiplier: 4,
            item_timeout: Duration::from_secs(5),
            batch_timeout: Duration::from_secs(30),
            category_timeout: Duration::from_secs(60),
        }
    }

    fn counted(size: u64) -> ItemReport {
        CleanupResult::file(size, true).into()
    }

    #[test]
    fn batches_are_contiguous() {
        let batches = split_batches((0..7).collect(), 3);
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[test]
    fn pool_size_is_bounded_and_positive() {
        let p = profile(10, 8);
        assert_eq!(p.pool_size(0), 1);
        assert_eq!(p.pool_size(3), 3);
        assert!(p.pool_size(100) <= 8);
    }

    #[test]
    fn merges_every_batch() {
        let exec = BatchExecutor::new(profile(10, 4), StopFlag::new());
        let run = exec.run("test", (1..=95u64).collect(), |n| counted(*n), &Progress::silent());
        assert_eq!(run.batches, 10);
        assert_eq!(run.completed, 10);
        assert_eq!(run.result.files_scanned, 95);
        assert_eq!(run.result.bytes_freed, (1..=95u64).sum::<u64>());
        assert!(run.result.success);
    }

    #[test]
    fn stop_after_first_batch_keeps_only_that_batch() {
        let stop = StopFlag::new();
        let exec = BatchExecutor::new(profile(4, 1), stop.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_w = seen.clone();
        let stop_w = stop.clone();

        let run = exec.run(
            "stop",
            (0..20u64).collect(),
            move |_| {
                if seen_w.fetch_add(1, Ordering::SeqCst) == 3 {
                    stop_w.stop();
                }
                counted(1)
            },
            &Progress::silent(),
        );
        assert!(run.stopped);
        assert_eq!(run.completed, 1);
        assert_eq!(run.result.files_scanned, 4);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn stop_drops_batches_cut_short_on_other_workers() {
        let stop = StopFlag::new();
        let exec = BatchExecutor::new(profile(3, 2), stop.clone());
        let stopper = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(150));
                stop.stop();
            })
        };

        let run = exec.run(
            "stop-many",
            (0..15u64).collect(),
            |n| {
                if *n >= 3 {
                    std::thread::sleep(Duration::from_millis(300));
                }
                counted(1)
            },
            &Progress::silent(),
        );
        stopper.join().unwrap();

        assert!(run.stopped);
        assert_eq!(run.batches, 5);
        assert_eq!(run.completed, 1);
        assert_eq!(run.result.files_scanned, 3);
        assert!(run.result.success);
    }

    #[test]
    fn overall_deadline_ends_the_call() {
        let mut p = profile(1, 1);
        p.category_timeout = Duration::from_millis(100);
        let exec = BatchExecutor::new(p, StopFlag::new());

        let started = Instant::now();
        let run = exec.run(
            "deadline",
            vec![0u64, 1],
            |_| {
                std::thread::sleep(Duration::from_millis(500));
                counted(1)
            },
            &Progress::silent(),
        );
        assert!(run.deadline_hit);
        assert_eq!(run.completed, 0);
        assert_eq!(run.result.files_scanned, 0);
        assert!(started.elapsed() < Duration::from_millis(450));
    }

    #[test]
    fn huge_timeouts_do_not_overflow() {
        let mut p = profile(2, 2);
        p.batch_timeout = Duration::MAX;
        p.category_timeout = Duration::MAX;
        let exec = BatchExecutor::new(p, StopFlag::new());
        let run = exec.run("huge", (1..=5u64).collect(), |n| counted(*n), &Progress::silent());
        assert_eq!(run.completed, 3);
        assert_eq!(run.result.bytes_freed, 15);
        assert!(!run.deadline_hit);
    }

    #[test]
    fn set_stop_flag_prevents_any_work() {
        let stop = StopFlag::new();
        stop.stop();
        let exec = BatchExecutor::new(profile(4, 2), stop.clone());
        let run = exec.run("stopped", vec![1u64, 2, 3], |n| counted(*n), &Progress::silent());
        assert_eq!(run.result.files_scanned, 0);
        stop.resume();
        assert!(!stop.is_set());
    }

    #[test]
    fn slow_batch_times_out_without_failing_the_run() {
        let mut p = profile(1, 2);
        p.batch_timeout = Duration::from_millis(100);
        let exec = BatchExecutor::new(p, StopFlag::new());

        let run = exec.run(
            "slow",
            vec![0u64, 1, 2],
            |n| {
                if *n == 1 {
                    std::thread::sleep(Duration::from_millis(600));
                }
                counted(10)
            },
            &Progress::silent(),
        );
        assert_eq!(run.timed_out, 1);
        assert_eq!(run.completed, 2);
        assert_eq!(run.result.files_scanned, 2);
        assert!(run.result.success);
    }

    #[test]
    fn worker_panic_becomes_an_error() {
        let exec = BatchExecutor::new(profile(2, 1), StopFlag::new());
        let run = exec.run(
            "panic",
            vec![0u64, 1, 2, 3],
            |n| {
                if *n == 2 {
                    panic!("boom");
                }
                counted(1)
            },
            &Progress::silent(),
        );
        assert_eq!(run.result.files_scanned, 3);
        assert!(!run.result.success);
        assert!(run.result.error_message.contains("boom"));
    }
}
