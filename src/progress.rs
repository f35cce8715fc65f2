use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Receives `(message, current, total)` progress updates.
pub trait ProgressSink: Send + Sync {
    fn update(&self, message: &str, current: u64, total: u64);

    /// Called once when an operation ends.
    fn finish(&self, _message: &str) {}
}

/// Discards every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _message: &str, _current: u64, _total: u64) {}
}

/// Writes updates to the log at debug level.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn update(&self, message: &str, current: u64, total: u64) {
        log::debug!("{message} ({current}/{total})");
    }

    fn finish(&self, message: &str) {
        log::debug!("{message}");
    }
}

/// Rate-limits updates to a sink. The final update of an operation
/// (`current >= total`) always gets through.
#[derive(Clone)]
pub struct Progress {
    sink: Arc<dyn ProgressSink>,
    interval: Duration,
    last: Arc<Mutex<Option<Instant>>>,
}

impl Progress {
    pub fn new(sink: Arc<dyn ProgressSink>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(NoProgress), Duration::ZERO)
    }

    pub fn update(&self, message: &str, current: u64, total: u64) {
        let now = Instant::now();
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        let due = current >= total
            || last.is_none_or(|t| now.duration_since(t) >= self.interval);
        if !due {
            return;
        }
        *last = Some(now);
        drop(last);
        self.sink.update(message, current, total);
    }

    pub fn finish(&self, message: &str) {
        self.sink.finish(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Counting(AtomicU64);

    impl ProgressSink for Counting {
        fn update(&self, _message: &str, _current: u64, _total: u64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn bursts_are_throttled_but_completion_passes() {
        let sink = Arc::new(Counting::default());
        let progress = Progress::new(sink.clone(), Duration::from_secs(60));
        for i in 0..100 {
            progress.update("working", i, 100);
        }
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);

        progress.update("done", 100, 100);
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }
}
