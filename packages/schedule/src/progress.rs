//! Stage and document progress.
//!
//! The parser and the pipeline runner only see [`ProgressCallback`]; the
//! binary decides whether that means terminal bars, periodic log lines
//! ([`LogProgress`]) or nothing ([`null_progress`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress of a stage measured in units (documents, stages).
///
/// `Send + Sync`: [`crate::parse_batch`] reports from concurrent tasks.
pub trait ProgressCallback: Send + Sync {
    /// Number of units the stage will process.
    fn set_total(&self, total: u64);

    /// Units done so far.
    fn set_position(&self, pos: u64);

    /// Records `delta` more units done.
    fn inc(&self, delta: u64);

    /// Describes what the stage is doing now.
    fn set_message(&self, msg: String);

    /// The stage finished; `msg` summarizes it.
    fn finish(&self, msg: String);

    /// The stage finished and needs no summary.
    fn finish_and_clear(&self);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// A [`NullProgress`] behind the trait object the stages take.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Progress reporting through the `log` facade.
///
/// Emits one `info` line per completed tenth of the total, so long runs in
/// non-interactive environments (CI, cron) still show stage progress.
pub struct LogProgress {
    label: String,
    total: AtomicU64,
    done: AtomicU64,
    last_decile: AtomicU64,
}

impl LogProgress {
    /// Creates a log-backed progress reporter for a labelled stage.
    #[must_use]
    pub fn new(label: &str) -> Arc<dyn ProgressCallback> {
        Arc::new(Self {
            label: label.to_string(),
            total: AtomicU64::new(0),
            done: AtomicU64::new(0),
            last_decile: AtomicU64::new(0),
        })
    }

    fn report(&self, done: u64) {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return;
        }
        let decile = (done * 10 / total).min(10);
        let previous = self.last_decile.fetch_max(decile, Ordering::Relaxed);
        if decile > previous {
            log::info!("{}: {done}/{total}", self.label);
        }
    }
}

impl ProgressCallback for LogProgress {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        self.last_decile.store(0, Ordering::Relaxed);
    }

    fn set_position(&self, pos: u64) {
        self.done.store(pos, Ordering::Relaxed);
        self.report(pos);
    }

    fn inc(&self, delta: u64) {
        let done = self.done.fetch_add(delta, Ordering::Relaxed) + delta;
        self.report(done);
    }

    fn set_message(&self, msg: String) {
        log::debug!("{}: {msg}", self.label);
    }

    fn finish(&self, msg: String) {
        log::info!("{}: {msg}", self.label);
    }

    fn finish_and_clear(&self) {}
}
