/// Dual scheduler: a background pool for population walks and an ordered
/// foreground queue for every tree mutation.
///
/// The background side is abstracted behind [`Scheduler`] so tests can swap
/// the `rayon` pool for [`Inline`] execution. The foreground side is always a
/// [`ForegroundQueue`]: any thread may post to it, and only the owner of the
/// tree drains it (once per frame in a UI, or in a loop in a CLI).
pub mod queue;

pub use queue::{ForegroundQueue, ForegroundSender};

use crate::error::SchedulerError;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs background jobs. Jobs must not touch the live tree.
pub trait Scheduler: Send + Sync {
    fn spawn(&self, job: Job);
}

/// `rayon`-backed worker pool.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `threads` workers (`0` = one per logical CPU).
    pub fn new(threads: usize) -> Result<Self, SchedulerError> {
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("treesync-worker-{i}"))
            .build()?;
        debug!(threads, "worker pool started");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Scheduler for WorkerPool {
    fn spawn(&self, job: Job) {
        self.pool.spawn(job);
    }
}

/// Runs every job immediately on the calling thread.
///
/// Results still travel through the foreground queue, so ordering matches
/// the pooled scheduler; only the timing becomes deterministic.
#[derive(Debug, Default)]
pub struct Inline {
    spawned: AtomicUsize,
}

impl Inline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs run so far.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Scheduler for Inline {
    fn spawn(&self, job: Job) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        job();
    }
}
