/// Foreground queue: the single ordered channel into the tree owner.
///
/// Unbounded. The owner also posts to its own queue (patches submitted from
/// the foreground thread), and a full bounded channel would block the only
/// thread able to drain it.
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Cloneable sending half handed out to other threads.
pub type ForegroundSender<T> = Sender<T>;

/// FIFO of tasks executed by the tree owner, in submission order.
#[derive(Debug)]
pub struct ForegroundQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for ForegroundQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ForegroundQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> ForegroundSender<T> {
        self.tx.clone()
    }

    /// Enqueue from the owning thread.
    pub fn post(&self, task: T) {
        // The receiver lives in `self`, so this cannot be disconnected.
        let _ = self.tx.send(task);
    }

    /// Take up to `budget` queued tasks without blocking.
    ///
    /// The budget keeps a large backlog (e.g. a burst of notifications while
    /// the window was hidden) from stalling a single frame.
    pub fn drain(&self, budget: usize) -> Vec<T> {
        self.rx.try_iter().take(budget).collect()
    }

    /// Block for at most `timeout` waiting for the next task.
    pub fn wait(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => Some(task),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
