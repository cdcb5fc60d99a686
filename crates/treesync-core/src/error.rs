/// Error types for the reconciliation engine.
///
/// Stale references are deliberately *not* errors: a patch or lookup that
/// addresses an identity no longer in the tree is a silent no-op, because
/// the tree may legitimately have changed underneath it.
use std::path::PathBuf;
use thiserror::Error;

/// A failure reported by a domain source through the capability contract.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the underlying storage failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The domain object vanished between lookup and use.
    #[error("{0} no longer exists")]
    NotFound(String),

    /// The domain refused the operation (e.g. a drop onto an incompatible target).
    #[error("{0}")]
    Rejected(String),
}

impl SourceError {
    /// Wrap an I/O error together with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A full population walk could not produce a tree.
#[derive(Debug, Error)]
pub enum PopulationError {
    /// The root element could not be opened or listed.
    #[error("could not open the tree root: {0}")]
    Root(#[source] SourceError),

    /// The background walk panicked before posting a result.
    #[error("population worker panicked")]
    Panicked,
}

/// A drag-and-drop transfer failed after it was accepted.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("malformed drag payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("drop target refused the transfer: {0}")]
    Source(#[from] SourceError),
}

/// Loading a [`TreeConfig`](crate::config::TreeConfig) failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The background worker pool could not be started.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
