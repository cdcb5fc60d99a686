/// Engine configuration and the explicit context passed into a tree view.
use crate::error::{ConfigError, SchedulerError};
use crate::model::Filter;
use crate::scheduler::{Inline, Scheduler, WorkerPool};
use crate::source::Source;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Default cap on foreground tasks handled per [`pump`](crate::TreeView::pump).
pub const DEFAULT_MAX_TASKS_PER_PUMP: usize = 256;

/// Default number of inserted nodes between two progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 5_000;

/// Tunables for a tree view. Every field has a default, so a JSON file only
/// needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Applied at the next fill/refresh and to every incremental patch.
    pub filter: Filter,

    pub max_tasks_per_pump: usize,

    /// Background workers; `0` means one per logical CPU.
    pub worker_threads: usize,

    pub progress_interval: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            filter: Filter::default(),
            max_tasks_per_pump: DEFAULT_MAX_TASKS_PER_PUMP,
            worker_threads: 0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl TreeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

/// Everything a tree view needs from the outside world, passed explicitly
/// instead of through global managers.
pub struct EngineContext<S: Source> {
    pub source: Arc<S>,
    pub scheduler: Arc<dyn Scheduler>,
    pub config: TreeConfig,
}

impl<S: Source> Clone for EngineContext<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            scheduler: Arc::clone(&self.scheduler),
            config: self.config.clone(),
        }
    }
}

impl<S: Source> EngineContext<S> {
    /// Context backed by a `rayon` worker pool sized from `config`.
    pub fn new(source: Arc<S>, config: TreeConfig) -> Result<Self, SchedulerError> {
        let pool = WorkerPool::new(config.worker_threads)?;
        Ok(Self::with_scheduler(source, Arc::new(pool), config))
    }

    /// Context that runs population walks synchronously on the caller.
    pub fn inline(source: Arc<S>, config: TreeConfig) -> Self {
        Self::with_scheduler(source, Arc::new(Inline::new()), config)
    }

    pub fn with_scheduler(source: Arc<S>, scheduler: Arc<dyn Scheduler>, config: TreeConfig) -> Self {
        Self {
            source,
            scheduler,
            config,
        }
    }
}
