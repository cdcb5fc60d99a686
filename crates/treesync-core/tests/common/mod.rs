#![allow(dead_code)]
// Shared fixtures for the core end-to-end tests: an in-memory, path-keyed
// hierarchy that can be mutated behind the engine's back, and a scheduler
// that holds jobs until the test releases them.

use compact_str::CompactString;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use treesync_core::scheduler::{Job, Scheduler};
use treesync_core::{
    ChildEdit, ChildState, Element, EngineContext, NodeKind, Source, SourceError, TreeConfig, TreeView,
};

pub const ROOT: &str = "/r";

/// One recorded bookkeeping hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCall {
    pub container: PathBuf,
    pub edit: ChildEdit,
    pub state: ChildState,
    pub phase: &'static str,
}

/// A mutable in-memory filesystem.
#[derive(Debug, Default)]
pub struct MemFs {
    entries: RwLock<BTreeMap<PathBuf, NodeKind>>,
    pub hooks: Mutex<Vec<HookCall>>,
}

impl MemFs {
    pub fn mkdir(&self, path: &str) {
        self.entries.write().insert(PathBuf::from(path), NodeKind::Container);
    }

    pub fn touch(&self, path: &str) {
        self.entries.write().insert(PathBuf::from(path), NodeKind::Leaf);
    }

    pub fn remove(&self, path: &str) {
        let path = Path::new(path);
        self.entries.write().retain(|p, _| !p.starts_with(path));
    }

    /// Move `from` and everything below it to `to`.
    pub fn rename(&self, from: &str, to: &str) {
        rename_entries(&mut self.entries.write(), Path::new(from), Path::new(to));
    }

    pub fn kind(&self, path: &Path) -> Option<NodeKind> {
        self.entries.read().get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(Path::new(path))
    }

    fn children_of(&self, path: &Path) -> Vec<(PathBuf, NodeKind)> {
        self.entries
            .read()
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .map(|(p, &k)| (p.clone(), k))
            .collect()
    }
}

fn rename_entries(entries: &mut BTreeMap<PathBuf, NodeKind>, from: &Path, to: &Path) {
    let moved: Vec<(PathBuf, NodeKind)> = entries
        .iter()
        .filter(|(p, _)| p.starts_with(from))
        .map(|(p, &k)| (p.clone(), k))
        .collect();
    for (path, kind) in moved {
        entries.remove(&path);
        entries.insert(graft(&path, from, to), kind);
    }
}

/// `path` with its `from` prefix replaced by `to`.
fn graft(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rest) if !rest.as_os_str().is_empty() => to.join(rest),
        _ => to.to_path_buf(),
    }
}

/// Fixture layout:
///
/// ```text
/// /r/
///   a/
///     b/
///       d.txt
///     notes.txt
///   c/
///   img/
///     logo.png
///   readme.txt
/// ```
pub fn sample_fs() -> Arc<MemFs> {
    let fs = Arc::new(MemFs::default());
    fs.mkdir(ROOT);
    fs.mkdir("/r/a");
    fs.mkdir("/r/a/b");
    fs.touch("/r/a/b/d.txt");
    fs.touch("/r/a/notes.txt");
    fs.mkdir("/r/c");
    fs.mkdir("/r/img");
    fs.touch("/r/img/logo.png");
    fs.touch("/r/readme.txt");
    fs
}

#[derive(Debug, Clone)]
pub struct MemEntry {
    pub path: PathBuf,
    pub kind: NodeKind,
    fs: Arc<MemFs>,
}

impl Element for MemEntry {
    type Id = PathBuf;

    fn identity(&self) -> PathBuf {
        self.path.clone()
    }

    fn display_name(&self) -> CompactString {
        self.path
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_else(|| CompactString::new(self.path.to_string_lossy()))
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn read_children(&self) -> Result<Vec<Self>, SourceError> {
        if self.fs.kind(&self.path).is_none() {
            return Err(SourceError::NotFound(self.path.display().to_string()));
        }
        Ok(self
            .fs
            .children_of(&self.path)
            .into_iter()
            .map(|(path, kind)| MemEntry {
                path,
                kind,
                fs: Arc::clone(&self.fs),
            })
            .collect())
    }

    fn accept(&self, candidate: &Self, is_copy: bool) -> Result<Option<PathBuf>, SourceError> {
        let name = candidate
            .path
            .file_name()
            .ok_or_else(|| SourceError::Rejected("cannot transfer the root".into()))?;
        let target = self.path.join(name);
        if self.fs.kind(&target).is_some() {
            return Err(SourceError::Rejected(format!("{} already exists", target.display())));
        }
        let mut entries = self.fs.entries.write();
        if is_copy {
            let copied: Vec<(PathBuf, NodeKind)> = entries
                .iter()
                .filter(|(p, _)| p.starts_with(&candidate.path))
                .map(|(p, &k)| (p.clone(), k))
                .collect();
            for (path, kind) in copied {
                entries.insert(graft(&path, &candidate.path, &target), kind);
            }
        } else {
            rename_entries(&mut entries, &candidate.path, &target);
        }
        Ok(Some(target))
    }

    fn relocated(&self, id: &PathBuf) -> Self {
        Self {
            path: id.clone(),
            ..self.clone()
        }
    }

    fn on_child_prepare(&self, edit: ChildEdit, before: ChildState) {
        self.fs.hooks.lock().push(HookCall {
            container: self.path.clone(),
            edit,
            state: before,
            phase: "prepare",
        });
    }

    fn on_child_commit(&self, edit: ChildEdit, after: ChildState) {
        self.fs.hooks.lock().push(HookCall {
            container: self.path.clone(),
            edit,
            state: after,
            phase: "commit",
        });
    }
}

pub struct MemSource {
    pub fs: Arc<MemFs>,
    pub fail_root: AtomicBool,
}

impl MemSource {
    pub fn new(fs: Arc<MemFs>) -> Arc<Self> {
        Arc::new(Self {
            fs,
            fail_root: AtomicBool::new(false),
        })
    }
}

impl Source for MemSource {
    type Element = MemEntry;

    fn root(&self) -> Result<MemEntry, SourceError> {
        if self.fail_root.load(Ordering::SeqCst) {
            return Err(SourceError::NotFound(ROOT.into()));
        }
        self.resolve(&PathBuf::from(ROOT))
            .ok_or_else(|| SourceError::NotFound(ROOT.into()))
    }

    fn resolve(&self, id: &PathBuf) -> Option<MemEntry> {
        let kind = self.fs.kind(id)?;
        Some(MemEntry {
            path: id.clone(),
            kind,
            fs: Arc::clone(&self.fs),
        })
    }

    fn parent_of(&self, id: &PathBuf) -> Option<PathBuf> {
        if id == Path::new(ROOT) || !id.starts_with(ROOT) {
            return None;
        }
        id.parent().map(Path::to_path_buf)
    }
}

/// Holds background jobs until the test runs them, in any order.
#[derive(Default)]
pub struct ManualScheduler {
    jobs: Mutex<Vec<Job>>,
}

impl ManualScheduler {
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run the job submitted `nth` (0-based among those still pending).
    pub fn run(&self, nth: usize) {
        let job = self.jobs.lock().remove(nth);
        job();
    }

    pub fn run_all(&self) {
        let jobs = std::mem::take(&mut *self.jobs.lock());
        for job in jobs {
            job();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn spawn(&self, job: Job) {
        self.jobs.lock().push(job);
    }
}

pub fn p(path: &str) -> PathBuf {
    PathBuf::from(path)
}

/// A view over `source` whose walks run inline on `fill`/`refresh`.
pub fn inline_view(source: Arc<MemSource>, config: TreeConfig) -> TreeView<MemSource> {
    TreeView::new(EngineContext::inline(source, config))
}

/// Fill and wait for the attach, failing the test after 30 seconds.
pub fn load(view: &mut TreeView<MemSource>, source: &Arc<MemSource>) {
    view.fill(Arc::clone(source));
    assert!(
        view.pump_until_idle(Duration::from_secs(30)),
        "load did not finish within 30 seconds"
    );
}

pub fn settle(view: &mut TreeView<MemSource>) {
    assert!(
        view.pump_until_idle(Duration::from_secs(30)),
        "queue did not drain within 30 seconds"
    );
}
