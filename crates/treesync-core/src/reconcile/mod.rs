/// Reconciler: owns the displayed tree and keeps it in step with a source.
///
/// A [`TreeView`] lives on one thread (the UI thread, or the CLI's main
/// loop). Full rebuilds run on the background [`Scheduler`] and come back
/// as an attach task on the foreground queue; domain notifications from
/// any thread arrive through a cloneable [`TreeHandle`] and are applied as
/// patches when the owner calls [`TreeView::pump`].
///
/// ```text
///  Idle ──fill/refresh──▶ Loading ──spawn──▶ Populating ──post──▶ Attaching ──▶ Idle
/// ```
pub mod patch;

pub use patch::Patch;

use crate::config::EngineContext;
use crate::error::PopulationError;
use crate::model::{Filter, NodeIndex, TreeModel};
use crate::populate::{populate, Population};
use crate::preserve::{Snapshot, StatePreserver};
use crate::rows::{build_rows, VisibleRow};
use crate::scheduler::{ForegroundQueue, ForegroundSender};
use crate::source::{Element, IdOf, Source};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Where the view is in the full-population cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    /// Model cleared, placeholder shown.
    Loading,
    /// Walk handed to the background scheduler.
    Populating,
    /// Finished model being swapped in and state reapplied.
    Attaching,
}

/// Summary of one finished load, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub generation: u64,
    pub success: bool,
    /// Live nodes after attach (0 on failure).
    pub nodes: usize,
    /// Containers that could not be read.
    pub skipped: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Work item executed on the foreground queue.
pub enum Task<E: Element> {
    Attach {
        generation: u64,
        result: Result<Population<E>, PopulationError>,
    },
    Progress {
        generation: u64,
        visited: u64,
    },
    Patch(Patch<E>),
}

type StateCallback = Box<dyn FnMut(bool) + Send>;
type CountCallback = Box<dyn FnMut(usize) + Send>;
type FinishedCallback = Box<dyn FnMut(&LoadOutcome) + Send>;
type ProgressCallback = Box<dyn FnMut(u64) + Send>;

#[derive(Default)]
struct Callbacks {
    population_state: Option<StateCallback>,
    expansion_count: Option<CountCallback>,
    load_finished: Option<FinishedCallback>,
    progress: Option<ProgressCallback>,
}

/// The displayed tree and everything needed to keep it current.
pub struct TreeView<S: Source> {
    ctx: EngineContext<S>,
    model: TreeModel<S::Element>,
    phase: LoadPhase,
    generation: u64,
    selected: Option<NodeIndex>,
    filter: Filter,
    preserver: Arc<StatePreserver<IdOf<S::Element>>>,
    queue: ForegroundQueue<Task<S::Element>>,
    last_outcome: Option<LoadOutcome>,
    reported_expanded: usize,
    callbacks: Callbacks,
}

impl<S: Source> TreeView<S> {
    pub fn new(ctx: EngineContext<S>) -> Self {
        let filter = ctx.config.filter.clone();
        Self {
            ctx,
            model: TreeModel::new(),
            phase: LoadPhase::Idle,
            generation: 0,
            selected: None,
            filter,
            preserver: Arc::new(StatePreserver::new()),
            queue: ForegroundQueue::new(),
            last_outcome: None,
            reported_expanded: 0,
            callbacks: Callbacks::default(),
        }
    }

    // ── Full population ──────────────────────────────────────────────────

    /// Rebuild from `source`, discarding any preserved state.
    pub fn fill(&mut self, source: Arc<S>) {
        self.ctx.source = source;
        self.preserver.take();
        self.begin_load();
    }

    /// Rebuild from the current source, keeping expanded and selected nodes.
    ///
    /// With no live tree to capture from (a load is still in flight), the
    /// earlier capture stays pending.
    pub fn refresh(&mut self) {
        if self.model.root().is_some() {
            let snapshot = Snapshot {
                expanded: self.model.expanded_identities().into_iter().collect(),
                selected: self.selected_identity().into_iter().collect(),
            };
            self.preserver.capture(snapshot);
        }
        self.begin_load();
    }

    fn begin_load(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.model.clear();
        self.selected = None;
        self.phase = LoadPhase::Loading;
        info!(generation, "population started");
        if let Some(cb) = self.callbacks.population_state.as_mut() {
            cb(true);
        }
        self.sync_expansion_count();

        let source = Arc::clone(&self.ctx.source);
        let filter = self.filter.clone();
        let interval = self.ctx.config.progress_interval;
        let tx = self.queue.sender();
        self.ctx.scheduler.spawn(Box::new(move || {
            let progress_tx = tx.clone();
            let result = catch_unwind(AssertUnwindSafe(|| {
                let mut report = |visited: u64| {
                    let _ = progress_tx.send(Task::Progress { generation, visited });
                };
                populate(&*source, &filter, interval, &mut report)
            }))
            .unwrap_or(Err(PopulationError::Panicked));
            // The view may have been dropped meanwhile; nothing to attach to then.
            let _ = tx.send(Task::Attach { generation, result });
        }));
        if self.phase == LoadPhase::Loading {
            self.phase = LoadPhase::Populating;
        }
    }

    fn attach(&mut self, generation: u64, result: Result<Population<S::Element>, PopulationError>) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "discarding stale population");
            return;
        }
        self.phase = LoadPhase::Attaching;

        let outcome = match result {
            Ok(population) => {
                self.model = population.model;
                if let Some(root) = self.model.root() {
                    self.model.set_expanded(root, true);
                }
                self.restore();
                LoadOutcome {
                    generation,
                    success: true,
                    nodes: self.model.len(),
                    skipped: population.skipped,
                    duration: population.duration,
                    error: None,
                }
            }
            Err(err) => {
                warn!(generation, %err, "population failed");
                self.model.clear();
                LoadOutcome {
                    generation,
                    success: false,
                    nodes: 0,
                    skipped: 0,
                    duration: Duration::ZERO,
                    error: Some(err.to_string()),
                }
            }
        };

        self.phase = LoadPhase::Idle;
        info!(
            generation,
            success = outcome.success,
            nodes = outcome.nodes,
            skipped = outcome.skipped,
            "population finished in {:.2?}",
            outcome.duration
        );
        if let Some(cb) = self.callbacks.population_state.as_mut() {
            cb(false);
        }
        if let Some(cb) = self.callbacks.load_finished.as_mut() {
            cb(&outcome);
        }
        self.last_outcome = Some(outcome);
        self.sync_expansion_count();
    }

    /// Reapply the pending snapshot. Identities that no longer exist are dropped.
    fn restore(&mut self) {
        let snapshot = self.preserver.take();
        let mut missing = 0usize;
        for id in &snapshot.expanded {
            match self.model.find(id) {
                Some(idx) => {
                    self.model.set_expanded(idx, true);
                }
                None => missing += 1,
            }
        }
        self.selected = snapshot.selected.iter().find_map(|id| self.model.find(id));
        if missing > 0 {
            debug!(missing, "expanded nodes vanished across rebuild");
        }
    }

    // ── Foreground queue ─────────────────────────────────────────────────

    /// Run up to `max_tasks_per_pump` queued tasks. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        let tasks = self.queue.drain(self.ctx.config.max_tasks_per_pump.max(1));
        let count = tasks.len();
        for task in tasks {
            self.run(task);
        }
        if count > 0 {
            self.sync_expansion_count();
        }
        count
    }

    /// Pump until no load is in flight and the queue is empty.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn pump_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if !self.is_loading() && self.queue.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if let Some(task) = self.queue.wait(deadline - now) {
                self.run(task);
                self.sync_expansion_count();
            }
        }
    }

    fn run(&mut self, task: Task<S::Element>) {
        match task {
            Task::Attach { generation, result } => self.attach(generation, result),
            Task::Progress { generation, visited } => {
                if generation == self.generation {
                    if let Some(cb) = self.callbacks.progress.as_mut() {
                        cb(visited);
                    }
                }
            }
            Task::Patch(patch) => {
                self.apply(patch);
            }
        }
    }

    /// Queue `patch` behind everything already pending.
    pub fn submit(&self, patch: Patch<S::Element>) {
        trace!(?patch, "patch queued");
        self.queue.post(Task::Patch(patch));
    }

    /// A cloneable handle for notifying this view from other threads.
    pub fn handle(&self) -> TreeHandle<S::Element> {
        TreeHandle {
            tx: self.queue.sender(),
            preserver: Arc::clone(&self.preserver),
        }
    }

    // ── Expansion & selection ────────────────────────────────────────────

    /// Expand every ancestor of `id` and optionally select it.
    ///
    /// While a load is in flight the request is recorded and honoured when
    /// the new tree attaches. Returns `true` if the live tree changed.
    pub fn expand_to(&mut self, id: &IdOf<S::Element>, select: bool) -> bool {
        if self.model.root().is_none() {
            let mut cursor = self.ctx.source.parent_of(id);
            while let Some(ancestor) = cursor {
                cursor = self.ctx.source.parent_of(&ancestor);
                self.preserver.remember_expanded(ancestor);
            }
            if select {
                self.preserver.remember_selected(id.clone());
            }
            return false;
        }

        let Some(idx) = self.model.find(id) else {
            debug!(identity = ?id, "expand_to: not in tree");
            return false;
        };
        for ancestor in self.model.ancestors(idx) {
            self.model.set_expanded(ancestor, true);
        }
        if select {
            self.selected = Some(idx);
        }
        self.sync_expansion_count();
        true
    }

    /// Expand the node for `id`. Recorded for the next attach while loading.
    pub fn mark_expanded(&mut self, id: &IdOf<S::Element>) -> bool {
        if self.model.root().is_none() {
            self.preserver.remember_expanded(id.clone());
            return false;
        }
        let changed = self
            .model
            .find(id)
            .is_some_and(|idx| self.model.set_expanded(idx, true));
        self.sync_expansion_count();
        changed
    }

    pub fn collapse(&mut self, id: &IdOf<S::Element>) -> bool {
        let changed = self
            .model
            .find(id)
            .is_some_and(|idx| self.model.set_expanded(idx, false));
        self.sync_expansion_count();
        changed
    }

    /// Expand every node that has children.
    pub fn expand_all(&mut self) {
        for (idx, _) in self.model.walk() {
            if !self.model.children(idx).is_empty() {
                self.model.set_expanded(idx, true);
            }
        }
        self.sync_expansion_count();
    }

    /// Select `id`, or clear the selection with `None`.
    /// Returns `false` if `id` is not in the tree.
    pub fn select(&mut self, id: Option<&IdOf<S::Element>>) -> bool {
        match id {
            None => {
                self.selected = None;
                true
            }
            Some(id) => match self.model.find(id) {
                Some(idx) => {
                    self.selected = Some(idx);
                    true
                }
                None => false,
            },
        }
    }

    pub fn selected(&self) -> Option<&IdOf<S::Element>> {
        self.selected
            .and_then(|idx| self.model.node(idx))
            .map(|n| &n.identity)
    }

    fn selected_identity(&self) -> Option<IdOf<S::Element>> {
        self.selected().cloned()
    }

    /// Drop the selection if its node was removed.
    pub(crate) fn fix_selection(&mut self) {
        if self.selected.is_some_and(|idx| self.model.node(idx).is_none()) {
            self.selected = None;
        }
    }

    fn sync_expansion_count(&mut self) {
        let count = self.model.expanded_count();
        if count != self.reported_expanded {
            self.reported_expanded = count;
            if let Some(cb) = self.callbacks.expansion_count.as_mut() {
                cb(count);
            }
        }
    }

    // ── Filter ───────────────────────────────────────────────────────────

    /// Restrict leaves to `extensions`; an empty list lifts the restriction.
    /// Takes effect at the next fill/refresh.
    pub fn set_filter<I, T>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.filter = Filter::with_extensions(extensions).containers_only(self.filter.containers_only);
    }

    /// Show containers only. Takes effect at the next fill/refresh.
    pub fn set_containers_only(&mut self, enabled: bool) {
        self.filter.containers_only = enabled;
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    // ── Callbacks ────────────────────────────────────────────────────────

    /// Called with `true` when a load starts and `false` when it ends.
    pub fn set_on_population_state_changed(&mut self, cb: impl FnMut(bool) + Send + 'static) {
        self.callbacks.population_state = Some(Box::new(cb));
    }

    pub fn set_on_expansion_count_changed(&mut self, cb: impl FnMut(usize) + Send + 'static) {
        self.callbacks.expansion_count = Some(Box::new(cb));
    }

    /// Called once per attached load, including failed ones.
    pub fn set_on_load_finished(&mut self, cb: impl FnMut(&LoadOutcome) + Send + 'static) {
        self.callbacks.load_finished = Some(Box::new(cb));
    }

    /// Called with the running node count during a walk.
    pub fn set_on_progress(&mut self, cb: impl FnMut(u64) + Send + 'static) {
        self.callbacks.progress = Some(Box::new(cb));
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase != LoadPhase::Idle
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn model(&self) -> &TreeModel<S::Element> {
        &self.model
    }

    pub(crate) fn model_mut(&mut self) -> &mut TreeModel<S::Element> {
        &mut self.model
    }

    pub fn source(&self) -> &Arc<S> {
        &self.ctx.source
    }

    pub fn last_outcome(&self) -> Option<&LoadOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn preserver(&self) -> &StatePreserver<IdOf<S::Element>> {
        &self.preserver
    }

    pub fn outline(&self) -> Vec<(usize, IdOf<S::Element>)> {
        self.model.outline()
    }

    /// Rows to display: a single placeholder while loading, otherwise the
    /// expanded portion of the tree.
    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        if self.model.root().is_none() && self.is_loading() {
            return vec![VisibleRow::loading()];
        }
        build_rows(&self.model, self.selected)
    }
}

/// Thread-safe entry point for domain notifications.
///
/// Every `notify_*` call enqueues one patch; patches run in submission
/// order the next time the owning view pumps.
pub struct TreeHandle<E: Element> {
    tx: ForegroundSender<Task<E>>,
    preserver: Arc<StatePreserver<IdOf<E>>>,
}

impl<E: Element> Clone for TreeHandle<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            preserver: Arc::clone(&self.preserver),
        }
    }
}

impl<E: Element> TreeHandle<E> {
    /// Enqueue `patch`. Returns `false` if the view is gone.
    pub fn submit(&self, patch: Patch<E>) -> bool {
        trace!(?patch, "patch queued");
        self.tx.send(Task::Patch(patch)).is_ok()
    }

    pub fn notify_created(&self, id: IdOf<E>) -> bool {
        self.submit(Patch::Created(id))
    }

    pub fn notify_deleted(&self, id: IdOf<E>) -> bool {
        self.submit(Patch::Deleted(id))
    }

    pub fn notify_moved(&self, from: IdOf<E>, to: IdOf<E>) -> bool {
        self.submit(Patch::Moved { from, to })
    }

    pub fn notify_renamed(&self, from: IdOf<E>, to: IdOf<E>) -> bool {
        self.submit(Patch::Renamed { from, to })
    }

    pub fn notify_replaced(&self, parent: IdOf<E>, old: IdOf<E>, new: E) -> bool {
        self.submit(Patch::Replaced { parent, old, new })
    }

    pub fn notify_added(&self, parent: IdOf<E>, child: E, index: usize) -> bool {
        self.submit(Patch::Added { parent, child, index })
    }

    pub fn notify_removed(&self, parent: IdOf<E>, child: IdOf<E>) -> bool {
        self.submit(Patch::Removed { parent, child })
    }

    /// Ask for `id` to be expanded when the next full load attaches.
    pub fn remember_expanded(&self, id: IdOf<E>) {
        self.preserver.remember_expanded(id);
    }
}
