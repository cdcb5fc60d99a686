/// Population walk: builds a private [`TreeModel`] from a [`Source`].
///
/// Runs on a background worker and never touches the displayed tree. The
/// same [`Walker`] also grows single subtrees for `Created` and `Replaced`
/// patches on the foreground, so a subtree inserted by a patch looks exactly
/// like one produced by a full rebuild.
use crate::error::PopulationError;
use crate::model::{Filter, NodeIndex, TreeModel};
use crate::source::{Element, Source};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A finished walk, ready to be attached.
#[derive(Debug)]
pub struct Population<E: Element> {
    pub model: TreeModel<E>,
    /// Nodes inserted, root included.
    pub visited: u64,
    /// Containers whose children could not be read.
    pub skipped: u64,
    pub duration: Duration,
}

/// Depth-first builder shared by full walks and patch subtrees.
pub(crate) struct Walker<'f, 'p> {
    filter: &'f Filter,
    interval: u64,
    on_progress: &'p mut dyn FnMut(u64),
    pub(crate) visited: u64,
    pub(crate) skipped: u64,
}

impl<'f, 'p> Walker<'f, 'p> {
    pub(crate) fn new(filter: &'f Filter, interval: u64, on_progress: &'p mut dyn FnMut(u64)) -> Self {
        Self {
            filter,
            interval,
            on_progress,
            visited: 0,
            skipped: 0,
        }
    }

    fn tick(&mut self) {
        self.visited += 1;
        if self.interval > 0 && self.visited % self.interval == 0 {
            (self.on_progress)(self.visited);
        }
    }

    /// Insert `element` under `parent` (at `at` when given) and everything
    /// the filter lets through below it.
    ///
    /// Returns the index of the inserted top node, or `None` if the insert
    /// was refused (duplicate identity, unknown parent).
    pub(crate) fn grow<E: Element>(
        &mut self,
        model: &mut TreeModel<E>,
        parent: NodeIndex,
        element: E,
        at: Option<usize>,
    ) -> Option<NodeIndex> {
        let top = match at {
            Some(i) => model.insert_child_at(parent, element, i)?,
            None => model.insert_child(parent, element)?,
        };
        self.tick();
        self.descend(model, top);
        Some(top)
    }

    /// Fill in the children of `top` recursively. `top` must already be in the model.
    pub(crate) fn descend<E: Element>(&mut self, model: &mut TreeModel<E>, top: NodeIndex) {
        let mut stack = vec![top];
        while let Some(idx) = stack.pop() {
            let Some(node) = model.node(idx) else {
                continue;
            };
            let element = node.element.clone();
            let children = match element.children(self.filter) {
                Ok(children) => children,
                Err(err) => {
                    warn!(identity = ?element.identity(), %err, "skipping unreadable container");
                    self.skipped += 1;
                    continue;
                }
            };
            for child in children {
                if let Some(child_idx) = model.insert_child(idx, child) {
                    self.tick();
                    stack.push(child_idx);
                }
            }
        }
    }
}

/// Walk `source` from its root and return a complete model.
///
/// Fails only if the root itself cannot be resolved or listed. Unreadable
/// containers further down are left empty and counted in
/// [`Population::skipped`]. When the filter prunes, containers left without
/// children are removed before the model is returned.
pub fn populate<S: Source>(
    source: &S,
    filter: &Filter,
    progress_interval: u64,
    on_progress: &mut dyn FnMut(u64),
) -> Result<Population<S::Element>, PopulationError> {
    let start = Instant::now();
    let root = source.root().map_err(PopulationError::Root)?;
    let top_level = root.children(filter).map_err(PopulationError::Root)?;

    let mut model = TreeModel::with_capacity(top_level.len() + 1);
    let root_idx = model.set_root(root);
    let mut walker = Walker::new(filter, progress_interval, on_progress);
    walker.visited = 1;

    for child in top_level {
        walker.grow(&mut model, root_idx, child, None);
    }

    if filter.prunes_empty_containers() {
        let pruned = model.prune_empty_containers();
        debug!(pruned, "pruned empty containers");
    }

    let population = Population {
        visited: walker.visited,
        skipped: walker.skipped,
        model,
        duration: start.elapsed(),
    };
    debug!(
        visited = population.visited,
        skipped = population.skipped,
        nodes = population.model.len(),
        "population walk finished"
    );
    Ok(population)
}
