/// Incremental patches: single edits reconciled against the live tree
/// without a rebuild.
///
/// Every lookup goes through the identity index. A patch that names an
/// identity the tree no longer holds is a no-op, as is any patch applied
/// while a full load has the model cleared.
use super::TreeView;
use crate::model::{Identity, NodeIndex};
use crate::populate::Walker;
use crate::source::{Element, IdOf, Source};
use tracing::{debug, trace};

/// One pending edit, consumed by [`TreeView::apply`].
#[derive(Debug, Clone)]
pub enum Patch<E: Element> {
    /// A domain object appeared; the tree locates its parent itself.
    Created(IdOf<E>),
    Deleted(IdOf<E>),
    /// The object at `from` now lives at `to`, possibly under a new parent.
    Moved { from: IdOf<E>, to: IdOf<E> },
    /// Same parent, new identity or display name.
    Renamed { from: IdOf<E>, to: IdOf<E> },
    /// `old` under `parent` was swapped for `new` in place.
    Replaced { parent: IdOf<E>, old: IdOf<E>, new: E },
    /// Positional insert for producers that know the exact placement.
    Added { parent: IdOf<E>, child: E, index: usize },
    Removed { parent: IdOf<E>, child: IdOf<E> },
}

impl<E: Element> Patch<E> {
    pub fn label(&self) -> &'static str {
        match self {
            Patch::Created(_) => "created",
            Patch::Deleted(_) => "deleted",
            Patch::Moved { .. } => "moved",
            Patch::Renamed { .. } => "renamed",
            Patch::Replaced { .. } => "replaced",
            Patch::Added { .. } => "added",
            Patch::Removed { .. } => "removed",
        }
    }
}

/// Where a created node attaches.
enum Anchor<I> {
    /// The parent is already in the tree.
    Present(NodeIndex),
    /// Ancestors are missing; `top` is the highest missing one and `below`
    /// is the live node it belongs under.
    Missing { below: NodeIndex, top: I },
}

impl<S: Source> TreeView<S> {
    /// Apply one patch immediately. Returns `true` if the tree changed.
    pub fn apply(&mut self, patch: Patch<S::Element>) -> bool {
        if self.model().root().is_none() {
            debug!(kind = patch.label(), "patch ignored: no live tree");
            return false;
        }
        trace!(?patch, "applying patch");
        let changed = match patch {
            Patch::Created(id) => self.created(&id),
            Patch::Deleted(id) => self.deleted(&id),
            Patch::Moved { from, to } => self.moved(&from, &to),
            Patch::Renamed { from, to } => self.renamed(&from, &to),
            Patch::Replaced { parent, old, new } => self.replaced(&parent, &old, new),
            Patch::Added { parent, child, index } => self.added(&parent, child, index),
            Patch::Removed { parent, child } => self.removed(&parent, &child),
        };
        if changed {
            self.fix_selection();
        }
        changed
    }

    fn created(&mut self, id: &IdOf<S::Element>) -> bool {
        if self.model().contains(id) {
            return false;
        }
        let Some(element) = self.source().resolve(id) else {
            debug!(identity = ?id, "created: source cannot resolve");
            return false;
        };
        if !self.filter().accepts(element.kind(), &element.display_name()) {
            return false;
        }

        let (parent, element) = match self.anchor(id) {
            Some(Anchor::Present(parent)) => (parent, element),
            Some(Anchor::Missing { below, top }) => {
                // Growing the top missing ancestor brings `id` in with it.
                let Some(top_element) = self.source().resolve(&top) else {
                    return false;
                };
                (below, top_element)
            }
            None => {
                debug!(identity = ?id, "created: no ancestor in tree");
                return false;
            }
        };

        let Some(top) = self.grow(parent, element, None) else {
            return false;
        };
        if self.filter().prunes_empty_containers() {
            let model = self.model_mut();
            model.prune_empty_under(top);
            model.prune_upwards(parent);
        }
        self.model().contains(id)
    }

    /// Find the nearest live ancestor of `id` through the source.
    fn anchor(&self, id: &IdOf<S::Element>) -> Option<Anchor<IdOf<S::Element>>> {
        let source = self.source();
        let mut cursor = source.parent_of(id)?;
        let mut top = None;
        loop {
            if let Some(idx) = self.model().find(&cursor) {
                return Some(match top {
                    None => Anchor::Present(idx),
                    Some(top) => Anchor::Missing { below: idx, top },
                });
            }
            let next = source.parent_of(&cursor)?;
            top = Some(cursor);
            cursor = next;
        }
    }

    fn grow(&mut self, parent: NodeIndex, element: S::Element, at: Option<usize>) -> Option<NodeIndex> {
        let filter = self.filter().clone();
        let mut ignore = |_: u64| {};
        let mut walker = Walker::new(&filter, 0, &mut ignore);
        let top = walker.grow(self.model_mut(), parent, element, at);
        if walker.skipped > 0 {
            debug!(skipped = walker.skipped, "patch subtree has unreadable containers");
        }
        top
    }

    fn deleted(&mut self, id: &IdOf<S::Element>) -> bool {
        let Some(idx) = self.model().find(id) else {
            debug!(identity = ?id, "deleted: not in tree");
            return false;
        };
        let parent = self.model().parent(idx);
        let prune = self.filter().prunes_empty_containers();
        let model = self.model_mut();
        model.remove_subtree(idx);
        if let (true, Some(parent)) = (prune, parent) {
            model.prune_upwards(parent);
        }
        true
    }

    fn moved(&mut self, from: &IdOf<S::Element>, to: &IdOf<S::Element>) -> bool {
        let Some(idx) = self.model().find(from) else {
            debug!(identity = ?from, "moved: not in tree");
            return false;
        };
        let Some(parent_id) = self.source().parent_of(to) else {
            return false;
        };
        let Some(new_parent) = self.model().find(&parent_id) else {
            debug!(identity = ?parent_id, "moved: destination not in tree");
            return false;
        };
        if self.model().is_within(new_parent, idx) {
            debug!(identity = ?from, "moved: refusing to move into own subtree");
            return false;
        }
        if !self.clear_destination(idx, to) {
            return false;
        }

        let old_parent = self.model().parent(idx);
        if !self.model_mut().move_subtree(idx, new_parent) {
            return false;
        }
        self.model_mut().rekey_subtree(idx, from, to);
        self.settle(idx, old_parent.into_iter().chain([new_parent]));
        true
    }

    fn renamed(&mut self, from: &IdOf<S::Element>, to: &IdOf<S::Element>) -> bool {
        let Some(idx) = self.model().find(from) else {
            debug!(identity = ?from, "renamed: not in tree");
            return false;
        };
        if !self.clear_destination(idx, to) {
            return false;
        }
        let parent = self.model().parent(idx);
        self.model_mut().rekey_subtree(idx, from, to);
        self.settle(idx, parent);
        true
    }

    /// Remove a stale node already sitting at `to`. Returns `false` if that
    /// node overlaps the subtree being moved.
    fn clear_destination(&mut self, moving: NodeIndex, to: &IdOf<S::Element>) -> bool {
        let Some(stale) = self.model().find(to) else {
            return true;
        };
        if stale == moving {
            return true;
        }
        if self.model().is_within(moving, stale) || self.model().is_within(stale, moving) {
            debug!(identity = ?to, "destination overlaps moved subtree");
            return false;
        }
        debug!(identity = ?to, "removing stale node at destination");
        self.model_mut().remove_subtree(stale);
        true
    }

    /// After a rekey: drop `idx` if the filter now rejects it, then prune
    /// containers the edit may have emptied.
    fn settle(&mut self, idx: NodeIndex, touched: impl IntoIterator<Item = NodeIndex>) {
        let rejected = self
            .model()
            .node(idx)
            .is_some_and(|n| !self.filter().accepts(n.kind, &n.name));
        let prune = self.filter().prunes_empty_containers();
        let model = self.model_mut();
        if rejected {
            model.remove_subtree(idx);
        }
        if prune {
            for parent in touched {
                model.prune_upwards(parent);
            }
        }
    }

    fn replaced(&mut self, parent_id: &IdOf<S::Element>, old_id: &IdOf<S::Element>, new: S::Element) -> bool {
        let Some(parent) = self.model().find(parent_id) else {
            return false;
        };
        let Some(old) = self.model().find(old_id) else {
            debug!(identity = ?old_id, "replaced: not in tree");
            return false;
        };
        if self.model().parent(old) != Some(parent) {
            debug!(identity = ?old_id, "replaced: not a child of the given parent");
            return false;
        }

        let new_id = new.identity();
        let model = self.model();
        let expanded: Vec<IdOf<S::Element>> = model
            .subtree(old)
            .into_iter()
            .filter_map(|i| model.node(i))
            .filter(|n| n.expanded)
            .map(|n| n.identity.rebase(old_id, &new_id))
            .collect();
        let selected = self
            .selected
            .filter(|&s| model.is_within(s, old))
            .and_then(|s| model.node(s))
            .map(|n| n.identity.rebase(old_id, &new_id));
        let position = model.position(old);

        self.model_mut().remove_subtree(old);
        if !self.filter().accepts(new.kind(), &new.display_name()) {
            return true;
        }
        let Some(top) = self.grow(parent, new, position) else {
            return true;
        };
        if self.filter().prunes_empty_containers() {
            self.model_mut().prune_empty_under(top);
        }

        for id in &expanded {
            if let Some(idx) = self.model().find(id) {
                self.model_mut().set_expanded(idx, true);
            }
        }
        if let Some(id) = selected {
            if let Some(idx) = self.model().find(&id) {
                self.selected = Some(idx);
            }
        }
        true
    }

    fn added(&mut self, parent_id: &IdOf<S::Element>, child: S::Element, index: usize) -> bool {
        let Some(parent) = self.model().find(parent_id) else {
            debug!(identity = ?parent_id, "added: parent not in tree");
            return false;
        };
        if self.model().contains(&child.identity()) {
            return false;
        }
        if !self.filter().accepts(child.kind(), &child.display_name()) {
            return false;
        }
        let Some(top) = self.grow(parent, child, Some(index)) else {
            return false;
        };
        if self.filter().prunes_empty_containers() {
            return self.model_mut().prune_empty_under(top) == 0;
        }
        true
    }

    fn removed(&mut self, parent_id: &IdOf<S::Element>, child_id: &IdOf<S::Element>) -> bool {
        let (Some(parent), Some(child)) = (self.model().find(parent_id), self.model().find(child_id)) else {
            return false;
        };
        if self.model().parent(child) != Some(parent) {
            debug!(identity = ?child_id, "removed: not a child of the given parent");
            return false;
        }
        let prune = self.filter().prunes_empty_containers();
        let model = self.model_mut();
        model.remove_subtree(child);
        if prune {
            model.prune_upwards(parent);
        }
        true
    }
}
