/// Expanded/selected state that must survive a full rebuild.
///
/// The reconciler captures identities from the outgoing tree right before a
/// refresh and reapplies them once the replacement is attached. Capture and
/// reapplication can overlap with reads from other threads (a UI adapter
/// asking what is pending), so the snapshot sits behind a `parking_lot`
/// `RwLock`. The write lock is held only for the swap itself, never while
/// walking a tree.
use crate::model::Identity;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Identities captured from one tree, to be reapplied to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot<I: Identity> {
    pub expanded: HashSet<I>,
    /// Selected identities, most relevant first.
    pub selected: Vec<I>,
}

impl<I: Identity> Default for Snapshot<I> {
    fn default() -> Self {
        Self {
            expanded: HashSet::new(),
            selected: Vec::new(),
        }
    }
}

impl<I: Identity> Snapshot<I> {
    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty() && self.selected.is_empty()
    }
}

/// Thread-safe holder for one pending [`Snapshot`].
#[derive(Debug)]
pub struct StatePreserver<I: Identity> {
    state: RwLock<Snapshot<I>>,
}

impl<I: Identity> Default for StatePreserver<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Identity> StatePreserver<I> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Snapshot::default()),
        }
    }

    /// Merge `snapshot` into the pending one. The caller builds it outside the lock.
    ///
    /// Expanded sets are unioned, so identities handed to
    /// [`remember_expanded`](Self::remember_expanded) between loads survive
    /// the capture. A non-empty selection in `snapshot` wins; an empty one
    /// keeps whatever selection is already pending.
    pub fn capture(&self, snapshot: Snapshot<I>) {
        let Snapshot { expanded, selected } = snapshot;
        let mut state = self.state.write();
        state.expanded.extend(expanded);
        if !selected.is_empty() {
            state.selected = selected;
        }
    }

    /// Add one identity to the pending expanded set.
    pub fn remember_expanded(&self, id: I) {
        self.state.write().expanded.insert(id);
    }

    /// Make `id` the pending selection.
    pub fn remember_selected(&self, id: I) {
        let mut state = self.state.write();
        state.selected.clear();
        state.selected.push(id);
    }

    /// Take the pending snapshot, leaving an empty one behind.
    pub fn take(&self) -> Snapshot<I> {
        std::mem::take(&mut *self.state.write())
    }

    /// Copy of the pending snapshot.
    pub fn peek(&self) -> Snapshot<I> {
        self.state.read().clone()
    }

    pub fn expanded_len(&self) -> usize {
        self.state.read().expanded.len()
    }

    pub fn is_pending_expanded(&self, id: &I) -> bool {
        self.state.read().expanded.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}
