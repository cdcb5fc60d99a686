/// Arena-backed tree of wrapped domain objects with an identity index.
///
/// All nodes live in a single `Vec` of slots. Relationships use `NodeIndex`
/// rather than pointers, and a parallel `identity -> NodeIndex` map turns
/// every patch lookup into a hash lookup instead of a tree scan. Removed
/// slots go on a free list and are reused with a bumped generation, so the
/// arena stays bounded by the peak live count and a stale `NodeIndex`
/// resolves to `None` instead of to an unrelated node.
use super::identity::Identity;
use super::node::{default_order, NodeIndex, TreeNode};
use crate::source::{ChildEdit, ChildState, Element, IdOf};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::error;

/// Proof that a container was notified before a structural edit.
///
/// Produced by [`TreeModel::prepare`] and consumed by [`TreeModel::commit`].
#[derive(Debug)]
#[must_use = "an edit token must be committed"]
pub struct EditToken {
    parent: NodeIndex,
    edit: ChildEdit,
    weight: usize,
    before: ChildState,
}

/// One arena slot. `node` is `None` while the slot sits on the free list.
#[derive(Debug, Clone)]
struct Slot<E: Element> {
    generation: u32,
    node: Option<TreeNode<E>>,
}

/// The authoritative in-memory tree.
#[derive(Debug, Clone)]
pub struct TreeModel<E: Element> {
    nodes: Vec<Slot<E>>,

    /// Vacant slots, reused before the arena grows.
    free: Vec<u32>,

    /// Identity of every live node.
    index: HashMap<IdOf<E>, NodeIndex>,

    root: Option<NodeIndex>,
}

impl<E: Element> Default for TreeModel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Element> TreeModel<E> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty model with pre-allocated capacity.
    pub fn with_capacity(estimated_nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(estimated_nodes),
            free: Vec::new(),
            index: HashMap::with_capacity(estimated_nodes),
            root: None,
        }
    }

    #[inline]
    pub fn root(&self) -> Option<NodeIndex> {
        self.root
    }

    /// Number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Slots in the arena, live or vacant.
    #[inline]
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn node(&self, index: NodeIndex) -> Option<&TreeNode<E>> {
        self.nodes
            .get(index.idx())
            .filter(|s| s.generation == index.generation())
            .and_then(|s| s.node.as_ref())
    }

    #[inline]
    fn node_mut(&mut self, index: NodeIndex) -> Option<&mut TreeNode<E>> {
        self.nodes
            .get_mut(index.idx())
            .filter(|s| s.generation == index.generation())
            .and_then(|s| s.node.as_mut())
    }

    /// Resolve an identity to its live node.
    #[inline]
    pub fn find(&self, id: &IdOf<E>) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &IdOf<E>) -> Option<&TreeNode<E>> {
        self.find(id).and_then(|idx| self.node(idx))
    }

    #[inline]
    pub fn contains(&self, id: &IdOf<E>) -> bool {
        self.index.contains_key(id)
    }

    /// Direct children in sibling order. Empty for unknown indices.
    pub fn children(&self, index: NodeIndex) -> &[NodeIndex] {
        self.node(index)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    #[inline]
    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.node(index).and_then(|n| n.parent)
    }

    /// Position of `index` among its siblings.
    pub fn position(&self, index: NodeIndex) -> Option<usize> {
        let parent = self.parent(index)?;
        self.children(parent).iter().position(|&c| c == index)
    }

    /// Ancestors of `index`, nearest first.
    pub fn ancestors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut cursor = self.parent(index);
        while let Some(idx) = cursor {
            out.push(idx);
            cursor = self.parent(idx);
        }
        out
    }

    /// `true` if `index` is `ancestor` or lies below it.
    pub fn is_within(&self, index: NodeIndex, ancestor: NodeIndex) -> bool {
        let mut cursor = Some(index);
        while let Some(idx) = cursor {
            if idx == ancestor {
                return true;
            }
            cursor = self.parent(idx);
        }
        false
    }

    /// `top` and all its descendants in pre-order.
    pub fn subtree(&self, top: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        if self.node(top).is_none() {
            return out;
        }
        let mut stack = vec![top];
        while let Some(idx) = stack.pop() {
            out.push(idx);
            stack.extend(self.children(idx).iter().rev());
        }
        out
    }

    /// Every live node in display order, paired with its depth.
    pub fn walk(&self) -> Vec<(NodeIndex, usize)> {
        let mut out = Vec::with_capacity(self.len());
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![(root, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            out.push((idx, depth));
            stack.extend(self.children(idx).iter().rev().map(|&c| (c, depth + 1)));
        }
        out
    }

    /// `(depth, identity)` for every node in display order.
    ///
    /// Two models with equal outlines have the same shape and sibling order.
    pub fn outline(&self) -> Vec<(usize, IdOf<E>)> {
        self.walk()
            .into_iter()
            .filter_map(|(idx, depth)| self.node(idx).map(|n| (depth, n.identity.clone())))
            .collect()
    }

    pub fn child_state(&self, index: NodeIndex) -> ChildState {
        self.node(index)
            .map(|n| ChildState {
                child_count: n.children.len(),
                leaf_count: n.leaf_count,
            })
            .unwrap_or_default()
    }

    fn live_nodes(&self) -> impl Iterator<Item = &TreeNode<E>> {
        self.index.values().filter_map(|&idx| self.node(idx))
    }

    pub fn expanded_count(&self) -> usize {
        self.live_nodes().filter(|n| n.expanded).count()
    }

    pub fn expanded_identities(&self) -> Vec<IdOf<E>> {
        self.live_nodes()
            .filter(|n| n.expanded)
            .map(|n| n.identity.clone())
            .collect()
    }

    /// Set the expanded flag. Leaves with no children cannot be expanded.
    ///
    /// Returns `true` if the flag changed.
    pub fn set_expanded(&mut self, index: NodeIndex, expanded: bool) -> bool {
        let Some(node) = self.node_mut(index) else {
            return false;
        };
        if expanded && !node.is_container() && node.children.is_empty() {
            return false;
        }
        let changed = node.expanded != expanded;
        node.expanded = expanded;
        changed
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.index.clear();
        self.root = None;
    }

    /// Discard everything and start a new tree at `element`.
    pub fn set_root(&mut self, element: E) -> NodeIndex {
        self.clear();
        let idx = NodeIndex::new(0);
        self.index.insert(element.identity(), idx);
        self.nodes.push(Slot {
            generation: 0,
            node: Some(TreeNode::for_element(element)),
        });
        self.root = Some(idx);
        idx
    }

    /// Allocate a detached node. Refuses duplicate identities.
    fn alloc(&mut self, node: TreeNode<E>) -> Option<NodeIndex> {
        if let Some(&existing) = self.index.get(&node.identity) {
            debug_assert!(
                false,
                "duplicate identity {:?} (already at {existing:?})",
                node.identity
            );
            error!(identity = ?node.identity, "refusing to insert a duplicate identity");
            return None;
        }
        let identity = node.identity.clone();
        let idx = match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.nodes[slot as usize];
                entry.node = Some(node);
                NodeIndex::versioned(slot as usize, entry.generation)
            }
            None => {
                self.nodes.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeIndex::new(self.nodes.len() - 1)
            }
        };
        self.index.insert(identity, idx);
        Some(idx)
    }

    /// Vacate the slot behind `idx` and put it on the free list.
    fn release(&mut self, idx: NodeIndex) -> Option<TreeNode<E>> {
        self.node(idx)?;
        let entry = &mut self.nodes[idx.idx()];
        let node = entry.node.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(idx.idx() as u32);
        node
    }

    // ── Two-phase edit protocol ──────────────────────────────────────────

    /// First half of every structural edit under `parent`.
    ///
    /// The parent element's [`Element::on_child_prepare`] runs here, while
    /// the tree is still in its pre-edit state. `subject` is the child about
    /// to be added or removed.
    pub fn prepare(&self, parent: NodeIndex, edit: ChildEdit, subject: NodeIndex) -> EditToken {
        let before = self.child_state(parent);
        let weight = self.node(subject).map_or(0, TreeNode::leaf_weight);
        if let Some(p) = self.node(parent) {
            p.element.on_child_prepare(edit, before);
        }
        EditToken {
            parent,
            edit,
            weight,
            before,
        }
    }

    /// Second half: updates derived counts on every ancestor, then runs
    /// [`Element::on_child_commit`] against the post-edit state.
    pub fn commit(&mut self, token: EditToken) -> ChildState {
        let mut cursor = Some(token.parent);
        while let Some(idx) = cursor {
            let Some(node) = self.node_mut(idx) else {
                break;
            };
            match token.edit {
                ChildEdit::Add => node.leaf_count += token.weight,
                ChildEdit::Remove => node.leaf_count = node.leaf_count.saturating_sub(token.weight),
            }
            cursor = node.parent;
        }

        let after = self.child_state(token.parent);
        debug_assert_eq!(
            after.child_count,
            match token.edit {
                ChildEdit::Add => token.before.child_count + 1,
                ChildEdit::Remove => token.before.child_count.saturating_sub(1),
            },
            "an edit must change exactly one child"
        );
        if let Some(p) = self.node(token.parent) {
            p.element.on_child_commit(token.edit, after);
        }
        after
    }

    // ── Structural edits ─────────────────────────────────────────────────

    /// Insert `element` under `parent` at its sorted position.
    pub fn insert_child(&mut self, parent: NodeIndex, element: E) -> Option<NodeIndex> {
        self.insert(parent, element, None)
    }

    /// Insert `element` at `index` among `parent`'s children, then re-sort.
    ///
    /// Sorting is stable, so `index` decides placement among siblings that
    /// compare equal.
    pub fn insert_child_at(&mut self, parent: NodeIndex, element: E, index: usize) -> Option<NodeIndex> {
        self.insert(parent, element, Some(index))
    }

    fn insert(&mut self, parent: NodeIndex, element: E, at: Option<usize>) -> Option<NodeIndex> {
        self.node(parent)?;
        let idx = self.alloc(TreeNode::for_element(element))?;
        self.link(parent, idx, at);
        Some(idx)
    }

    fn link(&mut self, parent: NodeIndex, child: NodeIndex, at: Option<usize>) -> bool {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return false;
        }
        let token = self.prepare(parent, ChildEdit::Add, child);
        let position = match at {
            Some(i) => i.min(self.children(parent).len()),
            None => self.sorted_position(parent, child),
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.insert(position, child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
        if at.is_some() {
            self.resort_children(parent);
        }
        self.commit(token);
        true
    }

    fn unlink(&mut self, child: NodeIndex) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        let token = self.prepare(parent, ChildEdit::Remove, child);
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|&c| c != child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
        self.commit(token);
        true
    }

    /// Remove `top` and everything below it. Removing the root empties the model.
    ///
    /// Returns the number of nodes removed.
    pub fn remove_subtree(&mut self, top: NodeIndex) -> usize {
        if self.node(top).is_none() {
            return 0;
        }
        if Some(top) == self.root {
            let removed = self.len();
            self.clear();
            return removed;
        }

        self.unlink(top);
        let doomed = self.subtree(top);
        for &idx in &doomed {
            if let Some(node) = self.release(idx) {
                if self.index.get(&node.identity) == Some(&idx) {
                    self.index.remove(&node.identity);
                }
            }
        }
        doomed.len()
    }

    /// Re-parent `top` (with its subtree) under `new_parent`.
    ///
    /// Refuses to move the root or to move a node into its own subtree.
    pub fn move_subtree(&mut self, top: NodeIndex, new_parent: NodeIndex) -> bool {
        if Some(top) == self.root
            || self.node(top).is_none()
            || self.node(new_parent).is_none()
            || self.is_within(new_parent, top)
        {
            return false;
        }
        if self.parent(top) == Some(new_parent) {
            return true;
        }
        self.unlink(top);
        self.link(new_parent, top, None)
    }

    /// Rewrite identities of `top` and its descendants after the entity at
    /// `from` became `to`, refresh their elements and re-sort `top` among its
    /// siblings.
    ///
    /// `top` is always refreshed, even when its identity is unchanged, so an
    /// opaque-keyed rename still picks up the new display name.
    /// Returns the number of identities rewritten.
    pub fn rekey_subtree(&mut self, top: NodeIndex, from: &IdOf<E>, to: &IdOf<E>) -> usize {
        let mut rewritten = 0;
        for idx in self.subtree(top) {
            let Some(node) = self.node(idx) else {
                continue;
            };
            let new_id = node.identity.rebase(from, to);
            let changed = new_id != node.identity;
            if !changed && idx != top {
                continue;
            }
            if changed {
                if let Some(&other) = self.index.get(&new_id) {
                    debug_assert!(false, "rekey collides with live identity {new_id:?}");
                    error!(identity = ?new_id, ?other, "rekey would duplicate an identity");
                    continue;
                }
            }

            let Some(node) = self.node_mut(idx) else {
                continue;
            };
            let old_id = std::mem::replace(&mut node.identity, new_id.clone());
            node.element = node.element.relocated(&new_id);
            node.name = node.element.display_name();
            if changed {
                self.index.remove(&old_id);
                self.index.insert(new_id, idx);
                rewritten += 1;
            }
        }

        if let Some(parent) = self.parent(top) {
            self.resort_children(parent);
        }
        rewritten
    }

    /// Restore sibling order under `parent` (stable).
    pub fn resort_children(&mut self, parent: NodeIndex) {
        let Some(node) = self.node_mut(parent) else {
            return;
        };
        let mut children = std::mem::take(&mut node.children);
        children.sort_by(|&a, &b| self.compare(a, b));
        if let Some(node) = self.node_mut(parent) {
            node.children = children;
        }
    }

    fn compare(&self, a: NodeIndex, b: NodeIndex) -> Ordering {
        match (self.node(a), self.node(b)) {
            (Some(a), Some(b)) => compare_nodes(a, b),
            _ => Ordering::Equal,
        }
    }

    fn sorted_position(&self, parent: NodeIndex, child: NodeIndex) -> usize {
        let Some(c) = self.node(child) else {
            return 0;
        };
        self.children(parent).partition_point(|&s| {
            self.node(s)
                .is_some_and(|s| compare_nodes(s, c) != Ordering::Greater)
        })
    }

    // ── Pruning ──────────────────────────────────────────────────────────

    /// Remove every container left without children, bottom-up. Never the root.
    pub fn prune_empty_containers(&mut self) -> usize {
        match self.root {
            Some(root) => self.prune_empty_under(root),
            None => 0,
        }
    }

    /// Post-order prune of `top`'s subtree, including `top` itself unless it is the root.
    ///
    /// Reverse pre-order visits every descendant before its ancestor, so a
    /// container emptied by pruning its children is itself pruned in the same pass.
    pub fn prune_empty_under(&mut self, top: NodeIndex) -> usize {
        let mut removed = 0;
        for idx in self.subtree(top).into_iter().rev() {
            if Some(idx) == self.root {
                continue;
            }
            let empty = self
                .node(idx)
                .is_some_and(|n| n.is_container() && n.children.is_empty());
            if empty {
                removed += self.remove_subtree(idx);
            }
        }
        removed
    }

    /// Walk up from `from`, removing containers that are now empty.
    pub fn prune_upwards(&mut self, from: NodeIndex) -> usize {
        let mut removed = 0;
        let mut cursor = Some(from);
        while let Some(idx) = cursor {
            if Some(idx) == self.root {
                break;
            }
            let Some(node) = self.node(idx) else {
                break;
            };
            if !(node.is_container() && node.children.is_empty()) {
                break;
            }
            cursor = node.parent;
            removed += self.remove_subtree(idx);
        }
        removed
    }

    // ── Diagnostics ──────────────────────────────────────────────────────

    /// Check every structural invariant: index consistency, parent links,
    /// sibling order and derived leaf counts.
    pub fn validate(&self) -> Result<(), String> {
        let Some(root) = self.root else {
            return if self.index.is_empty() {
                Ok(())
            } else {
                Err(format!("{} indexed nodes but no root", self.index.len()))
            };
        };
        if self.parent(root).is_some() {
            return Err("root has a parent".into());
        }

        let vacant = self.nodes.iter().filter(|s| s.node.is_none()).count();
        if vacant != self.free.len() {
            return Err(format!("{vacant} vacant slots but {} on the free list", self.free.len()));
        }

        let reachable = self.subtree(root);
        if reachable.len() != self.index.len() {
            return Err(format!(
                "{} nodes reachable from root but {} indexed",
                reachable.len(),
                self.index.len()
            ));
        }

        for &idx in &reachable {
            let node = self
                .node(idx)
                .ok_or_else(|| format!("dangling child {idx:?}"))?;
            if self.index.get(&node.identity) != Some(&idx) {
                return Err(format!("index disagrees for {:?}", node.identity));
            }
            for pair in node.children.windows(2) {
                if self.compare(pair[0], pair[1]) == Ordering::Greater {
                    return Err(format!("children of {:?} out of order", node.identity));
                }
            }
            for &child in &node.children {
                if self.parent(child) != Some(idx) {
                    return Err(format!("child {child:?} of {:?} has a wrong parent", node.identity));
                }
            }
            let leaves: usize = node
                .children
                .iter()
                .filter_map(|&c| self.node(c))
                .map(TreeNode::leaf_weight)
                .sum();
            if leaves != node.leaf_count {
                return Err(format!(
                    "leaf_count of {:?} is {} but children hold {leaves}",
                    node.identity, node.leaf_count
                ));
            }
        }
        Ok(())
    }
}

/// Sibling order on the cached kind and name, or the element's own order
/// when it declares one.
fn compare_nodes<E: Element>(a: &TreeNode<E>, b: &TreeNode<E>) -> Ordering {
    if E::CUSTOM_ORDER {
        a.element.compare_order(&b.element)
    } else {
        default_order(a.kind, &a.name, b.kind, &b.name)
    }
}
