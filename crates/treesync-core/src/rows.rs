/// Flattening of the expanded portion of a tree into rows for a
/// virtualised view.
use crate::model::{NodeIndex, TreeModel};
use crate::source::Element;

/// What a row shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowContent {
    /// The single placeholder shown while a full population is in flight.
    Loading,
    Node(NodeIndex),
}

/// A row in the flattened visible-rows list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRow {
    pub content: RowContent,
    /// Nesting depth (0 = root).
    pub depth: u16,
    /// Whether this node's children follow it in the list.
    pub is_expanded: bool,
    pub is_selected: bool,
}

impl VisibleRow {
    pub fn loading() -> Self {
        Self {
            content: RowContent::Loading,
            depth: 0,
            is_expanded: false,
            is_selected: false,
        }
    }

    pub fn node(&self) -> Option<NodeIndex> {
        match self.content {
            RowContent::Node(idx) => Some(idx),
            RowContent::Loading => None,
        }
    }
}

/// Maximum rows produced by [`build_rows`].
///
/// A fully expanded multi-million-node tree would otherwise allocate an
/// unbounded list; callers collapse nodes to explore deeper.
pub const MAX_VISIBLE_ROWS: usize = 500_000;

const _: () = assert!(MAX_VISIBLE_ROWS > 0, "MAX_VISIBLE_ROWS must be > 0");

/// Rows for the root and every descendant reachable through expanded nodes,
/// in display order.
pub fn build_rows<E: Element>(model: &TreeModel<E>, selected: Option<NodeIndex>) -> Vec<VisibleRow> {
    let mut rows = Vec::new();
    let Some(root) = model.root() else {
        return rows;
    };

    let mut stack = vec![(root, 0u16)];
    while let Some((idx, depth)) = stack.pop() {
        if rows.len() >= MAX_VISIBLE_ROWS {
            break;
        }
        let Some(node) = model.node(idx) else {
            continue;
        };
        let is_expanded = node.expanded && !node.children.is_empty();
        rows.push(VisibleRow {
            content: RowContent::Node(idx),
            depth,
            is_expanded,
            is_selected: selected == Some(idx),
        });
        if is_expanded {
            let child_depth = depth.saturating_add(1);
            stack.extend(node.children.iter().rev().map(|&c| (c, child_depth)));
        }
    }
    rows
}
