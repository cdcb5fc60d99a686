/// A single position in the displayed tree.
///
/// Nodes are stored in a flat arena (see [`TreeModel`](super::TreeModel)).
/// Parent-child relationships use indices rather than pointers, so a node
/// can be detached and re-attached elsewhere without touching its subtree.
use crate::source::{Element, IdOf};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Lightweight index into the arena.
///
/// A slot is recycled once its node is removed, and every recycle bumps the
/// slot's generation. An index held across a removal therefore stops
/// resolving instead of aliasing whatever node takes the slot next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex {
    slot: u32,
    generation: u32,
}

impl NodeIndex {
    /// Index of `slot` at generation 0, panicking in debug builds if it exceeds `u32::MAX`.
    #[inline]
    pub fn new(slot: usize) -> Self {
        Self::versioned(slot, 0)
    }

    #[inline]
    pub(crate) fn versioned(slot: usize, generation: u32) -> Self {
        debug_assert!(slot <= u32::MAX as usize, "NodeIndex overflow");
        Self {
            slot: slot as u32,
            generation,
        }
    }

    /// Return the slot as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.slot as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Discriminator used for sort order and capability defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Container,
    Leaf,
}

impl NodeKind {
    /// Sort rank: containers before leaves.
    #[inline]
    pub fn rank(self) -> u8 {
        match self {
            Self::Container => 0,
            Self::Leaf => 1,
        }
    }

    #[inline]
    pub fn is_container(self) -> bool {
        self == Self::Container
    }

    /// Default capabilities for this kind. Elements may override any of them.
    pub fn capabilities(self) -> &'static KindCapabilities {
        match self {
            Self::Container => &CONTAINER_CAPABILITIES,
            Self::Leaf => &LEAF_CAPABILITIES,
        }
    }
}

/// Per-kind capability table entry.
#[derive(Debug)]
pub struct KindCapabilities {
    pub can_move: bool,
    pub can_copy: bool,
    /// Whether a node of this kind accepts a dropped candidate of `candidate` kind.
    pub accepts: fn(candidate: NodeKind, is_copy: bool) -> bool,
}

static CONTAINER_CAPABILITIES: KindCapabilities = KindCapabilities {
    can_move: true,
    can_copy: true,
    accepts: accept_any,
};

static LEAF_CAPABILITIES: KindCapabilities = KindCapabilities {
    can_move: true,
    can_copy: true,
    accepts: accept_none,
};

fn accept_any(_candidate: NodeKind, _is_copy: bool) -> bool {
    true
}

fn accept_none(_candidate: NodeKind, _is_copy: bool) -> bool {
    false
}

/// Default sibling order: kind rank, then case-insensitive name.
pub fn default_order(a_kind: NodeKind, a_name: &str, b_kind: NodeKind, b_name: &str) -> Ordering {
    a_kind
        .rank()
        .cmp(&b_kind.rank())
        .then_with(|| cmp_ignore_case(a_name, b_name))
}

/// Compare two names case-insensitively without allocating.
pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// One wrapped domain object in the tree.
#[derive(Debug, Clone)]
pub struct TreeNode<E: Element> {
    /// Stable key; equal across rebuilds for the same domain entity.
    pub identity: IdOf<E>,

    /// Non-owning handle to the domain object.
    pub element: E,

    pub kind: NodeKind,

    /// Display name captured when the node was created or last rekeyed.
    pub name: CompactString,

    /// `None` for the root and for detached nodes.
    pub parent: Option<NodeIndex>,

    /// Children in sibling order.
    pub children: Vec<NodeIndex>,

    pub expanded: bool,

    /// Number of leaf descendants, maintained by the prepare/commit protocol.
    pub leaf_count: usize,
}

impl<E: Element> TreeNode<E> {
    /// Wrap a domain element. Pure: the same element always yields the same identity.
    pub fn for_element(element: E) -> Self {
        Self {
            identity: element.identity(),
            kind: element.kind(),
            name: element.display_name(),
            element,
            parent: None,
            children: Vec::new(),
            expanded: false,
            leaf_count: 0,
        }
    }

    #[inline]
    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }

    /// Weight this node contributes to its ancestors' `leaf_count`.
    #[inline]
    pub(crate) fn leaf_weight(&self) -> usize {
        self.leaf_count + usize::from(!self.is_container())
    }
}
