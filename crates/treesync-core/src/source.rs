/// The capability contract between the engine and a domain.
///
/// The engine never touches a filesystem or scene graph directly. A domain
/// plugs in by implementing [`Element`] for its lightweight handle type and
/// [`Source`] for the object that knows the root and can resolve identities.
use crate::error::SourceError;
use crate::model::filter::Filter;
use crate::model::identity::Identity;
use crate::model::node::{default_order, NodeKind};
use compact_str::CompactString;
use std::cmp::Ordering;
use std::fmt::Debug;

/// Shorthand for an element's identity type.
pub type IdOf<E> = <E as Element>::Id;

/// Which structural edit a container is about to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEdit {
    Add,
    Remove,
}

/// A container's child bookkeeping at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildState {
    /// Direct children.
    pub child_count: usize,
    /// Leaf descendants at any depth.
    pub leaf_count: usize,
}

/// A handle to one domain object.
///
/// Handles are cheap to create and discard: children are fetched on demand
/// and never embedded. Capability defaults come from
/// [`NodeKind::capabilities`]; override a method to refine it per object.
pub trait Element: Clone + Debug + Send + Sync + 'static {
    type Id: Identity;

    /// Set when [`compare_order`](Self::compare_order) is overridden.
    /// Otherwise the tree sorts on the kind and name it cached at insert.
    const CUSTOM_ORDER: bool = false;

    fn identity(&self) -> Self::Id;

    fn display_name(&self) -> CompactString;

    fn kind(&self) -> NodeKind;

    /// List the current children, unfiltered. Recomputed on every call.
    fn read_children(&self) -> Result<Vec<Self>, SourceError>;

    /// Children that pass `filter`.
    fn children(&self, filter: &Filter) -> Result<Vec<Self>, SourceError> {
        let mut children = self.read_children()?;
        children.retain(|c| filter.accepts(c.kind(), &c.display_name()));
        Ok(children)
    }

    /// `true` if at least one child passes `filter`. Read errors count as "no".
    fn has_children(&self, filter: &Filter) -> bool {
        self.children(filter).is_ok_and(|c| !c.is_empty())
    }

    /// Sibling order. The default is containers first, then case-insensitive name.
    fn compare_order(&self, other: &Self) -> Ordering {
        default_order(
            self.kind(),
            &self.display_name(),
            other.kind(),
            &other.display_name(),
        )
    }

    fn can_move(&self) -> bool {
        self.kind().capabilities().can_move
    }

    fn can_copy(&self) -> bool {
        self.kind().capabilities().can_copy
    }

    /// Whether `candidate` may be dropped onto this element.
    fn can_accept(&self, candidate: &Self, is_copy: bool) -> bool {
        (self.kind().capabilities().accepts)(candidate.kind(), is_copy)
    }

    /// Perform a drop in the domain.
    ///
    /// Returns the identity the candidate (or its copy) has afterwards, or
    /// `None` if the domain will report the change through a notification.
    fn accept(&self, candidate: &Self, is_copy: bool) -> Result<Option<Self::Id>, SourceError> {
        let _ = is_copy;
        Err(SourceError::Rejected(format!(
            "{} does not accept {}",
            self.display_name(),
            candidate.display_name()
        )))
    }

    /// The handle for this same object after its identity changed to `id`.
    fn relocated(&self, id: &Self::Id) -> Self {
        let _ = id;
        self.clone()
    }

    /// Called on a container right before a child is added or removed.
    /// `before` is the container's state prior to the edit.
    fn on_child_prepare(&self, edit: ChildEdit, before: ChildState) {
        let _ = (edit, before);
    }

    /// Called on the same container once the edit is complete.
    fn on_child_commit(&self, edit: ChildEdit, after: ChildState) {
        let _ = (edit, after);
    }
}

/// A hierarchical domain the engine can populate from and reconcile against.
pub trait Source: Send + Sync + 'static {
    type Element: Element;

    /// The root element. Failure here fails the whole population.
    fn root(&self) -> Result<Self::Element, SourceError>;

    /// Look up the live domain object for `id`, if it still exists.
    fn resolve(&self, id: &IdOf<Self::Element>) -> Option<Self::Element>;

    /// The identity of the container `id` lives (or would live) in.
    /// `None` for the root and for identities outside this source.
    fn parent_of(&self, id: &IdOf<Self::Element>) -> Option<IdOf<Self::Element>>;
}
