/// Drag-and-drop by identity.
///
/// A payload carries only an identity and a mode, never a node reference,
/// so a drop that arrives after the tree changed is re-resolved against the
/// current model and rejected quietly if either end has gone.
use crate::error::TransferError;
use crate::model::Identity;
use crate::reconcile::{Patch, TreeView};
use crate::source::{Element, IdOf, Source};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    Move,
    Copy,
}

impl TransferMode {
    #[inline]
    pub fn is_copy(self) -> bool {
        self == TransferMode::Copy
    }
}

/// Set of transfer modes a drag source or drop target allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferModes {
    pub allow_move: bool,
    pub allow_copy: bool,
}

impl TransferModes {
    pub const NONE: Self = Self {
        allow_move: false,
        allow_copy: false,
    };
    pub const MOVE: Self = Self {
        allow_move: true,
        allow_copy: false,
    };
    pub const COPY: Self = Self {
        allow_move: false,
        allow_copy: true,
    };
    pub const ALL: Self = Self {
        allow_move: true,
        allow_copy: true,
    };

    pub fn intersect(self, other: Self) -> Self {
        Self {
            allow_move: self.allow_move && other.allow_move,
            allow_copy: self.allow_copy && other.allow_copy,
        }
    }

    pub fn allows(self, mode: TransferMode) -> bool {
        match mode {
            TransferMode::Move => self.allow_move,
            TransferMode::Copy => self.allow_copy,
        }
    }

    /// Move when possible, otherwise copy.
    pub fn preferred(self) -> Option<TransferMode> {
        if self.allow_move {
            Some(TransferMode::Move)
        } else if self.allow_copy {
            Some(TransferMode::Copy)
        } else {
            None
        }
    }
}

/// The serialised form of a drag in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "I: Identity")]
pub struct DragPayload<I> {
    pub identity: I,
    pub mode: TransferMode,
}

impl<I: Identity> DragPayload<I> {
    pub fn encode(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(data: &str) -> Result<Self, TransferError> {
        Ok(serde_json::from_str(data)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome<I> {
    /// Nothing happened: a stale payload or a target that refuses it.
    Rejected,
    Accepted {
        mode: TransferMode,
        /// Identity of the moved object or its copy, when the domain reports it.
        identity: Option<I>,
    },
}

impl<S: Source> TreeView<S> {
    /// Start dragging `id`. Returns `None` if it is not in the tree or no
    /// mode is allowed by both the node and `offered`.
    pub fn begin_drag(
        &self,
        id: &IdOf<S::Element>,
        offered: TransferModes,
    ) -> Option<DragPayload<IdOf<S::Element>>> {
        let node = self.model().get(id)?;
        let own = TransferModes {
            allow_move: node.element.can_move(),
            allow_copy: node.element.can_copy(),
        };
        let mode = own.intersect(offered).preferred()?;
        Some(DragPayload {
            identity: id.clone(),
            mode,
        })
    }

    /// Whether `payload` may be dropped on `target` right now.
    pub fn can_drop(&self, payload: &DragPayload<IdOf<S::Element>>, target: &IdOf<S::Element>) -> bool {
        let model = self.model();
        let (Some(candidate), Some(target)) = (model.find(&payload.identity), model.find(target)) else {
            return false;
        };
        if model.is_within(target, candidate) {
            return false;
        }
        let (Some(candidate), Some(target)) = (model.node(candidate), model.node(target)) else {
            return false;
        };
        let allowed = match payload.mode {
            TransferMode::Move => candidate.element.can_move(),
            TransferMode::Copy => candidate.element.can_copy(),
        };
        allowed && target.element.can_accept(&candidate.element, payload.mode.is_copy())
    }

    /// Perform the drop and reconcile the result immediately.
    pub fn drop_on(
        &mut self,
        payload: &DragPayload<IdOf<S::Element>>,
        target: &IdOf<S::Element>,
    ) -> Result<DropOutcome<IdOf<S::Element>>, TransferError> {
        if !self.can_drop(payload, target) {
            debug!(identity = ?payload.identity, target = ?target, "drop rejected");
            return Ok(DropOutcome::Rejected);
        }
        let model = self.model();
        let (Some(candidate), Some(target_node)) = (model.get(&payload.identity), model.get(target)) else {
            return Ok(DropOutcome::Rejected);
        };
        let candidate = candidate.element.clone();
        let target_element = target_node.element.clone();

        let is_copy = payload.mode.is_copy();
        let identity = target_element.accept(&candidate, is_copy)?;
        if let Some(new_id) = &identity {
            let patch = if is_copy {
                Patch::Created(new_id.clone())
            } else {
                Patch::Moved {
                    from: payload.identity.clone(),
                    to: new_id.clone(),
                }
            };
            self.apply(patch);
        }
        Ok(DropOutcome::Accepted {
            mode: payload.mode,
            identity,
        })
    }

    /// [`drop_on`](Self::drop_on) for a payload still in serialised form.
    pub fn drop_encoded(
        &mut self,
        data: &str,
        target: &IdOf<S::Element>,
    ) -> Result<DropOutcome<IdOf<S::Element>>, TransferError> {
        let payload = DragPayload::decode(data)?;
        self.drop_on(&payload, target)
    }
}
