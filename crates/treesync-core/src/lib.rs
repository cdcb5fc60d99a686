/// TreeSync Core: keeps a displayed tree consistent with an independently
/// mutated hierarchical source.
///
/// The crate has no knowledge of any concrete domain. A domain plugs in by
/// implementing [`Element`] and [`Source`]; see the `treesync-sources` crate
/// for the filesystem and scene-graph adapters.
///
/// # Modules
///
/// - [`model`]: arena-allocated tree with an identity index, plus filter and identity keys.
/// - [`source`]: the capability contract a domain implements.
/// - [`populate`]: background walk that builds a complete model.
/// - [`reconcile`]: the [`TreeView`] that owns the live tree, runs full
///   loads and applies incremental patches.
/// - [`preserve`]: expanded/selected state carried across rebuilds.
/// - [`scheduler`]: background worker pool and ordered foreground queue.
/// - [`transfer`]: identity-addressed drag and drop.
/// - [`rows`]: flattening into rows for a virtualised view.
/// - [`config`]: tunables and the explicit engine context.
pub mod config;
pub mod error;
pub mod model;
pub mod populate;
pub mod preserve;
pub mod reconcile;
pub mod rows;
pub mod scheduler;
pub mod source;
pub mod transfer;

pub use config::{EngineContext, TreeConfig};
pub use error::{ConfigError, PopulationError, SchedulerError, SourceError, TransferError};
pub use model::{Filter, Identity, NodeIndex, NodeKind, TreeModel, TreeNode};
pub use reconcile::{LoadOutcome, LoadPhase, Patch, TreeHandle, TreeView};
pub use rows::{RowContent, VisibleRow};
pub use source::{ChildEdit, ChildState, Element, IdOf, Source};
pub use transfer::{DragPayload, DropOutcome, TransferMode, TransferModes};
