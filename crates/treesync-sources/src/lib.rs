/// Domain adapters for the TreeSync engine.
///
/// - [`fs`]: a directory tree, keyed by absolute path.
/// - [`scene`]: an in-memory scene graph, keyed by opaque numeric ids.
///
/// Both implement [`treesync_core::Source`]; neither knows about rows,
/// loading or patches.
pub mod fs;
pub mod scene;

pub use fs::{FsEntry, FsSource};
pub use scene::{SceneGraph, SceneHandle, SceneId, SceneKind, SceneSource, SharedScene};
