/// Data model for the displayed tree.
///
/// Re-exports the arena-allocated tree structure and supporting types.
pub mod filter;
pub mod identity;
pub mod node;
pub mod tree;

pub use filter::Filter;
pub use identity::Identity;
pub use node::{NodeIndex, NodeKind, TreeNode};
pub use tree::{EditToken, TreeModel};
