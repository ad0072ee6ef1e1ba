//! Tree and node aggregates.

pub mod ids;
pub mod node;
pub mod tree;

pub use ids::{Address, NodeId};
pub use node::{ContentChange, Node, NodeUpdateRecord, Stamped, TokenLinks};
pub use tree::{Tree, TreeView};
