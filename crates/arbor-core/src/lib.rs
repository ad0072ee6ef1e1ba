//! arbor-core library.
//!
//! Projects a stream of tree and node events, delivered out of order and
//! possibly more than once, into per-tree aggregates. The pieces, leaves
//! first: [`ledger`] de-duplicates, [`resolve`] fetches lightweight node
//! content, [`aggregate`] builds each tree, [`merge`] reconciles pull and
//! push views, [`selection`] remembers the last selected node per tree.
//! [`projector::Projector`] wires them together behind per-tree locks.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums where callers match on the failure,
//!   `anyhow::Result` for file and config plumbing.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod aggregate;
pub mod bounded;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod import;
pub mod ledger;
pub mod lock;
pub mod merge;
pub mod model;
pub mod projector;
pub mod resolve;
pub mod selection;
pub mod stats;

pub use aggregate::{AggregateDelta, TreeBuilder};
pub use event::{Event, EventDigest, EventKey, EventKind, EventPosition};
pub use ledger::{EventLedger, IngestStatus};
pub use merge::merge;
pub use model::{Address, Node, NodeId, Tree, TreeView};
pub use projector::{IngestOutcome, Projector};
pub use resolve::{ContentResolver, Resolution};
pub use selection::SelectionMemory;
