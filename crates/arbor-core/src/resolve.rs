//! Content resolver: fetches content for lightweight nodes.
//!
//! Lightweight nodes are created without their content; it lives in the
//! tree contract and has to be looked up. The lookup is an injected
//! [`ContentResolver`] so the projector can run without a chain connection.
//!
//! [`BoundedResolver::resolve`] never fails. Any error, timeout or panic in
//! the collaborator becomes [`Resolution::Unavailable`]; the caller keeps
//! the node's content empty and marks it pending. There is no retry timer:
//! the next event touching the node triggers another lookup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use crate::bounded::call_with_timeout;
use crate::error::ErrorCode;
use crate::model::ids::{Address, NodeId};

/// Source-of-truth content lookup, `getNodeContent(tree, node)`.
pub trait ContentResolver: Send + Sync {
    /// Fetch the content of one node.
    ///
    /// # Errors
    ///
    /// Any failure: transport error, revert, unknown node.
    fn get_node_content(&self, tree: &Address, node: &NodeId) -> anyhow::Result<String>;
}

/// Result of a bounded lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Content(String),
    Unavailable(String),
}

/// Wraps a resolver with a bounded wait.
#[derive(Clone)]
pub struct BoundedResolver {
    inner: Arc<dyn ContentResolver>,
    timeout: Duration,
}

impl std::fmt::Debug for BoundedResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BoundedResolver {
    #[must_use]
    pub fn new(inner: Arc<dyn ContentResolver>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Look up content, waiting at most the configured timeout.
    #[must_use]
    pub fn resolve(&self, tree: &Address, node: &NodeId) -> Resolution {
        let inner = Arc::clone(&self.inner);
        let (t, n) = (tree.clone(), node.clone());
        match call_with_timeout(self.timeout, move || inner.get_node_content(&t, &n)) {
            Ok(Ok(content)) => Resolution::Content(content),
            Ok(Err(e)) => unavailable(tree, node, &format!("{e:#}")),
            Err(e) => unavailable(tree, node, &e.to_string()),
        }
    }
}

fn unavailable(tree: &Address, node: &NodeId, reason: &str) -> Resolution {
    warn!(
        code = %ErrorCode::ContentUnavailable,
        tree = %tree,
        node = %node,
        reason,
        "content lookup failed; node left pending"
    );
    Resolution::Unavailable(reason.to_string())
}

/// In-memory resolver backed by a `tree -> node -> content` map.
///
/// Used by the CLI (`--content-map`) and the simulator.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    entries: HashMap<(Address, NodeId), String>,
}

impl MapResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tree: Address, node: NodeId, content: impl Into<String>) {
        self.entries.insert((tree, node), content.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a JSON file of the form `{"<tree>": {"<node>": "<content>"}}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or not of that shape.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed: HashMap<String, HashMap<String, String>> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let mut resolver = Self::new();
        for (tree, nodes) in parsed {
            let tree = Address::new(&tree);
            for (node, content) in nodes {
                resolver.insert(tree.clone(), NodeId::new(&node), content);
            }
        }
        Ok(resolver)
    }
}

impl ContentResolver for MapResolver {
    fn get_node_content(&self, tree: &Address, node: &NodeId) -> anyhow::Result<String> {
        self.entries
            .get(&(tree.clone(), node.clone()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("node {node} not found in tree {tree}"))
    }
}
