//! Normalized identifiers for trees and nodes.
//!
//! Both ids arrive from the chain as hex strings (and occasionally as plain
//! integers from the query layer). They are trimmed and lower-cased on
//! construction so that `0xABC` and `0xabc` name the same thing.
//!
//! # No-parent sentinel
//!
//! The chain encodes "no parent" in several ways: a missing field, `null`,
//! an empty string, a bare `0x`, or the zero bytes32 value. All of them
//! normalize to `None` through [`NodeId::parse_parent`]; a `NodeId` value is
//! never the sentinel.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Address of a tree contract.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Normalize a raw address string.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    /// The normalized string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

/// Identifier of a node within one tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Build a node id, or `None` if `raw` is one of the no-parent sentinels.
    #[must_use]
    pub fn parse_parent(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        if is_nil(&normalized) {
            None
        } else {
            Some(Self(normalized))
        }
    }

    /// Build a node id without sentinel checks.
    ///
    /// Intended for ids that are known to name a real node (the node's own
    /// id in a creation event). Normalization still applies.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw.to_string())
    }
}

fn is_nil(normalized: &str) -> bool {
    let digits = normalized.strip_prefix("0x").unwrap_or(normalized);
    digits.chars().all(|c| c == '0')
}

/// Ids and opaque scalars may arrive as JSON strings or integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Number(u64),
}

impl RawScalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawScalar::deserialize(deserializer)?.into_string();
        Ok(Self::new(&raw))
    }
}

/// Serde helper for optional parent ids; every sentinel becomes `None`.
///
/// # Errors
///
/// Returns a deserialization error if the value is neither null, a string,
/// nor an unsigned integer.
pub fn deserialize_parent<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NodeId>, D::Error> {
    let raw: Option<RawScalar> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|r| NodeId::parse_parent(&r.into_string())))
}

/// Serde helper for optional node ids that are not parent references.
///
/// # Errors
///
/// Returns a deserialization error on non-scalar input.
pub fn deserialize_opt_node<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NodeId>, D::Error> {
    deserialize_parent(deserializer)
}

/// Serde helper for opaque scalar fields (token ids, amounts).
///
/// # Errors
///
/// Returns a deserialization error on non-scalar input.
pub fn deserialize_opt_scalar<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let raw: Option<RawScalar> = Option::deserialize(deserializer)?;
    Ok(raw.map(RawScalar::into_string))
}

/// Serde helper for a required opaque scalar.
///
/// # Errors
///
/// Returns a deserialization error on non-scalar input.
pub fn deserialize_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(RawScalar::deserialize(deserializer)?.into_string())
}
