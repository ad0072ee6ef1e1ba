//! Event kind enum covering the eight chain event types.
//!
//! The string representation matches the event names emitted by the tree
//! and node-token contracts (`TreeCreated`, `NFTMinted`, ...), which is also
//! the `kind` discriminant in the JSON-lines wire format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The eight event kinds the projector consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// A tree contract was deployed.
    TreeCreated,
    /// A node was added to a tree.
    NodeCreated,
    /// A node's content was rewritten.
    NodeUpdated,
    /// Token metadata (content) was set for a node.
    MetadataSet,
    /// A node was minted as an NFT.
    NftMinted,
    /// A fungible node token contract was created for a node.
    TokenCreated,
    /// A token-bound account was created for a node's NFT.
    TokenBoundAccountCreated,
    /// Tokens moved between accounts.
    Transfer,
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event kind '{}': expected one of TreeCreated, NodeCreated, \
             NodeUpdated, MetadataSet, NFTMinted, TokenCreated, \
             TokenBoundAccountCreated, Transfer",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    /// All known kinds in catalog order.
    pub const ALL: [Self; 8] = [
        Self::TreeCreated,
        Self::NodeCreated,
        Self::NodeUpdated,
        Self::MetadataSet,
        Self::NftMinted,
        Self::TokenCreated,
        Self::TokenBoundAccountCreated,
        Self::Transfer,
    ];

    /// Return the contract event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TreeCreated => "TreeCreated",
            Self::NodeCreated => "NodeCreated",
            Self::NodeUpdated => "NodeUpdated",
            Self::MetadataSet => "MetadataSet",
            Self::NftMinted => "NFTMinted",
            Self::TokenCreated => "TokenCreated",
            Self::TokenBoundAccountCreated => "TokenBoundAccountCreated",
            Self::Transfer => "Transfer",
        }
    }

    /// True for the kinds that only touch token linkage on a node.
    #[must_use]
    pub const fn is_token_side_effect(self) -> bool {
        matches!(
            self,
            Self::NftMinted | Self::TokenCreated | Self::TokenBoundAccountCreated | Self::Transfer
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind { raw: s.to_string() })
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
