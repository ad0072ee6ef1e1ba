//! Typed payloads for each event kind.
//!
//! The wire format is flat: the `kind` field selects the variant and the
//! remaining camelCase fields fill its payload struct. Ids accept strings or
//! integers; parent ids normalize every no-parent sentinel to `None`.

use serde::{Deserialize, Serialize};

use super::types::EventKind;
use crate::model::ids::{
    NodeId, deserialize_opt_node, deserialize_opt_scalar, deserialize_parent, deserialize_scalar,
};

/// Kind-specific payload of an [`super::Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventData {
    TreeCreated(TreeCreatedData),
    NodeCreated(NodeCreatedData),
    NodeUpdated(ContentData),
    MetadataSet(ContentData),
    #[serde(rename = "NFTMinted")]
    NftMinted(NftMintedData),
    TokenCreated(TokenCreatedData),
    TokenBoundAccountCreated(TokenBoundAccountData),
    Transfer(TransferData),
}

impl EventData {
    /// The discriminant of this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::TreeCreated(_) => EventKind::TreeCreated,
            Self::NodeCreated(_) => EventKind::NodeCreated,
            Self::NodeUpdated(_) => EventKind::NodeUpdated,
            Self::MetadataSet(_) => EventKind::MetadataSet,
            Self::NftMinted(_) => EventKind::NftMinted,
            Self::TokenCreated(_) => EventKind::TokenCreated,
            Self::TokenBoundAccountCreated(_) => EventKind::TokenBoundAccountCreated,
            Self::Transfer(_) => EventKind::Transfer,
        }
    }

    /// The node this payload targets, if it names one directly.
    #[must_use]
    pub const fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::TreeCreated(_) => None,
            Self::NodeCreated(d) => Some(&d.node_id),
            Self::NodeUpdated(d) | Self::MetadataSet(d) => Some(&d.node_id),
            Self::NftMinted(d) => Some(&d.node_id),
            Self::TokenCreated(d) => Some(&d.node_id),
            Self::TokenBoundAccountCreated(d) => Some(&d.node_id),
            Self::Transfer(d) => d.node_id.as_ref(),
        }
    }
}

/// Payload for `TreeCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeCreatedData {
    #[serde(default)]
    pub creator: String,
    /// Root content as announced by the factory, before the root node lands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_content: Option<String>,
}

/// Payload for `NodeCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCreatedData {
    pub node_id: NodeId,
    #[serde(
        default,
        deserialize_with = "deserialize_parent",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub author: String,
    /// Embedded content. Absent for lightweight nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,
    #[serde(default, rename = "hasNFT")]
    pub has_nft: bool,
}

impl NodeCreatedData {
    /// A node is a root when flagged so, or when it names no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.is_root.unwrap_or(false) || self.parent_id.is_none()
    }

    /// True when the event carries no usable content.
    #[must_use]
    pub fn lacks_content(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
    }
}

/// Payload for `NodeUpdated` and `MetadataSet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentData {
    pub node_id: NodeId,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Payload for `NFTMinted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftMintedData {
    pub node_id: NodeId,
    #[serde(deserialize_with = "deserialize_scalar")]
    pub token_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// NFT-backed nodes carry their content in the mint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Payload for `TokenCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCreatedData {
    pub node_id: NodeId,
    pub node_token_contract: String,
}

/// Payload for `TokenBoundAccountCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBoundAccountData {
    pub node_id: NodeId,
    pub token_bound_account: String,
    #[serde(
        default,
        deserialize_with = "deserialize_opt_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_id: Option<String>,
}

/// Payload for `Transfer`.
///
/// A transfer names its node directly or only through the NFT's token id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferData {
    #[serde(
        default,
        deserialize_with = "deserialize_opt_node",
        skip_serializing_if = "Option::is_none"
    )]
    pub node_id: Option<NodeId>,
    #[serde(
        default,
        deserialize_with = "deserialize_opt_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_id: Option<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(
        default,
        deserialize_with = "deserialize_opt_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,
}
