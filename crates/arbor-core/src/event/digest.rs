//! Notification-worthy summaries of accepted events.
//!
//! Display layers consume these; formatting beyond the one-line summary is
//! their business.

use serde::Serialize;

use super::{Event, EventData, EventKind, EventPosition};
use crate::model::ids::Address;

const PREVIEW_CHARS: usize = 40;

/// Kind plus a human-readable one-line digest of an accepted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDigest {
    pub kind: EventKind,
    pub tree: Address,
    pub position: EventPosition,
    pub summary: String,
}

impl EventDigest {
    #[must_use]
    pub fn of(event: &Event) -> Self {
        let summary = match &event.data {
            EventData::TreeCreated(d) => match d.root_content.as_deref() {
                Some(root) if !root.is_empty() => {
                    format!("tree created by {}: {}", or_unknown(&d.creator), preview(root))
                }
                _ => format!("tree created by {}", or_unknown(&d.creator)),
            },
            EventData::NodeCreated(d) => {
                let place = d
                    .parent_id
                    .as_ref()
                    .map_or_else(|| "as root".to_string(), |p| format!("under {p}"));
                match d.content.as_deref() {
                    Some(content) if !content.is_empty() => {
                        format!("node {} created {place}: {}", d.node_id, preview(content))
                    }
                    _ => format!("node {} created {place}", d.node_id),
                }
            }
            EventData::NodeUpdated(d) => {
                format!("node {} updated: {}", d.node_id, preview(&d.content))
            }
            EventData::MetadataSet(d) => {
                format!("node {} metadata set: {}", d.node_id, preview(&d.content))
            }
            EventData::NftMinted(d) => format!("node {} minted as token {}", d.node_id, d.token_id),
            EventData::TokenCreated(d) => {
                format!("node {} token contract {}", d.node_id, d.node_token_contract)
            }
            EventData::TokenBoundAccountCreated(d) => {
                format!("node {} bound account {}", d.node_id, d.token_bound_account)
            }
            EventData::Transfer(d) => {
                let target = d
                    .node_id
                    .as_ref()
                    .map(ToString::to_string)
                    .or_else(|| d.token_id.as_ref().map(|t| format!("token {t}")))
                    .unwrap_or_else(|| "unknown token".to_string());
                match d.value.as_deref() {
                    Some(value) => format!("{target} transfer {} -> {} ({value})", d.from, d.to),
                    None => format!("{target} transfer {} -> {}", d.from, d.to),
                }
            }
        };

        Self {
            kind: event.kind(),
            tree: event.tree_address.clone(),
            position: event.position(),
            summary,
        }
    }
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() { "unknown" } else { s }
}

/// Truncate on a char boundary, marking the cut with `...`.
fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ContentData, NodeCreatedData, TransferData};
    use crate::model::ids::NodeId;

    fn event(data: EventData) -> Event {
        Event::new(EventPosition::new(1, 0), 0, Address::new("0xa"), data)
    }

    #[test]
    fn long_content_is_previewed() {
        let content = "é".repeat(60);
        let digest = event(EventData::NodeUpdated(ContentData {
            node_id: NodeId::new("0x1"),
            content,
            updated_by: None,
        }))
        .digest();
        assert!(digest.summary.ends_with("..."));
        assert_eq!(digest.summary.matches('é').count(), PREVIEW_CHARS);
    }

    #[test]
    fn root_creation_reads_as_root() {
        let digest = event(EventData::NodeCreated(NodeCreatedData {
            node_id: NodeId::new("0x1"),
            parent_id: None,
            author: String::new(),
            content: Some("hello".into()),
            model_id: String::new(),
            is_root: Some(true),
            has_nft: false,
        }))
        .digest();
        assert_eq!(digest.summary, "node 0x1 created as root: hello");
        assert_eq!(digest.kind, EventKind::NodeCreated);
    }

    #[test]
    fn transfer_by_token() {
        let digest = event(EventData::Transfer(TransferData {
            node_id: None,
            token_id: Some("7".into()),
            from: "0xa".into(),
            to: "0xb".into(),
            value: None,
        }))
        .digest();
        assert_eq!(digest.summary, "token 7 transfer 0xa -> 0xb");
    }
}
