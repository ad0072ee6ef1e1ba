//! Activity statistics per calendar day and per user.
//!
//! Fed only with events the ledger accepted, so redelivery never inflates
//! a count. Days are UTC calendar dates derived from the event's chain
//! timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::event::{Event, EventData};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStats {
    pub trees_created: u64,
    pub nodes_created: u64,
    pub content_updates: u64,
    pub token_events: u64,
}

impl DayStats {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.trees_created + self.nodes_created + self.content_updates + self.token_events
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub trees_created: u64,
    pub nodes_created: u64,
    pub content_updates: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub days: BTreeMap<NaiveDate, DayStats>,
    pub users: BTreeMap<String, UserStats>,
    /// Events whose timestamp could not be mapped to a date.
    pub undated: u64,
}

/// UTC calendar date of a chain timestamp in seconds.
#[must_use]
pub fn day_of(timestamp: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp, 0).map(|t| t.date_naive())
}

impl ActivityStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one accepted event.
    pub fn record(&mut self, event: &Event) {
        match day_of(event.timestamp) {
            Some(day) => {
                let bucket = self.days.entry(day).or_default();
                match &event.data {
                    EventData::TreeCreated(_) => bucket.trees_created += 1,
                    EventData::NodeCreated(_) => bucket.nodes_created += 1,
                    EventData::NodeUpdated(_) | EventData::MetadataSet(_) => {
                        bucket.content_updates += 1;
                    }
                    EventData::NftMinted(_)
                    | EventData::TokenCreated(_)
                    | EventData::TokenBoundAccountCreated(_)
                    | EventData::Transfer(_) => bucket.token_events += 1,
                }
            }
            None => {
                debug!(timestamp = event.timestamp, event = %event.key(), "timestamp out of range; not bucketed");
                self.undated += 1;
            }
        }

        let user = match &event.data {
            EventData::TreeCreated(d) => Some((d.creator.as_str(), Field::Tree)),
            EventData::NodeCreated(d) => Some((d.author.as_str(), Field::Node)),
            EventData::NodeUpdated(d) | EventData::MetadataSet(d) => {
                d.updated_by.as_deref().map(|u| (u, Field::Update))
            }
            _ => None,
        };
        if let Some((user, field)) = user.filter(|(u, _)| !u.is_empty()) {
            let entry = self.users.entry(user.to_ascii_lowercase()).or_default();
            match field {
                Field::Tree => entry.trees_created += 1,
                Field::Node => entry.nodes_created += 1,
                Field::Update => entry.content_updates += 1,
            }
        }
    }

    /// Sum over all days.
    #[must_use]
    pub fn totals(&self) -> DayStats {
        self.days.values().fold(DayStats::default(), |mut acc, d| {
            acc.trees_created += d.trees_created;
            acc.nodes_created += d.nodes_created;
            acc.content_updates += d.content_updates;
            acc.token_events += d.token_events;
            acc
        })
    }
}

enum Field {
    Tree,
    Node,
    Update,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ContentData, EventPosition, NodeCreatedData, TreeCreatedData};
    use crate::model::ids::{Address, NodeId};

    fn event(timestamp: i64, data: EventData) -> Event {
        Event::new(EventPosition::new(1, 0), timestamp, Address::new("0xa"), data)
    }

    fn node_created(timestamp: i64, author: &str) -> Event {
        event(
            timestamp,
            EventData::NodeCreated(NodeCreatedData {
                node_id: NodeId::new("1"),
                parent_id: None,
                author: author.into(),
                content: None,
                model_id: String::new(),
                is_root: None,
                has_nft: false,
            }),
        )
    }

    #[test]
    fn buckets_by_utc_calendar_day() {
        let mut stats = ActivityStats::new();
        // 2024-02-29 23:59:59 and 2024-03-01 00:00:00 UTC.
        stats.record(&node_created(1_709_251_199, "0xA"));
        stats.record(&node_created(1_709_251_200, "0xa"));

        let days: Vec<String> = stats.days.keys().map(ToString::to_string).collect();
        assert_eq!(days, vec!["2024-02-29", "2024-03-01"]);
        assert_eq!(stats.users.get("0xa").map(|u| u.nodes_created), Some(2));
    }

    #[test]
    fn counts_by_kind() {
        let mut stats = ActivityStats::new();
        stats.record(&event(
            0,
            EventData::TreeCreated(TreeCreatedData {
                creator: "0xc".into(),
                root_content: None,
            }),
        ));
        stats.record(&event(
            10,
            EventData::NodeUpdated(ContentData {
                node_id: NodeId::new("1"),
                content: "x".into(),
                updated_by: Some("0xe".into()),
            }),
        ));
        let totals = stats.totals();
        assert_eq!(totals.trees_created, 1);
        assert_eq!(totals.content_updates, 1);
        assert_eq!(totals.total(), 2);
        assert_eq!(stats.users.get("0xe").map(|u| u.content_updates), Some(1));
        assert_eq!(stats.users.get("0xc").map(|u| u.trees_created), Some(1));
    }

    #[test]
    fn out_of_range_timestamp_is_undated() {
        let mut stats = ActivityStats::new();
        stats.record(&node_created(i64::MAX, ""));
        assert!(stats.days.is_empty());
        assert_eq!(stats.undated, 1);
        assert!(stats.users.is_empty());
    }
}
