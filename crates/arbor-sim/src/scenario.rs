//! Synthetic on-chain histories.
//!
//! A scenario is the event log a set of tree contracts would have emitted,
//! in chain order, together with the content a node-content lookup would
//! return for every lightweight node.

use std::collections::BTreeMap;

use arbor_core::event::{
    ContentData, EventData, NftMintedData, NodeCreatedData, TokenBoundAccountData, TransferData,
    TreeCreatedData,
};
use arbor_core::resolve::MapResolver;
use arbor_core::{Address, Event, EventPosition, NodeId};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

const BASE_TIMESTAMP: i64 = 1_700_000_000;
const BLOCK_SECONDS: i64 = 12;
const EVENTS_PER_BLOCK: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub trees: usize,
    pub nodes_per_tree: usize,
    pub updates_per_tree: usize,
    /// Share of nodes created without content.
    pub lightweight_percent: u8,
    /// Share of nodes backed by an NFT.
    pub nft_percent: u8,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            trees: 3,
            nodes_per_tree: 12,
            updates_per_tree: 6,
            lightweight_percent: 25,
            nft_percent: 15,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scenario {
    /// Every event, in chain order.
    pub events: Vec<Event>,
    /// Content for lightweight nodes.
    pub contents: BTreeMap<(Address, NodeId), String>,
    /// Expected node count per tree.
    pub node_counts: BTreeMap<Address, usize>,
}

impl Scenario {
    /// A resolver that knows every lightweight node's content.
    #[must_use]
    pub fn resolver(&self) -> MapResolver {
        let mut resolver = MapResolver::new();
        for ((tree, node), content) in &self.contents {
            resolver.insert(tree.clone(), node.clone(), content.clone());
        }
        resolver
    }

    #[must_use]
    pub fn trees(&self) -> Vec<Address> {
        self.node_counts.keys().cloned().collect()
    }
}

/// One tree's history before it is interleaved with the others.
struct TreeScript {
    address: Address,
    steps: Vec<EventData>,
}

/// Generate a scenario. The same config and RNG state always produce the
/// same scenario.
#[must_use]
pub fn generate(config: &ScenarioConfig, rng: &mut DeterministicRng) -> Scenario {
    let mut scenario = Scenario::default();
    let mut scripts: Vec<TreeScript> = (0..config.trees)
        .map(|t| script_tree(t, config, rng, &mut scenario))
        .collect();

    // Interleave the trees, keeping each tree's own order.
    let mut cursors = vec![0usize; scripts.len()];
    let mut index = 0usize;
    loop {
        let live: Vec<usize> = (0..scripts.len())
            .filter(|&t| cursors[t] < scripts[t].steps.len())
            .collect();
        let Some(&t) = rng.pick(&live) else {
            break;
        };
        let data = std::mem::replace(
            &mut scripts[t].steps[cursors[t]],
            EventData::TreeCreated(TreeCreatedData::default()),
        );
        cursors[t] += 1;

        let block = u64::try_from(index / EVENTS_PER_BLOCK).unwrap_or(u64::MAX) + 1;
        let log_index = u32::try_from(index % EVENTS_PER_BLOCK).unwrap_or(0);
        let timestamp = BASE_TIMESTAMP + i64::try_from(block).unwrap_or(0) * BLOCK_SECONDS;
        scenario.events.push(Event::new(
            EventPosition::new(block, log_index),
            timestamp,
            scripts[t].address.clone(),
            data,
        ));
        index += 1;
    }
    scenario
}

fn script_tree(
    t: usize,
    config: &ScenarioConfig,
    rng: &mut DeterministicRng,
    scenario: &mut Scenario,
) -> TreeScript {
    let address = Address::new(&format!("0x{:040x}", t + 1));
    let creator = format!("0xcreator{t}");
    let nodes = config.nodes_per_tree.max(1);
    let mut steps = vec![EventData::TreeCreated(TreeCreatedData {
        creator: creator.clone(),
        root_content: Some(format!("tree {t}")),
    })];
    let mut minted: Vec<(NodeId, String)> = Vec::new();

    for n in 1..=nodes {
        let id = NodeId::from(u64::try_from(n).unwrap_or(u64::MAX));
        let parent = (n > 1)
            .then(|| NodeId::from(u64::try_from(1 + rng.next_index(n - 1)).unwrap_or(1)));
        let has_nft = n > 1 && rng.hit_rate_percent(config.nft_percent);
        let lightweight = !has_nft && rng.hit_rate_percent(config.lightweight_percent);
        let text = if n == 1 {
            format!("tree {t}")
        } else {
            format!("tree {t} node {n}")
        };

        let content = if has_nft || lightweight { None } else { Some(text.clone()) };
        if lightweight {
            scenario.contents.insert((address.clone(), id.clone()), text.clone());
        }
        steps.push(EventData::NodeCreated(NodeCreatedData {
            node_id: id.clone(),
            parent_id: parent,
            author: format!("0xauthor{}", rng.next_index(4)),
            content,
            model_id: "sim-model".into(),
            is_root: Some(n == 1),
            has_nft,
        }));

        if has_nft {
            let token_id = format!("{}", t * 1_000 + n);
            steps.push(EventData::NftMinted(NftMintedData {
                node_id: id.clone(),
                token_id: token_id.clone(),
                owner: Some(creator.clone()),
                content: Some(text),
            }));
            steps.push(EventData::TokenBoundAccountCreated(TokenBoundAccountData {
                node_id: id.clone(),
                token_bound_account: format!("0xtba{t}x{n}"),
                token_id: Some(token_id.clone()),
            }));
            minted.push((id, token_id));
        }
    }

    let node_ids: Vec<u64> = (1..=u64::try_from(nodes).unwrap_or(1)).collect();
    for u in 0..config.updates_per_tree {
        let target = NodeId::from(rng.pick(&node_ids).copied().unwrap_or(1));
        let data = ContentData {
            node_id: target,
            content: format!("tree {t} edit {u}"),
            updated_by: Some(format!("0xeditor{}", rng.next_index(3))),
        };
        steps.push(if rng.hit_rate_percent(20) {
            EventData::MetadataSet(data)
        } else {
            EventData::NodeUpdated(data)
        });

        // Occasionally move an NFT, sometimes only by token id.
        if let Some((node, token)) = rng.pick(&minted).cloned() {
            if rng.hit_rate_percent(30) {
                let by_token = rng.hit_rate_percent(50);
                steps.push(EventData::Transfer(TransferData {
                    node_id: (!by_token).then_some(node),
                    token_id: Some(token),
                    from: creator.clone(),
                    to: format!("0xholder{}", rng.next_index(5)),
                    value: None,
                }));
            }
        }
    }

    scenario.node_counts.insert(address.clone(), nodes);
    TreeScript { address, steps }
}
