//! arbor-sim library.
//!
//! Deterministic simulation of several observers projecting the same chain
//! history. Each observer receives the log through its own faulty push
//! channel (delay, duplication, reordering), looks up lightweight content
//! through a flaky resolver and occasionally merges a pull snapshot from a
//! query node that trails the chain. The oracle then checks that every
//! observer converged on the chain-order projection.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for return types.
//! - **Logging**: `tracing` macros (`info!`, `debug!`).

pub mod campaign;
pub mod network;
pub mod observer;
pub mod oracle;
pub mod rng;
pub mod scenario;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use arbor_core::config::ProjectConfig;
use arbor_core::projector::{PullSource, RefreshOutcome};
use arbor_core::{Address, Event, EventPosition, IngestOutcome, Projector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::network::{FaultConfig, PushChannel};
use crate::observer::{FlakyResolver, Observer, ObserverId, ObserverState, QueryNode};
use crate::oracle::{ConvergenceOracle, OracleResult};
use crate::rng::DeterministicRng;
use crate::scenario::{Scenario, ScenarioConfig};

/// Attempts per tree to fetch content that is still missing after the
/// channel has drained.
const CONTENT_RETRIES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub observers: usize,
    /// Chain events mined per round.
    pub events_per_round: usize,
    pub scenario: ScenarioConfig,
    pub fault: FaultConfig,
    /// Chance per observer per round of refreshing a tree from the query
    /// node.
    pub pull_rate_percent: u8,
    pub max_buffered_events: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            observers: 3,
            events_per_round: 4,
            scenario: ScenarioConfig::default(),
            fault: FaultConfig::default(),
            pull_rate_percent: 10,
            max_buffered_events: 4_096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    Mine {
        tree: Address,
        position: EventPosition,
    },
    Deliver {
        observer: ObserverId,
        position: EventPosition,
        accepted: bool,
        buffered: usize,
    },
    Reorder {
        observer: ObserverId,
        count: usize,
    },
    Refresh {
        observer: ObserverId,
        tree: Address,
        merged: bool,
    },
    ContentRetry {
        observer: ObserverId,
        tree: Address,
        resolved: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub trace: Vec<TraceEvent>,
    pub states: Vec<ObserverState>,
    pub reference: ObserverState,
    /// Observer 0 before and after redelivering the whole log.
    pub replayed: (ObserverState, ObserverState),
    pub oracle: OracleResult,
    pub scenario: Scenario,
    /// True once any fault actually altered delivery (buffering, duplicates,
    /// reordering, failed lookups or pull merges).
    pub interesting_state_reached: bool,
}

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    scenario: Scenario,
    reference: Projector,
    query: Arc<QueryNode>,
    observers: Vec<Observer>,
    channels: Vec<PushChannel>,
    trace: Vec<TraceEvent>,
    interesting: bool,
}

impl Simulator {
    /// Build a simulator and generate its scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the config has no observers, no trees or mines
    /// nothing per round.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.observers == 0 {
            bail!("observers must be > 0");
        }
        if config.scenario.trees == 0 {
            bail!("scenario.trees must be > 0");
        }
        if config.events_per_round == 0 {
            bail!("events_per_round must be > 0");
        }

        let mut rng = DeterministicRng::new(config.seed);
        let scenario = scenario::generate(&config.scenario, &mut rng);

        let mut project = ProjectConfig::default();
        project.buffer.max_buffered_events = config.max_buffered_events;
        project.pull.enabled = true;

        let reference =
            Projector::new(project.clone()).with_resolver(Arc::new(scenario.resolver()));
        let query = Arc::new(QueryNode::new());
        let observers = (0..config.observers)
            .map(|id| {
                let resolver = FlakyResolver::new(
                    scenario.resolver(),
                    config.fault.content_failure_percent,
                    config.seed.wrapping_add(u64::try_from(id).unwrap_or(0) + 1),
                );
                let pull: Arc<dyn PullSource> = Arc::<QueryNode>::clone(&query);
                Observer::new(id, project.clone(), Arc::new(resolver), pull)
            })
            .collect();
        let channels = vec![PushChannel::new(config.fault); config.observers];

        Ok(Self {
            config,
            rng,
            scenario,
            reference,
            query,
            observers,
            channels,
            trace: Vec::new(),
            interesting: false,
        })
    }

    /// Run to completion: mine the log round by round, drain every
    /// channel, retry missing content, then check the invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario produced no events.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let events = self.scenario.events.clone();
        if events.is_empty() {
            bail!("scenario produced no events");
        }
        let mut round = 0u64;
        for chunk in events.chunks(self.config.events_per_round) {
            for event in chunk {
                self.mine(event, round);
            }
            self.deliver_round(round, false);
            self.pull_round(round);
            round += 1;
        }
        self.deliver_round(round, true);
        self.retry_content(round);

        let states: Vec<ObserverState> = self.observers.iter().map(Observer::snapshot).collect();
        let reference = ObserverState::capture(usize::MAX, &self.reference);
        let replayed = self.replay_into_first();

        let oracle = ConvergenceOracle::check_all(
            &states,
            &reference,
            &self.scenario.node_counts,
            Some((&replayed.0, &replayed.1)),
        );
        info!(
            seed = self.config.seed,
            rounds = round,
            events = events.len(),
            passed = oracle.passed,
            violations = oracle.violations.len(),
            "simulation complete"
        );

        Ok(SimulationResult {
            trace: std::mem::take(&mut self.trace),
            states,
            reference,
            replayed,
            oracle,
            scenario: self.scenario.clone(),
            interesting_state_reached: self.interesting,
        })
    }

    fn mine(&mut self, event: &Event, round: u64) {
        let tree = event.tree_address.clone();
        self.reference.ingest(event.clone());
        if let Some(view) = self.reference.snapshot(&tree) {
            self.query.publish(view);
        }
        self.trace.push(TraceEvent {
            round,
            kind: TraceEventKind::Mine {
                tree,
                position: event.position(),
            },
        });
        for channel in &mut self.channels {
            if channel.send(event, round, &mut self.rng).duplicated {
                self.interesting = true;
            }
        }
    }

    fn deliver_round(&mut self, round: u64, drain: bool) {
        for (id, channel) in self.channels.iter_mut().enumerate() {
            let outcome = if drain {
                channel.drain(&mut self.rng)
            } else {
                channel.deliver_ready(round, &mut self.rng)
            };
            if outcome.reordered {
                self.interesting = true;
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Reorder {
                        observer: id,
                        count: outcome.delivered.len(),
                    },
                });
            }

            let projector = &self.observers[id].projector;
            for event in outcome.delivered {
                let position = event.position();
                let (accepted, buffered) = match projector.ingest(event) {
                    IngestOutcome::Accepted { delta, .. } => (true, delta.buffered.len()),
                    IngestOutcome::Duplicate => (false, 0),
                };
                if !accepted || buffered > 0 {
                    self.interesting = true;
                }
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Deliver {
                        observer: id,
                        position,
                        accepted,
                        buffered,
                    },
                });
            }
        }
    }

    fn pull_round(&mut self, round: u64) {
        let trees = self.scenario.trees();
        for observer in &self.observers {
            if !self.rng.hit_rate_percent(self.config.pull_rate_percent) {
                continue;
            }
            let Some(tree) = self.rng.pick(&trees).cloned() else {
                continue;
            };
            let merged = observer.projector.refresh(&tree) == RefreshOutcome::Merged;
            if merged {
                self.interesting = true;
            }
            debug!(observer = observer.id, tree = %tree, merged, "pull refresh");
            self.trace.push(TraceEvent {
                round,
                kind: TraceEventKind::Refresh {
                    observer: observer.id,
                    tree,
                    merged,
                },
            });
        }
    }

    fn retry_content(&mut self, round: u64) {
        for observer in &self.observers {
            for tree in observer.projector.trees() {
                for _ in 0..CONTENT_RETRIES {
                    let pending = observer
                        .projector
                        .diagnostics(&tree)
                        .map_or(0, |d| d.content_pending);
                    if pending == 0 {
                        break;
                    }
                    self.interesting = true;
                    let resolved = observer.projector.retry_pending_content(&tree);
                    self.trace.push(TraceEvent {
                        round,
                        kind: TraceEventKind::ContentRetry {
                            observer: observer.id,
                            tree: tree.clone(),
                            resolved,
                        },
                    });
                }
            }
        }
    }

    /// Redeliver the full log to observer 0 and capture it before and after.
    fn replay_into_first(&self) -> (ObserverState, ObserverState) {
        let first = &self.observers[0];
        let before = first.snapshot();
        for event in self.scenario.events.iter().rev() {
            first.projector.ingest(event.clone());
        }
        (before, first.snapshot())
    }
}

/// Fingerprints of every tree for each observer, for reporting.
#[must_use]
pub fn fingerprint_table(states: &[ObserverState]) -> BTreeMap<Address, Vec<String>> {
    let mut table: BTreeMap<Address, Vec<String>> = BTreeMap::new();
    for state in states {
        for (tree, print) in state.fingerprints() {
            table.entry(tree).or_default().push(print);
        }
    }
    table
}
