//! Campaign runner: many seeds, one report.
//!
//! Runs a simulation per seed, collects pass/fail results and names the
//! first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::network::FaultConfig;
use crate::oracle::InvariantViolation;
use crate::scenario::ScenarioConfig;
use crate::{SimulationConfig, SimulationResult, Simulator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    pub observers: usize,
    pub trees: usize,
    pub nodes_per_tree: usize,
    pub updates_per_tree: usize,
    pub events_per_round: usize,
    pub lightweight_percent: u8,
    pub nft_percent: u8,
    pub fault_max_delay: u8,
    pub fault_duplicate_percent: u8,
    pub fault_reorder_percent: u8,
    pub fault_content_failure_percent: u8,
    pub pull_rate_percent: u8,
    pub max_buffered_events: usize,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            observers: sim.observers,
            trees: sim.scenario.trees,
            nodes_per_tree: sim.scenario.nodes_per_tree,
            updates_per_tree: sim.scenario.updates_per_tree,
            events_per_round: sim.events_per_round,
            lightweight_percent: sim.scenario.lightweight_percent,
            nft_percent: sim.scenario.nft_percent,
            fault_max_delay: sim.fault.max_delay_rounds,
            fault_duplicate_percent: sim.fault.duplicate_rate_percent,
            fault_reorder_percent: sim.fault.reorder_rate_percent,
            fault_content_failure_percent: sim.fault.content_failure_percent,
            pull_rate_percent: sim.pull_rate_percent,
            max_buffered_events: sim.max_buffered_events,
        }
    }
}

impl CampaignConfig {
    /// The [`SimulationConfig`] for one seed.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            observers: self.observers,
            events_per_round: self.events_per_round,
            scenario: ScenarioConfig {
                trees: self.trees,
                nodes_per_tree: self.nodes_per_tree,
                updates_per_tree: self.updates_per_tree,
                lightweight_percent: self.lightweight_percent,
                nft_percent: self.nft_percent,
            },
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                duplicate_rate_percent: self.fault_duplicate_percent,
                reorder_rate_percent: self.fault_reorder_percent,
                content_failure_percent: self.fault_content_failure_percent,
            },
            pull_rate_percent: self.pull_rate_percent,
            max_buffered_events: self.max_buffered_events,
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.observers == 0 {
            bail!("observers must be > 0");
        }
        if self.trees == 0 {
            bail!("trees must be > 0");
        }
        if self.events_per_round == 0 {
            bail!("events_per_round must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First failing seed, for replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds in which faults actually changed delivery.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every seed in the config.
///
/// # Errors
///
/// Returns an error if the config is invalid or a simulation fails to run.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };
    for seed in config.seed_range.clone() {
        let result = replay_seed(seed, config)?;
        report.seeds_run += 1;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }
        if result.oracle.passed {
            report.seeds_passed += 1;
        } else {
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: result.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }
    Ok(report)
}

/// Run a single seed with full trace details.
///
/// # Errors
///
/// Returns an error if the config is invalid or the simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    config.validate()?;
    Simulator::new(config.sim_config_for_seed(seed))?.run()
}

/// One-line description of a violation.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    fn short(print: Option<&String>) -> &str {
        print.map_or("<absent>", |p| p.get(..19).unwrap_or(p))
    }

    match v {
        InvariantViolation::Convergence {
            observer_a,
            observer_b,
            tree,
            fingerprint_a,
            fingerprint_b,
        } => format!(
            "Convergence: observers {observer_a} and {observer_b} diverge on {tree} ({} vs {})",
            short(fingerprint_a.as_ref()),
            short(fingerprint_b.as_ref())
        ),
        InvariantViolation::Reference {
            observer,
            tree,
            expected,
            actual,
        } => format!(
            "Reference: observer {observer} differs from chain order on {tree} (expected {}, got {})",
            short(expected.as_ref()),
            short(actual.as_ref())
        ),
        InvariantViolation::Completeness {
            observer,
            tree,
            node_count,
            expected_nodes,
            pending_parent,
            content_pending,
        } => format!(
            "Completeness: observer {observer} on {tree} counts {node_count}/{expected_nodes} nodes, \
             {pending_parent} waiting for a parent, {content_pending} waiting for content"
        ),
        InvariantViolation::Idempotence { observer, tree } => {
            format!("Idempotence: redelivery changed observer {observer}'s view of {tree}")
        }
        InvariantViolation::Merge {
            observer_a,
            observer_b,
            tree,
        } => format!(
            "Merge: views of {tree} from observers {observer_a} and {observer_b} do not merge lawfully"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::Address;

    fn small(seeds: Range<u64>) -> CampaignConfig {
        CampaignConfig {
            seed_range: seeds,
            trees: 2,
            nodes_per_tree: 8,
            updates_per_tree: 4,
            ..CampaignConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_observers_rejected() {
        let config = CampaignConfig {
            observers: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_carries_seed_and_faults() {
        let config = CampaignConfig {
            fault_reorder_percent: 77,
            ..CampaignConfig::default()
        };
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.fault.reorder_rate_percent, 77);
        assert_eq!(sim.scenario.trees, config.trees);
    }

    #[test]
    fn campaign_passes_and_hits_faults() {
        let report = run_campaign(&small(0..20)).expect("campaign runs");
        assert_eq!(report.seeds_run, 20);
        assert!(
            report.all_passed(),
            "first failure at seed {:?}: {:?}",
            report.first_failure,
            report.failures.first()
        );
        assert!(report.interesting_states_reached > 0);
    }

    #[test]
    fn heavy_faults_still_converge() {
        let config = CampaignConfig {
            fault_max_delay: 8,
            fault_duplicate_percent: 40,
            fault_reorder_percent: 80,
            fault_content_failure_percent: 40,
            pull_rate_percent: 50,
            events_per_round: 1,
            ..small(100..110)
        };
        let report = run_campaign(&config).expect("campaign runs");
        assert!(report.all_passed(), "{:?}", report.failures);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = small(0..1);
        let a = replay_seed(7, &config).expect("replay 1");
        let b = replay_seed(7, &config).expect("replay 2");
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.states, b.states);
    }

    #[test]
    fn report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["Convergence: observers 0 and 1 diverge".into()],
            }],
            interesting_states_reached: 5,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn violations_read_well() {
        let v = InvariantViolation::Completeness {
            observer: 1,
            tree: Address::new("0xa"),
            node_count: 3,
            expected_nodes: 4,
            pending_parent: 1,
            content_pending: 0,
        };
        let s = format_violation(&v);
        assert!(s.starts_with("Completeness: observer 1 on 0xa counts 3/4 nodes"));
    }
}
