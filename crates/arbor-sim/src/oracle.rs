use std::collections::{BTreeMap, BTreeSet};

use arbor_core::{Address, merge};

use crate::observer::{ObserverId, ObserverState};

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Combine two results; failures accumulate.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Two observers hold different views of a tree after full delivery.
    Convergence {
        observer_a: ObserverId,
        observer_b: ObserverId,
        tree: Address,
        fingerprint_a: Option<String>,
        fingerprint_b: Option<String>,
    },

    /// An observer's view differs from the chain-order projection.
    Reference {
        observer: ObserverId,
        tree: Address,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// A tree still has nodes waiting for a parent or for content, or the
    /// node count is off.
    Completeness {
        observer: ObserverId,
        tree: Address,
        node_count: usize,
        expected_nodes: usize,
        pending_parent: usize,
        content_pending: usize,
    },

    /// Redelivering every event changed a view.
    Idempotence {
        observer: ObserverId,
        tree: Address,
    },

    /// Merging two observers' views depends on argument order, or merging
    /// a view with itself changes it.
    Merge {
        observer_a: ObserverId,
        observer_b: ObserverId,
        tree: Address,
    },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks run after a simulation has delivered everything:
///
/// 1. **Convergence**: every observer holds the same view of every tree.
/// 2. **Reference**: that view equals the chain-order projection.
/// 3. **Completeness**: no node waits for a parent or content, and each
///    tree counts exactly its created nodes.
/// 4. **Idempotence**: redelivering the whole log changes nothing.
/// 5. **Merge laws**: merging observers' views is commutative and
///    idempotent.
pub struct ConvergenceOracle;

impl ConvergenceOracle {
    #[must_use]
    pub fn check_convergence(states: &[ObserverState]) -> OracleResult {
        let mut violations = Vec::new();
        let prints: Vec<BTreeMap<Address, String>> =
            states.iter().map(ObserverState::fingerprints).collect();

        for i in 0..states.len() {
            for j in (i + 1)..states.len() {
                let trees: BTreeSet<&Address> = prints[i].keys().chain(prints[j].keys()).collect();
                for tree in trees {
                    let a = prints[i].get(tree);
                    let b = prints[j].get(tree);
                    if a != b {
                        violations.push(InvariantViolation::Convergence {
                            observer_a: states[i].id,
                            observer_b: states[j].id,
                            tree: tree.clone(),
                            fingerprint_a: a.cloned(),
                            fingerprint_b: b.cloned(),
                        });
                    }
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_reference(states: &[ObserverState], reference: &ObserverState) -> OracleResult {
        let expected = reference.fingerprints();
        let mut violations = Vec::new();
        for state in states {
            let actual = state.fingerprints();
            let trees: BTreeSet<&Address> = expected.keys().chain(actual.keys()).collect();
            for tree in trees {
                if expected.get(tree) != actual.get(tree) {
                    violations.push(InvariantViolation::Reference {
                        observer: state.id,
                        tree: tree.clone(),
                        expected: expected.get(tree).cloned(),
                        actual: actual.get(tree).cloned(),
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_completeness(
        states: &[ObserverState],
        expected_nodes: &BTreeMap<Address, usize>,
    ) -> OracleResult {
        let mut violations = Vec::new();
        for state in states {
            for (tree, &expected) in expected_nodes {
                let (node_count, pending_parent, content_pending) =
                    state.views.get(tree).map_or((0, 0, 0), |v| {
                        (
                            v.tree.node_count,
                            v.pending_parent_ids().len(),
                            v.content_pending_ids().len(),
                        )
                    });
                if node_count != expected || pending_parent > 0 || content_pending > 0 {
                    violations.push(InvariantViolation::Completeness {
                        observer: state.id,
                        tree: tree.clone(),
                        node_count,
                        expected_nodes: expected,
                        pending_parent,
                        content_pending,
                    });
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_idempotence(before: &ObserverState, after: &ObserverState) -> OracleResult {
        let a = before.fingerprints();
        let b = after.fingerprints();
        let trees: BTreeSet<&Address> = a.keys().chain(b.keys()).collect();
        let violations = trees
            .into_iter()
            .filter(|tree| a.get(*tree) != b.get(*tree))
            .map(|tree| InvariantViolation::Idempotence {
                observer: after.id,
                tree: tree.clone(),
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_merge_laws(states: &[ObserverState]) -> OracleResult {
        let mut violations = Vec::new();
        for (i, a) in states.iter().enumerate() {
            for b in &states[i..] {
                for (tree, view_a) in &a.views {
                    let Some(view_b) = b.views.get(tree) else {
                        continue;
                    };
                    let ab = merge(view_a, view_b);
                    let lawful = ab == merge(view_b, view_a) && merge(&ab, view_b) == ab;
                    if !lawful {
                        violations.push(InvariantViolation::Merge {
                            observer_a: a.id,
                            observer_b: b.id,
                            tree: tree.clone(),
                        });
                    }
                }
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Every check in one pass.
    #[must_use]
    pub fn check_all(
        states: &[ObserverState],
        reference: &ObserverState,
        expected_nodes: &BTreeMap<Address, usize>,
        replayed: Option<(&ObserverState, &ObserverState)>,
    ) -> OracleResult {
        let mut result = Self::check_convergence(states)
            .merge(Self::check_reference(states, reference))
            .merge(Self::check_completeness(states, expected_nodes))
            .merge(Self::check_merge_laws(states));
        if let Some((before, after)) = replayed {
            result = result.merge(Self::check_idempotence(before, after));
        }
        if result.violations.is_empty() {
            OracleResult::pass()
        } else {
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{Node, NodeId, Tree, TreeView};

    fn view(tree: &str, nodes: &[(&str, Option<&str>)]) -> TreeView {
        let address = Address::new(tree);
        let mut v = TreeView::new(Tree::new(address.clone()));
        for (id, parent) in nodes {
            let mut n = Node::new(address.clone(), NodeId::new(id));
            n.parent = parent.map(NodeId::new);
            n.is_root = parent.is_none();
            n.base_content = format!("c{id}");
            n.refresh_content();
            v.insert(n);
        }
        v
    }

    fn state(id: ObserverId, views: Vec<TreeView>) -> ObserverState {
        ObserverState {
            id,
            views: views.into_iter().map(|v| (v.address().clone(), v)).collect(),
        }
    }

    #[test]
    fn identical_observers_pass_everything() {
        let s0 = state(0, vec![view("0xa", &[("1", None), ("2", Some("1"))])]);
        let s1 = state(1, vec![view("0xa", &[("1", None), ("2", Some("1"))])]);
        let expected = BTreeMap::from([(Address::new("0xa"), 2)]);
        let result =
            ConvergenceOracle::check_all(&[s0.clone(), s1], &s0, &expected, Some((&s0, &s0)));
        assert!(result.passed, "{:?}", result.violations);
    }

    #[test]
    fn divergence_is_reported_per_tree() {
        let s0 = state(0, vec![view("0xa", &[("1", None)])]);
        let s1 = state(1, vec![view("0xa", &[("1", None), ("2", Some("1"))])]);
        let result = ConvergenceOracle::check_convergence(&[s0, s1]);
        assert!(!result.passed);
        assert!(matches!(
            result.violations[0],
            InvariantViolation::Convergence {
                observer_a: 0,
                observer_b: 1,
                ..
            }
        ));
    }

    #[test]
    fn orphan_fails_completeness() {
        let s = state(0, vec![view("0xa", &[("1", None), ("3", Some("2"))])]);
        let expected = BTreeMap::from([(Address::new("0xa"), 2)]);
        let result = ConvergenceOracle::check_completeness(&[s], &expected);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::Completeness {
                observer: 0,
                tree: Address::new("0xa"),
                node_count: 2,
                expected_nodes: 2,
                pending_parent: 1,
                content_pending: 0,
            }]
        );
    }

    #[test]
    fn missing_tree_fails_reference() {
        let reference = state(9, vec![view("0xa", &[("1", None)]), view("0xb", &[("1", None)])]);
        let s = state(0, vec![view("0xa", &[("1", None)])]);
        let result = ConvergenceOracle::check_reference(&[s], &reference);
        assert_eq!(result.violations.len(), 1);
    }
}
