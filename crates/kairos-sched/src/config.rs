//! Scheduler configuration.
//!
//! A single [`SchedulerConfig`] is built once (by hand or by the
//! configuration loader) and handed by reference to the queue engine and the
//! simulation driver. There is no ambient global configuration.

use kairos_types::NodeId;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::SchedError;
use crate::latency::ImpactMatrix;

/// Which queue-engine strategies are active.
///
/// Every combination is valid except `local_lists_v2` without
/// `local_lists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrategySet {
    /// Two-branch comparator plus tail fast path on insertion.
    pub path_reduction: bool,
    /// Physically remove cancelled events instead of only marking them.
    pub remove_cancelled: bool,
    /// Timeout events defer insertions behind them (barrier deferral).
    pub waiting_list: bool,
    /// One queue per entity with lookahead-based selection.
    pub local_lists: bool,
    /// Inbound-credit rule for outgoing events on top of local lists.
    pub local_lists_v2: bool,
}

impl StrategySet {
    /// Plain sorted list, cancelled events removed eagerly.
    pub fn plain() -> Self {
        Self {
            path_reduction: false,
            remove_cancelled: true,
            waiting_list: false,
            local_lists: false,
            local_lists_v2: false,
        }
    }

    /// Every strategy enabled.
    pub fn all() -> Self {
        Self {
            path_reduction: true,
            remove_cancelled: true,
            waiting_list: true,
            local_lists: true,
            local_lists_v2: true,
        }
    }

    /// Enumerates the sixteen combinations of the four toggles: path
    /// reduction, cancelled-event removal, waiting list and local lists.
    ///
    /// The v2 credit rule is a refinement of local lists; use
    /// [`StrategySet::with_local_lists_v2`] to derive it from a combination.
    pub fn combinations() -> impl Iterator<Item = StrategySet> {
        (0u8..16).map(|bits| StrategySet {
            path_reduction: bits & 0b0001 != 0,
            remove_cancelled: bits & 0b0010 != 0,
            waiting_list: bits & 0b0100 != 0,
            local_lists: bits & 0b1000 != 0,
            local_lists_v2: false,
        })
    }

    /// Returns the same set with local lists and the v2 credit rule on.
    pub fn with_local_lists_v2(mut self) -> Self {
        self.local_lists = true;
        self.local_lists_v2 = true;
        self
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::plain()
    }
}

/// Comparison used at the lookahead boundary when deciding whether an
/// entity's front event is safe relative to another entity's front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LookaheadBoundary {
    /// `(t_i, uid_i) < (t_j + L, uid_j)`: equal boundary timestamps fall
    /// back to uid order, exactly like the global comparator.
    #[default]
    Sequenced,
    /// `t_i <= t_j + L` for `L > 0`; uid order when `L == 0`.
    Inclusive,
}

/// Knobs for timestamp perturbation by an exploration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerturbationConfig {
    /// Whether inserts consult the exploration hook at all.
    pub enabled: bool,
    /// Largest symbolic delay a branch may take.
    pub max_bound: u64,
    /// How many transmit events may be perturbed per branch.
    pub max_perturbed_events: u32,
    /// 1-based index of the first eligible transmit event to perturb.
    pub first_perturbed: u32,
    /// Transmit events at or below this size are never perturbed.
    pub min_packet_size: u32,
    /// Emit the queue contents to the exploration trace after each insert.
    pub trace_queue: bool,
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_bound: 1200,
            max_perturbed_events: 1,
            first_perturbed: 1,
            min_packet_size: 58,
            trace_queue: false,
        }
    }
}

impl PerturbationConfig {
    /// Enables perturbation with the given bound.
    pub fn bounded(max_bound: u64) -> Self {
        Self {
            enabled: true,
            max_bound,
            ..Self::default()
        }
    }
}

/// Complete configuration of the queue engine and driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of simulated entities; contexts `0..entities` are valid.
    pub entities: usize,
    /// Pairwise impact latencies between entities.
    pub impact_latency: ImpactMatrix,
    /// Per-entity neighbors used by the inbound-credit rule.
    pub interfaces: Vec<Vec<NodeId>>,
    /// Active strategies.
    pub strategies: StrategySet,
    /// Boundary comparison for lookahead safety.
    pub lookahead_boundary: LookaheadBoundary,
    /// Exploration settings.
    pub exploration: PerturbationConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

impl SchedulerConfig {
    /// Creates a configuration for `entities` entities with zero latency
    /// between them and only the plain strategy enabled.
    pub fn new(entities: usize) -> Self {
        Self {
            entities,
            impact_latency: ImpactMatrix::uniform(entities, 0),
            interfaces: Vec::new(),
            strategies: StrategySet::plain(),
            lookahead_boundary: LookaheadBoundary::default(),
            exploration: PerturbationConfig::default(),
        }
    }

    /// Sets the active strategies.
    pub fn with_strategies(mut self, strategies: StrategySet) -> Self {
        self.strategies = strategies;
        self
    }

    /// Sets the impact latency matrix.
    pub fn with_impact_latency(mut self, matrix: ImpactMatrix) -> Self {
        self.impact_latency = matrix;
        self
    }

    /// Sets per-entity interfaces for the inbound-credit rule.
    pub fn with_interfaces(mut self, interfaces: Vec<Vec<NodeId>>) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Sets the lookahead boundary comparison.
    pub fn with_lookahead_boundary(mut self, boundary: LookaheadBoundary) -> Self {
        self.lookahead_boundary = boundary;
        self
    }

    /// Sets the exploration settings.
    pub fn with_exploration(mut self, exploration: PerturbationConfig) -> Self {
        self.exploration = exploration;
        self
    }

    /// Checks the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), SchedError> {
        if self.impact_latency.size() != self.entities {
            return Err(SchedError::InvalidConfig(format!(
                "impact latency matrix covers {} entities, expected {}",
                self.impact_latency.size(),
                self.entities
            )));
        }

        if let Some(node) =
            (0..self.entities).find(|&i| self.impact_latency.get(i, i) != 0)
        {
            return Err(SchedError::InvalidConfig(format!(
                "impact latency from entity {node} to itself is {}, expected 0",
                self.impact_latency.get(node, node)
            )));
        }

        if !self.impact_latency.is_triangle_consistent() {
            warn!(
                entities = self.entities,
                "impact latency matrix violates the triangle inequality"
            );
        }

        if self.interfaces.len() > self.entities {
            return Err(SchedError::InvalidConfig(format!(
                "interfaces listed for {} entities, only {} exist",
                self.interfaces.len(),
                self.entities
            )));
        }

        for (node, neighbors) in self.interfaces.iter().enumerate() {
            if let Some(bad) = neighbors.iter().find(|n| n.index() >= self.entities) {
                return Err(SchedError::InvalidConfig(format!(
                    "entity {node} has an interface to unknown entity {bad}"
                )));
            }
        }

        if self.strategies.local_lists_v2 && !self.strategies.local_lists {
            return Err(SchedError::InvalidConfig(
                "local_lists_v2 requires local_lists".to_string(),
            ));
        }

        if self.exploration.first_perturbed == 0 {
            return Err(SchedError::InvalidConfig(
                "first_perturbed is 1-based and must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SchedulerConfig::default().validate().expect("default config");
    }

    #[test]
    fn sixteen_distinct_combinations() {
        let combos: std::collections::HashSet<_> = StrategySet::combinations().collect();
        assert_eq!(combos.len(), 16);
        assert!(combos.iter().all(|s| !s.local_lists_v2));

        let v2 = StrategySet::plain().with_local_lists_v2();
        assert!(v2.local_lists && v2.local_lists_v2);
    }

    #[test]
    fn matrix_size_must_match_entities() {
        let config = SchedulerConfig::new(3).with_impact_latency(ImpactMatrix::uniform(2, 1));
        assert!(matches!(
            config.validate(),
            Err(SchedError::InvalidConfig(_))
        ));
    }

    #[test]
    fn matrix_diagonal_must_be_zero() {
        let mut matrix = ImpactMatrix::uniform(2, 5);
        matrix.set(1, 1, 3);
        let config = SchedulerConfig::new(2).with_impact_latency(matrix);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("entity 1 to itself"));
    }

    #[test]
    fn triangle_violation_is_tolerated() {
        let mut matrix = ImpactMatrix::uniform(3, 5);
        matrix.set(0, 2, 20);
        assert!(!matrix.is_triangle_consistent());
        let config = SchedulerConfig::new(3).with_impact_latency(matrix);
        config.validate().expect("only logged");
    }

    #[test]
    fn v2_requires_local_lists() {
        let strategies = StrategySet {
            local_lists_v2: true,
            local_lists: false,
            ..StrategySet::plain()
        };
        let config = SchedulerConfig::new(2).with_strategies(strategies);
        assert!(config.validate().is_err());
    }

    #[test]
    fn interfaces_must_reference_known_entities() {
        let config = SchedulerConfig::new(2).with_interfaces(vec![vec![NodeId::new(5)]]);
        assert!(config.validate().is_err());
    }
}
