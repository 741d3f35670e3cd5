//! Configuration management for Kairos
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (`KAIROS_*` prefix, `__` between keys)
//! 2. kairos.local.toml (local overrides, not checked in)
//! 3. kairos.toml (project config)
//! 4. ~/.config/kairos/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! The merged [`KairosConfig`] is turned into a validated
//! [`SchedulerConfig`] with [`KairosConfig::into_scheduler_config`].

use std::path::Path;

use anyhow::Result;
use kairos_sched::{
    ImpactMatrix, LookaheadBoundary, PerturbationConfig, SchedulerConfig, StrategySet,
};
use kairos_types::NodeId;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Kairos configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KairosConfig {
    pub scheduler: SchedulerSection,
    pub topology: TopologySection,
    pub exploration: ExplorationSection,
}

/// `[scheduler]`: strategy toggles and lookahead boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub path_reduction: bool,
    pub remove_cancelled: bool,
    pub waiting_list: bool,
    pub local_lists: bool,
    pub local_lists_v2: bool,
    pub lookahead_boundary: LookaheadBoundary,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let strategies = StrategySet::default();
        Self {
            path_reduction: strategies.path_reduction,
            remove_cancelled: strategies.remove_cancelled,
            waiting_list: strategies.waiting_list,
            local_lists: strategies.local_lists,
            local_lists_v2: strategies.local_lists_v2,
            lookahead_boundary: LookaheadBoundary::default(),
        }
    }
}

impl SchedulerSection {
    pub fn strategies(&self) -> StrategySet {
        StrategySet {
            path_reduction: self.path_reduction,
            remove_cancelled: self.remove_cancelled,
            waiting_list: self.waiting_list,
            local_lists: self.local_lists,
            local_lists_v2: self.local_lists_v2,
        }
    }
}

/// `[topology]`: entities and the delays between them.
///
/// Latency comes from explicit `latency` rows, else from `links` by
/// shortest path, else `default_latency` between every pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologySection {
    pub entities: usize,
    pub default_latency: u64,
    pub latency: Vec<Vec<u64>>,
    pub links: Vec<LinkConfig>,
    /// Neighbor indices per entity, for the inbound-credit rule.
    pub interfaces: Vec<Vec<u32>>,
}

impl Default for TopologySection {
    fn default() -> Self {
        Self {
            entities: 2,
            default_latency: 0,
            latency: Vec::new(),
            links: Vec::new(),
            interfaces: Vec::new(),
        }
    }
}

/// Bidirectional point-to-point link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: u32,
    pub b: u32,
    pub delay: u64,
}

impl TopologySection {
    fn impact_latency(&self) -> Result<ImpactMatrix, ConfigError> {
        if !self.latency.is_empty() && !self.links.is_empty() {
            return Err(ConfigError::ValidationError(
                "topology sets both `latency` and `links`".to_string(),
            ));
        }
        if !self.latency.is_empty() {
            return Ok(ImpactMatrix::from_rows(self.latency.clone())?);
        }
        if self.links.is_empty() {
            return Ok(ImpactMatrix::uniform(self.entities, self.default_latency));
        }

        let mut links = Vec::with_capacity(self.links.len());
        for link in &self.links {
            if link.a as usize >= self.entities || link.b as usize >= self.entities {
                return Err(ConfigError::ValidationError(format!(
                    "link {}-{} references an entity outside 0..{}",
                    link.a, link.b, self.entities
                )));
            }
            links.push((NodeId::new(link.a), NodeId::new(link.b), link.delay));
        }
        Ok(ImpactMatrix::from_links(self.entities, &links))
    }
}

/// `[exploration]`: timestamp perturbation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationSection {
    pub enabled: bool,
    pub max_bound: u64,
    pub max_perturbed_events: u32,
    pub first_perturbed: u32,
    pub min_packet_size: u32,
    pub trace_queue: bool,
}

impl Default for ExplorationSection {
    fn default() -> Self {
        let defaults = PerturbationConfig::default();
        Self {
            enabled: defaults.enabled,
            max_bound: defaults.max_bound,
            max_perturbed_events: defaults.max_perturbed_events,
            first_perturbed: defaults.first_perturbed,
            min_packet_size: defaults.min_packet_size,
            trace_queue: defaults.trace_queue,
        }
    }
}

impl From<&ExplorationSection> for PerturbationConfig {
    fn from(section: &ExplorationSection) -> Self {
        PerturbationConfig {
            enabled: section.enabled,
            max_bound: section.max_bound,
            max_perturbed_events: section.max_perturbed_events,
            first_perturbed: section.first_perturbed,
            min_packet_size: section.min_packet_size,
            trace_queue: section.trace_queue,
        }
    }
}

impl KairosConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file, without merging other sources.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds and validates the queue engine configuration.
    pub fn into_scheduler_config(self) -> Result<SchedulerConfig, ConfigError> {
        let topology = &self.topology;
        let interfaces = topology
            .interfaces
            .iter()
            .map(|row| row.iter().copied().map(NodeId::new).collect())
            .collect();

        let config = SchedulerConfig::new(topology.entities)
            .with_impact_latency(topology.impact_latency()?)
            .with_interfaces(interfaces)
            .with_strategies(self.scheduler.strategies())
            .with_lookahead_boundary(self.scheduler.lookahead_boundary)
            .with_exploration(PerturbationConfig::from(&self.exploration));
        config.validate()?;
        Ok(config)
    }
}
