//! Planner configuration.
//!
//! All options have serde defaults, so a partial YAML file only overrides
//! the sections it names. The pattern and alias tables that drive triage
//! and batching are immutable configuration handed to constructors, never
//! process-wide mutable state.

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::triage::{default_categories, TriageCategory};

/// How to react when the dependency graph contains cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CircularResolution {
    /// Abort planning with a fatal error.
    Error,
    /// Record a warning per cycle; unresolved nodes are dumped into the
    /// final layer.
    #[default]
    Warn,
    /// Remove one edge per detected cycle before retrying the layering
    /// step. Intentional but lossy.
    Break,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub table_batch_count: usize,
    pub view_batch_count: usize,
    /// Allowed spread between the largest and smallest batch in a group,
    /// as a percentage of the ideal average size.
    pub balance_tolerance: u32,
    pub min_batch_size: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            table_batch_count: 4,
            view_batch_count: 2,
            balance_tolerance: 20,
            min_batch_size: 3,
        }
    }
}

/// Stage-to-sprint assignment. Scalar stages get one sprint; the
/// batch-split table and view stages get a list, extrapolated
/// arithmetically when more batches exist than listed sprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SprintMapping {
    pub foundation: u32,
    pub table_batches: Vec<u32>,
    pub view_batches: Vec<u32>,
    pub procedures: u32,
    pub cleanup: u32,
}

impl Default for SprintMapping {
    fn default() -> Self {
        Self {
            foundation: 1,
            table_batches: vec![2, 3, 4, 5],
            view_batches: vec![6, 7],
            procedures: 8,
            cleanup: 9,
        }
    }
}

impl SprintMapping {
    /// Sprint number for the `idx`-th batch of a list-mapped stage.
    pub fn sprint_for(list: &[u32], idx: usize, fallback: u32) -> u32 {
        if let Some(sprint) = list.get(idx) {
            *sprint
        } else if let Some(last) = list.last() {
            last + (idx - list.len() + 1) as u32
        } else {
            fallback + idx as u32
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrderingConfig {
    pub sprint_mapping: SprintMapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    pub circular_resolution: CircularResolution,
    /// Bounds ancestor/descendant breadth-first traversal.
    pub max_depth: usize,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            circular_resolution: CircularResolution::Warn,
            max_depth: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub categories: Vec<TriageCategory>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
        }
    }
}

/// Top-level configuration, typically loaded from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlannerConfig {
    pub batching: BatchingConfig,
    pub ordering: OrderingConfig,
    pub dependency: DependencyConfig,
    pub triage: TriageConfig,
}

impl PlannerConfig {
    /// Parse configuration from YAML text. Unnamed sections keep their
    /// defaults.
    pub fn from_yaml(text: &str) -> Result<Self, PlanError> {
        serde_yaml::from_str(text).map_err(|e| PlanError::InvalidConfig(e.to_string()))
    }
}
