//! Batch Planner Core Library
//!
//! Turns a database migration assessment into a dependency-ordered,
//! sprint-mapped batch plan: parse the inventory, build the dependency
//! graph, triage failures, measure impact, partition into balanced
//! batches, and render the result.

pub mod analysis;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod parse;
pub mod partition;
pub mod plan;
pub mod report;
pub mod triage;

// Re-export commonly used types
pub use analysis::{analyze_failures, apply_impact_scores, compute_impact_scores, FailureAnalysis};
pub use config::{CircularResolution, PlannerConfig};
pub use error::PlanError;
pub use graph::{DependencyGraph, GraphSummary};
pub use model::{DatabaseObject, ObjectStatus, ObjectType};
pub use parse::{parse_assessment_json, ParsedAssessment};
pub use plan::{Batch, BatchPlan, Planner, TypeGroup};
pub use report::PlanReporter;
pub use triage::{FailureTriage, TriageSummary};
