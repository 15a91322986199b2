//! Batch plan assembly.
//!
//! Objects are classified into staged type groups (foundation, tables,
//! views, procedures, cleanup), the table and view groups are split into
//! balanced batches, and every batch is assigned a sprint and the list of
//! batch ids it depends on. Post-assembly validation re-checks dependency
//! ordering and balance across the finished plan and reports violations
//! as warnings, never errors.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{CircularResolution, PlannerConfig, SprintMapping};
use crate::error::PlanError;
use crate::graph::{DependencyGraph, GraphSummary};
use crate::model::{DatabaseObject, ObjectType};
use crate::partition::{determine_batch_count, partition_balanced};

/// Migration stage a batch belongs to. Stages always execute in this
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeGroup {
    Foundation,
    Table,
    View,
    Procedure,
    Cleanup,
}

impl TypeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Table => "table",
            Self::View => "view",
            Self::Procedure => "procedure",
            Self::Cleanup => "cleanup",
        }
    }
}

/// Stage assignment for an object type. Types outside the canonical set
/// fall through to cleanup with a warning recorded by the caller.
fn classify(object_type: &ObjectType) -> TypeGroup {
    match object_type {
        ObjectType::Schema
        | ObjectType::Security
        | ObjectType::Function
        | ObjectType::User
        | ObjectType::Role => TypeGroup::Foundation,
        ObjectType::Table => TypeGroup::Table,
        ObjectType::View => TypeGroup::View,
        ObjectType::StoredProcedure => TypeGroup::Procedure,
        ObjectType::Statistics
        | ObjectType::ExternalTable
        | ObjectType::ExternalDataSource
        | ObjectType::ExternalFileFormat
        | ObjectType::Index
        | ObjectType::Constraint
        | ObjectType::Trigger
        | ObjectType::Sequence
        | ObjectType::Other(_) => TypeGroup::Cleanup,
    }
}

/// One migration batch: a named, sprint-assigned group of objects plus
/// the ids of batches that must complete first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based position in the plan.
    pub batch_id: u32,
    pub batch_name: String,
    pub sprint_number: u32,
    pub object_type_group: TypeGroup,
    pub objects: Vec<DatabaseObject>,
    /// Batch ids that must be migrated before this one.
    pub dependencies: Vec<u32>,
}

impl Batch {
    pub fn total_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn passed_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_failed()).count()
    }
}

/// The complete migration plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub engagement_name: String,
    pub total_objects: usize,
    pub total_batches: usize,
    pub total_sprints: usize,
    pub batches: Vec<Batch>,
    pub dependency_summary: GraphSummary,
    pub warnings: Vec<String>,
}

/// Assembles batch plans from a classified object inventory and its
/// dependency graph.
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Build the full plan. Fails only on empty input or on cycles when
    /// the configured policy is `error`; everything else degrades to plan
    /// warnings.
    pub fn create_plan(
        &self,
        objects: &[DatabaseObject],
        graph: &DependencyGraph,
        engagement_name: &str,
    ) -> Result<BatchPlan, PlanError> {
        if objects.is_empty() {
            return Err(PlanError::EmptyInput);
        }

        let policy = self.config.dependency.circular_resolution;
        let mut warnings: Vec<String> = Vec::new();

        let cycles = graph.detect_cycles();
        if !cycles.is_empty() {
            if policy == CircularResolution::Error {
                return Err(PlanError::CircularDependency { cycles });
            }
            for cycle in &cycles {
                let msg = format!("Circular dependency detected: {}", cycle.join(" -> "));
                warn!("{msg}");
                warnings.push(msg);
            }
        }

        let outcome = graph.layers(policy)?;
        warnings.extend(outcome.warnings.iter().cloned());
        let mut layer_of: HashMap<String, usize> = HashMap::new();
        for (i, layer) in outcome.layers.iter().enumerate() {
            for key in layer {
                layer_of.insert(key.clone(), i);
            }
        }

        let mut foundation: Vec<DatabaseObject> = Vec::new();
        let mut tables: Vec<DatabaseObject> = Vec::new();
        let mut views: Vec<DatabaseObject> = Vec::new();
        let mut procedures: Vec<DatabaseObject> = Vec::new();
        let mut cleanup: Vec<DatabaseObject> = Vec::new();
        for obj in objects.iter().cloned() {
            if !obj.object_type.is_known() {
                warnings.push(format!(
                    "Object '{}' has unrecognized type '{}'; assigned to cleanup batch.",
                    obj.qualified_name(),
                    obj.object_type
                ));
            }
            match classify(&obj.object_type) {
                TypeGroup::Foundation => foundation.push(obj),
                TypeGroup::Table => tables.push(obj),
                TypeGroup::View => views.push(obj),
                TypeGroup::Procedure => procedures.push(obj),
                TypeGroup::Cleanup => cleanup.push(obj),
            }
        }

        let sprints = &self.config.ordering.sprint_mapping;
        let mut batches: Vec<Batch> = Vec::new();
        let mut next_id: u32 = 1;

        let mut foundation_ids: Vec<u32> = Vec::new();
        if foundation.is_empty() {
            warnings.push(
                "No foundation objects (schemas, security, functions) found.".to_string(),
            );
        } else {
            foundation.sort_by_key(|o| o.lookup_key());
            foundation_ids.push(next_id);
            batches.push(Batch {
                batch_id: next_id,
                batch_name: "Foundation".to_string(),
                sprint_number: sprints.foundation,
                object_type_group: TypeGroup::Foundation,
                objects: foundation,
                dependencies: Vec::new(),
            });
            next_id += 1;
        }

        let table_count = determine_batch_count(
            tables.len(),
            self.config.batching.table_batch_count,
            self.config.batching.min_batch_size,
        );
        let mut table_ids: Vec<u32> = Vec::new();
        for (i, objs) in partition_balanced(
            tables,
            table_count,
            graph,
            &layer_of,
            self.config.batching.balance_tolerance,
        )
        .into_iter()
        .enumerate()
        {
            table_ids.push(next_id);
            batches.push(Batch {
                batch_id: next_id,
                batch_name: format!("Table Batch {}", i + 1),
                sprint_number: SprintMapping::sprint_for(
                    &sprints.table_batches,
                    i,
                    sprints.foundation + 1,
                ),
                object_type_group: TypeGroup::Table,
                objects: objs,
                dependencies: foundation_ids.clone(),
            });
            next_id += 1;
        }

        let view_count = determine_batch_count(
            views.len(),
            self.config.batching.view_batch_count,
            self.config.batching.min_batch_size,
        );
        let mut view_ids: Vec<u32> = Vec::new();
        let view_fallback = sprints.table_batches.last().copied().unwrap_or(1) + 1;
        for (i, objs) in partition_balanced(
            views,
            view_count,
            graph,
            &layer_of,
            self.config.batching.balance_tolerance,
        )
        .into_iter()
        .enumerate()
        {
            view_ids.push(next_id);
            batches.push(Batch {
                batch_id: next_id,
                batch_name: format!("View Batch {}", i + 1),
                sprint_number: SprintMapping::sprint_for(&sprints.view_batches, i, view_fallback),
                object_type_group: TypeGroup::View,
                objects: objs,
                dependencies: foundation_ids.iter().chain(table_ids.iter()).copied().collect(),
            });
            next_id += 1;
        }

        let mut procedure_ids: Vec<u32> = Vec::new();
        if !procedures.is_empty() {
            procedures.sort_by_key(|o| o.lookup_key());
            procedure_ids.push(next_id);
            batches.push(Batch {
                batch_id: next_id,
                batch_name: "Stored Procedures".to_string(),
                sprint_number: sprints.procedures,
                object_type_group: TypeGroup::Procedure,
                objects: procedures,
                dependencies: foundation_ids
                    .iter()
                    .chain(table_ids.iter())
                    .chain(view_ids.iter())
                    .copied()
                    .collect(),
            });
            next_id += 1;
        }

        if !cleanup.is_empty() {
            cleanup.sort_by_key(|o| o.lookup_key());
            batches.push(Batch {
                batch_id: next_id,
                batch_name: "Cleanup & External".to_string(),
                sprint_number: sprints.cleanup,
                object_type_group: TypeGroup::Cleanup,
                objects: cleanup,
                dependencies: foundation_ids
                    .iter()
                    .chain(table_ids.iter())
                    .chain(view_ids.iter())
                    .chain(procedure_ids.iter())
                    .copied()
                    .collect(),
            });
        }

        warnings.extend(validate_batch_dependencies(&batches, graph));
        warnings.extend(validate_balance(
            &batches,
            self.config.batching.balance_tolerance,
        ));

        let total_sprints = batches
            .iter()
            .map(|b| b.sprint_number)
            .collect::<BTreeSet<_>>()
            .len();

        info!(
            batches = batches.len(),
            sprints = total_sprints,
            warnings = warnings.len(),
            "plan assembled"
        );

        Ok(BatchPlan {
            engagement_name: engagement_name.to_string(),
            total_objects: objects.len(),
            total_batches: batches.len(),
            total_sprints,
            batches,
            dependency_summary: graph.summary(),
            warnings,
        })
    }
}

/// Re-check the finished plan against the graph: every edge must point at
/// an equal-or-earlier batch. Violations come back as warnings.
pub fn validate_batch_dependencies(batches: &[Batch], graph: &DependencyGraph) -> Vec<String> {
    let mut batch_of: HashMap<String, (u32, &str)> = HashMap::new();
    for batch in batches {
        for obj in &batch.objects {
            batch_of.insert(obj.lookup_key(), (batch.batch_id, batch.batch_name.as_str()));
        }
    }

    let mut warnings = Vec::new();
    for batch in batches {
        for obj in &batch.objects {
            for dep in graph.direct_dependencies(&obj.lookup_key()) {
                if let Some(&(dep_batch, dep_name)) = batch_of.get(&dep) {
                    if dep_batch > batch.batch_id {
                        warnings.push(format!(
                            "Dependency ordering violation: '{}' (in '{}') depends on '{}' (in later '{}').",
                            obj.qualified_name(),
                            batch.batch_name,
                            graph.display_name(&dep).unwrap_or(dep.as_str()),
                            dep_name
                        ));
                    }
                }
            }
        }
    }
    warnings
}

/// Check batch size spread within each multi-batch type group against the
/// tolerance. Violations come back as warnings.
pub fn validate_balance(batches: &[Batch], balance_tolerance: u32) -> Vec<String> {
    let mut sizes_by_group: HashMap<TypeGroup, Vec<usize>> = HashMap::new();
    for batch in batches {
        sizes_by_group
            .entry(batch.object_type_group)
            .or_default()
            .push(batch.total_objects());
    }

    let mut warnings = Vec::new();
    for group in [TypeGroup::Table, TypeGroup::View] {
        let Some(sizes) = sizes_by_group.get(&group) else {
            continue;
        };
        if sizes.len() < 2 {
            continue;
        }
        let max = *sizes.iter().max().unwrap_or(&0);
        let min = *sizes.iter().min().unwrap_or(&0);
        let avg = sizes.iter().sum::<usize>() as f64 / sizes.len() as f64;
        if avg == 0.0 {
            continue;
        }
        let imbalance = (max - min) as f64 / avg * 100.0;
        if imbalance > balance_tolerance as f64 {
            warnings.push(format!(
                "{} batches are imbalanced: sizes range from {} to {} ({:.0}% spread).",
                group.as_str(),
                min,
                max,
                imbalance
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectStatus;

    fn obj(name: &str, object_type: ObjectType, deps: &[&str]) -> DatabaseObject {
        let mut o = DatabaseObject::new(name, object_type, "dbo", ObjectStatus::Passed);
        o.dependencies = deps.iter().map(|d| d.to_string()).collect();
        o
    }

    fn plan(objects: &[DatabaseObject]) -> BatchPlan {
        let graph = DependencyGraph::build(objects);
        Planner::new(PlannerConfig::default())
            .create_plan(objects, &graph, "test")
            .unwrap()
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&ObjectType::Schema), TypeGroup::Foundation);
        assert_eq!(classify(&ObjectType::Security), TypeGroup::Foundation);
        assert_eq!(classify(&ObjectType::Function), TypeGroup::Foundation);
        assert_eq!(classify(&ObjectType::User), TypeGroup::Foundation);
        assert_eq!(classify(&ObjectType::Table), TypeGroup::Table);
        assert_eq!(classify(&ObjectType::View), TypeGroup::View);
        assert_eq!(classify(&ObjectType::StoredProcedure), TypeGroup::Procedure);
        assert_eq!(classify(&ObjectType::Statistics), TypeGroup::Cleanup);
        assert_eq!(classify(&ObjectType::ExternalTable), TypeGroup::Cleanup);
        assert_eq!(
            classify(&ObjectType::Other("SYNONYM".to_string())),
            TypeGroup::Cleanup
        );
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let graph = DependencyGraph::build(&[]);
        let err = Planner::new(PlannerConfig::default())
            .create_plan(&[], &graph, "test")
            .unwrap_err();
        assert!(matches!(err, PlanError::EmptyInput));
    }

    #[test]
    fn test_stage_order_and_dependencies() {
        let objects = vec![
            obj("dbo", ObjectType::Schema, &[]),
            obj("t1", ObjectType::Table, &[]),
            obj("v1", ObjectType::View, &["t1"]),
            obj("p1", ObjectType::StoredProcedure, &["v1"]),
            obj("stat_t1", ObjectType::Statistics, &[]),
        ];
        let plan = plan(&objects);

        let groups: Vec<TypeGroup> = plan.batches.iter().map(|b| b.object_type_group).collect();
        assert_eq!(
            groups,
            vec![
                TypeGroup::Foundation,
                TypeGroup::Table,
                TypeGroup::View,
                TypeGroup::Procedure,
                TypeGroup::Cleanup,
            ]
        );

        // each batch depends on every earlier stage
        for batch in &plan.batches {
            for dep in &batch.dependencies {
                assert!(*dep < batch.batch_id);
            }
        }
        let cleanup = plan.batches.last().unwrap();
        assert_eq!(cleanup.dependencies, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sprint_numbers_follow_mapping() {
        let objects = vec![
            obj("dbo", ObjectType::Schema, &[]),
            obj("t1", ObjectType::Table, &[]),
            obj("p1", ObjectType::StoredProcedure, &[]),
        ];
        let plan = plan(&objects);
        let sprint_of = |name: &str| {
            plan.batches
                .iter()
                .find(|b| b.batch_name == name)
                .unwrap()
                .sprint_number
        };
        assert_eq!(sprint_of("Foundation"), 1);
        assert_eq!(sprint_of("Table Batch 1"), 2);
        assert_eq!(sprint_of("Stored Procedures"), 8);
        assert_eq!(plan.total_sprints, 3);
    }

    #[test]
    fn test_missing_foundation_warns() {
        let objects = vec![obj("t1", ObjectType::Table, &[])];
        let plan = plan(&objects);
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("No foundation objects")));
        assert_eq!(plan.batches[0].object_type_group, TypeGroup::Table);
    }

    #[test]
    fn test_unknown_type_goes_to_cleanup_with_warning() {
        let objects = vec![
            obj("t1", ObjectType::Table, &[]),
            obj("syn1", ObjectType::Other("SYNONYM".to_string()), &[]),
        ];
        let plan = plan(&objects);
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("unrecognized type 'SYNONYM'")));
        let cleanup = plan
            .batches
            .iter()
            .find(|b| b.object_type_group == TypeGroup::Cleanup)
            .unwrap();
        assert_eq!(cleanup.objects[0].name, "syn1");
    }

    #[test]
    fn test_cycle_error_policy() {
        let objects = vec![
            obj("x", ObjectType::Table, &["y"]),
            obj("y", ObjectType::Table, &["x"]),
        ];
        let graph = DependencyGraph::build(&objects);
        let mut config = PlannerConfig::default();
        config.dependency.circular_resolution = CircularResolution::Error;
        let err = Planner::new(config)
            .create_plan(&objects, &graph, "test")
            .unwrap_err();
        assert!(matches!(err, PlanError::CircularDependency { .. }));
    }

    #[test]
    fn test_cycle_warn_policy_keeps_all_objects() {
        let objects = vec![
            obj("x", ObjectType::Table, &["y"]),
            obj("y", ObjectType::Table, &["x"]),
            obj("a", ObjectType::Table, &[]),
        ];
        let plan = plan(&objects);
        let placed: usize = plan.batches.iter().map(|b| b.total_objects()).sum();
        assert_eq!(placed, 3);
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("Circular dependency detected")));
    }

    #[test]
    fn test_tables_split_into_balanced_batches() {
        let mut objects: Vec<DatabaseObject> = (0..20)
            .map(|i| obj(&format!("t{i:02}"), ObjectType::Table, &[]))
            .collect();
        objects.push(obj("dbo", ObjectType::Schema, &[]));
        let plan = plan(&objects);

        let table_batches: Vec<&Batch> = plan
            .batches
            .iter()
            .filter(|b| b.object_type_group == TypeGroup::Table)
            .collect();
        assert_eq!(table_batches.len(), 4);
        for batch in &table_batches {
            assert_eq!(batch.total_objects(), 5);
        }
        assert!(!plan.warnings.iter().any(|w| w.contains("imbalanced")));
    }

    #[test]
    fn test_validate_batch_dependencies_flags_violation() {
        let t1 = obj("t1", ObjectType::Table, &["t2"]);
        let t2 = obj("t2", ObjectType::Table, &[]);
        let graph = DependencyGraph::build(&[t1.clone(), t2.clone()]);
        // deliberately wrong ordering
        let batches = vec![
            Batch {
                batch_id: 1,
                batch_name: "Table Batch 1".to_string(),
                sprint_number: 2,
                object_type_group: TypeGroup::Table,
                objects: vec![t1],
                dependencies: vec![],
            },
            Batch {
                batch_id: 2,
                batch_name: "Table Batch 2".to_string(),
                sprint_number: 3,
                object_type_group: TypeGroup::Table,
                objects: vec![t2],
                dependencies: vec![],
            },
        ];
        let warnings = validate_batch_dependencies(&batches, &graph);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ordering violation"));
    }

    #[test]
    fn test_batch_counts() {
        let objects = vec![
            obj("dbo", ObjectType::Schema, &[]),
            obj("t1", ObjectType::Table, &[]),
            obj("v1", ObjectType::View, &[]),
        ];
        let plan = plan(&objects);
        assert_eq!(plan.total_objects, 3);
        assert_eq!(plan.total_batches, 3);
        let foundation = &plan.batches[0];
        assert_eq!(foundation.passed_count(), 1);
        assert_eq!(foundation.failed_count(), 0);
    }
}
