//! Failure impact analysis over the dependency graph.
//!
//! Impact of a failed object is the number of objects that transitively
//! depend on it, bounded by the configured traversal depth. Failures are
//! split into primary failures (nothing they depend on failed) and
//! dependent failures (at least one failed ancestor) so remediation work
//! targets root causes first.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::graph::DependencyGraph;
use crate::model::DatabaseObject;

/// A failed object with its computed blast radius.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureImpact {
    pub qualified_name: String,
    pub impact_score: usize,
    pub failure_reason: String,
}

/// Failed objects grouped by whether the failure originated there or
/// cascaded from an upstream failure. The two lists partition the failed
/// set: every failed object appears in exactly one.
#[derive(Debug, Clone, Default)]
pub struct FailureAnalysis {
    pub primary_failures: Vec<FailureImpact>,
    pub dependent_failures: Vec<FailureImpact>,
}

impl FailureAnalysis {
    pub fn total_failures(&self) -> usize {
        self.primary_failures.len() + self.dependent_failures.len()
    }

    /// Highest-impact failures across both groups, capped at `limit`.
    pub fn most_impactful(&self, limit: usize) -> Vec<FailureImpact> {
        let mut all: Vec<FailureImpact> = self
            .primary_failures
            .iter()
            .chain(self.dependent_failures.iter())
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            b.impact_score
                .cmp(&a.impact_score)
                .then_with(|| a.qualified_name.cmp(&b.qualified_name))
        });
        all.truncate(limit);
        all
    }
}

/// Compute impact scores for failed objects: the count of depth-bounded
/// transitive dependents. Non-failed objects score zero and are omitted.
/// Keys are lookup keys.
pub fn compute_impact_scores(
    objects: &[DatabaseObject],
    graph: &DependencyGraph,
    max_depth: usize,
) -> HashMap<String, usize> {
    let mut scores = HashMap::new();
    for obj in objects {
        if !obj.is_failed() {
            continue;
        }
        let key = obj.lookup_key();
        let score = graph.descendants(&key, max_depth).len();
        debug!(object = %obj.qualified_name(), score, "impact computed");
        scores.insert(key, score);
    }
    scores
}

/// Write computed impact scores back onto the object list. Objects without
/// a computed score keep their existing value.
pub fn apply_impact_scores(objects: &mut [DatabaseObject], scores: &HashMap<String, usize>) {
    for obj in objects.iter_mut() {
        if let Some(&score) = scores.get(&obj.lookup_key()) {
            obj.impact_score = score;
        }
    }
}

/// Classify every failed object as primary or dependent. Both lists come
/// back sorted by impact descending, then name, for stable report output.
pub fn analyze_failures(
    objects: &[DatabaseObject],
    graph: &DependencyGraph,
    max_depth: usize,
) -> FailureAnalysis {
    let mut analysis = FailureAnalysis::default();

    for obj in objects {
        if !obj.is_failed() {
            continue;
        }
        let key = obj.lookup_key();
        let has_failed_ancestor = graph
            .ancestors(&key, max_depth)
            .iter()
            .any(|ancestor| {
                graph
                    .node_status(ancestor)
                    .is_some_and(|status| status == crate::model::ObjectStatus::Failed)
            });

        let impact = FailureImpact {
            qualified_name: obj.qualified_name(),
            impact_score: obj.impact_score,
            failure_reason: obj.failure_reason.clone(),
        };
        if has_failed_ancestor {
            analysis.dependent_failures.push(impact);
        } else {
            analysis.primary_failures.push(impact);
        }
    }

    let by_impact = |a: &FailureImpact, b: &FailureImpact| {
        b.impact_score
            .cmp(&a.impact_score)
            .then_with(|| a.qualified_name.cmp(&b.qualified_name))
    };
    analysis.primary_failures.sort_by(by_impact);
    analysis.dependent_failures.sort_by(by_impact);

    info!(
        primary = analysis.primary_failures.len(),
        dependent = analysis.dependent_failures.len(),
        "failure analysis complete"
    );
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectStatus, ObjectType};

    fn obj(name: &str, status: ObjectStatus, deps: &[&str]) -> DatabaseObject {
        let mut o = DatabaseObject::new(name, ObjectType::Table, "dbo", status);
        o.dependencies = deps.iter().map(|d| d.to_string()).collect();
        o
    }

    #[test]
    fn test_impact_counts_transitive_dependents() {
        // b and c depend on a; d depends on b
        let objects = vec![
            obj("a", ObjectStatus::Failed, &[]),
            obj("b", ObjectStatus::Passed, &["a"]),
            obj("c", ObjectStatus::Passed, &["a"]),
            obj("d", ObjectStatus::Passed, &["b"]),
        ];
        let graph = DependencyGraph::build(&objects);
        let scores = compute_impact_scores(&objects, &graph, 10);
        assert_eq!(scores["dbo.a"], 3);
        assert!(!scores.contains_key("dbo.b"));
    }

    #[test]
    fn test_impact_respects_depth_bound() {
        let objects = vec![
            obj("a", ObjectStatus::Failed, &[]),
            obj("b", ObjectStatus::Passed, &["a"]),
            obj("c", ObjectStatus::Passed, &["b"]),
            obj("d", ObjectStatus::Passed, &["c"]),
        ];
        let graph = DependencyGraph::build(&objects);
        let scores = compute_impact_scores(&objects, &graph, 2);
        assert_eq!(scores["dbo.a"], 2);
    }

    #[test]
    fn test_apply_scores_writes_back() {
        let mut objects = vec![obj("a", ObjectStatus::Failed, &[])];
        let mut scores = HashMap::new();
        scores.insert("dbo.a".to_string(), 7);
        apply_impact_scores(&mut objects, &scores);
        assert_eq!(objects[0].impact_score, 7);
    }

    #[test]
    fn test_primary_vs_dependent_split() {
        // a fails on its own; b depends on a and also fails; c fails
        // independently of both
        let objects = vec![
            obj("a", ObjectStatus::Failed, &[]),
            obj("b", ObjectStatus::Failed, &["a"]),
            obj("c", ObjectStatus::Failed, &[]),
            obj("d", ObjectStatus::Passed, &["c"]),
        ];
        let graph = DependencyGraph::build(&objects);
        let analysis = analyze_failures(&objects, &graph, 10);

        let primary: Vec<&str> = analysis
            .primary_failures
            .iter()
            .map(|f| f.qualified_name.as_str())
            .collect();
        let dependent: Vec<&str> = analysis
            .dependent_failures
            .iter()
            .map(|f| f.qualified_name.as_str())
            .collect();
        assert_eq!(primary, vec!["dbo.a", "dbo.c"]);
        assert_eq!(dependent, vec!["dbo.b"]);
    }

    #[test]
    fn test_split_partitions_all_failures() {
        let objects = vec![
            obj("a", ObjectStatus::Failed, &[]),
            obj("b", ObjectStatus::Failed, &["a"]),
            obj("c", ObjectStatus::Failed, &["b"]),
            obj("d", ObjectStatus::Passed, &[]),
        ];
        let graph = DependencyGraph::build(&objects);
        let analysis = analyze_failures(&objects, &graph, 10);

        assert_eq!(analysis.total_failures(), 3);
        for f in analysis
            .primary_failures
            .iter()
            .chain(analysis.dependent_failures.iter())
        {
            assert!(
                analysis
                    .primary_failures
                    .iter()
                    .filter(|p| p.qualified_name == f.qualified_name)
                    .count()
                    + analysis
                        .dependent_failures
                        .iter()
                        .filter(|p| p.qualified_name == f.qualified_name)
                        .count()
                    == 1
            );
        }
    }

    #[test]
    fn test_most_impactful_orders_and_caps() {
        let mut objects = vec![
            obj("a", ObjectStatus::Failed, &[]),
            obj("b", ObjectStatus::Passed, &["a"]),
            obj("c", ObjectStatus::Passed, &["a"]),
            obj("x", ObjectStatus::Failed, &[]),
            obj("y", ObjectStatus::Passed, &["x"]),
        ];
        let graph = DependencyGraph::build(&objects);
        let scores = compute_impact_scores(&objects, &graph, 10);
        apply_impact_scores(&mut objects, &scores);
        let analysis = analyze_failures(&objects, &graph, 10);

        let top = analysis.most_impactful(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].qualified_name, "dbo.a");
        assert_eq!(top[0].impact_score, 2);
    }
}
