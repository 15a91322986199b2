//! Balanced, dependency-respecting partitioning within a type group.
//!
//! Objects are distributed greedily in a deterministic order (dependency
//! layer, then impact, then name), with each object constrained to a batch
//! no earlier than any of its already-placed in-group dependencies. A
//! rebalancing pass then moves low-impact objects from the fullest batch
//! to the emptiest while the spread exceeds the configured tolerance,
//! refusing any move that would break dependency ordering.

use std::cmp::Reverse;
use std::collections::HashMap;

use tracing::debug;

use crate::graph::DependencyGraph;
use crate::model::{resolve_dependency, DatabaseObject};

/// Number of batches for a group of `group_size` objects: start from the
/// desired count and shrink while batches would fall below the minimum
/// size. An empty group gets zero batches; a non-empty group at least one.
pub fn determine_batch_count(group_size: usize, desired: usize, min_batch_size: usize) -> usize {
    if group_size == 0 {
        return 0;
    }
    let mut count = desired.max(1);
    while count > 1 && group_size / count < min_batch_size {
        count -= 1;
    }
    count
}

/// Split `objects` into `num_batches` batches.
///
/// `layer_of` maps lookup keys to dependency layer indices; objects absent
/// from the map sort last. Ordering guarantee: an object is never placed
/// in a batch earlier than an in-group dependency that was placed before
/// it.
pub fn partition_balanced(
    objects: Vec<DatabaseObject>,
    num_batches: usize,
    graph: &DependencyGraph,
    layer_of: &HashMap<String, usize>,
    balance_tolerance: u32,
) -> Vec<Vec<DatabaseObject>> {
    if objects.is_empty() || num_batches == 0 {
        return Vec::new();
    }
    if num_batches == 1 {
        return vec![objects];
    }

    let mut ordered = objects;
    ordered.sort_by(|a, b| {
        let la = layer_of.get(&a.lookup_key()).copied().unwrap_or(usize::MAX);
        let lb = layer_of.get(&b.lookup_key()).copied().unwrap_or(usize::MAX);
        (la, Reverse(a.impact_score), a.lookup_key())
            .cmp(&(lb, Reverse(b.impact_score), b.lookup_key()))
    });

    // lookup key -> batch index, for objects already placed
    let mut placed: HashMap<String, usize> = HashMap::new();
    let mut batches: Vec<Vec<DatabaseObject>> = vec![Vec::new(); num_batches];

    for obj in ordered {
        let min_eligible = obj
            .dependencies
            .iter()
            .filter_map(|dep| placed.get(&resolve_dependency(dep, &obj.schema_name)))
            .copied()
            .max()
            .unwrap_or(0);

        let target = (min_eligible..num_batches)
            .min_by_key(|&i| batches[i].len())
            .unwrap_or(num_batches - 1);

        placed.insert(obj.lookup_key(), target);
        batches[target].push(obj);
    }

    rebalance(&mut batches, &mut placed, graph, balance_tolerance);
    batches
}

/// Shuttle objects from the fullest batch to the emptiest until the size
/// spread is within tolerance or no legal move remains. Bounded by the
/// total object count so it always terminates.
fn rebalance(
    batches: &mut [Vec<DatabaseObject>],
    placed: &mut HashMap<String, usize>,
    graph: &DependencyGraph,
    balance_tolerance: u32,
) {
    let total: usize = batches.iter().map(|b| b.len()).sum();
    if total == 0 {
        return;
    }
    let ideal = total as f64 / batches.len() as f64;

    for _ in 0..total {
        let largest = (0..batches.len())
            .max_by_key(|&i| batches[i].len())
            .unwrap_or(0);
        let smallest = (0..batches.len())
            .min_by_key(|&i| batches[i].len())
            .unwrap_or(0);
        let spread = batches[largest].len() - batches[smallest].len();
        let imbalance = spread as f64 / ideal * 100.0;
        if imbalance <= balance_tolerance as f64 {
            break;
        }

        // move the lowest-impact object whose relocation keeps ordering legal
        let mut candidates: Vec<usize> = (0..batches[largest].len()).collect();
        candidates.sort_by(|&a, &b| {
            let (oa, ob) = (&batches[largest][a], &batches[largest][b]);
            oa.impact_score
                .cmp(&ob.impact_score)
                .then_with(|| oa.lookup_key().cmp(&ob.lookup_key()))
        });

        let movable = candidates
            .into_iter()
            .find(|&i| move_is_legal(&batches[largest][i], smallest, placed, graph));
        let Some(idx) = movable else {
            debug!("no legal rebalancing move remains");
            break;
        };

        let obj = batches[largest].remove(idx);
        placed.insert(obj.lookup_key(), smallest);
        batches[smallest].push(obj);
    }
}

/// A move to an earlier batch is illegal if a placed dependency would end
/// up in a later batch; a move to a later batch is illegal if a placed
/// dependent would end up in an earlier one.
fn move_is_legal(
    obj: &DatabaseObject,
    target: usize,
    placed: &HashMap<String, usize>,
    graph: &DependencyGraph,
) -> bool {
    let key = obj.lookup_key();
    for dep in graph.direct_dependencies(&key) {
        if let Some(&dep_batch) = placed.get(&dep) {
            if dep_batch > target {
                return false;
            }
        }
    }
    for dependent in graph.direct_dependents(&key) {
        if let Some(&dependent_batch) = placed.get(&dependent) {
            if dependent_batch < target {
                return false;
            }
        }
    }
    true
}
