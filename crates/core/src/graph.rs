//! Dependency graph construction and ordering queries.
//!
//! Nodes are object identities keyed by lowercase qualified name; an edge
//! A -> B means "A depends on B" (B must exist before A). The graph
//! supports cycle detection (Tarjan's strongly connected components),
//! deterministic topological sorting (Kahn's algorithm with lexicographic
//! tie-breaks), layer decomposition, and depth-bounded reachability.
//!
//! Uses `petgraph::DiGraph` with a name-to-index map so lookups stay O(1)
//! while the algorithms run on plain integer indices.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction::{Incoming, Outgoing};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CircularResolution;
use crate::error::PlanError;
use crate::model::{resolve_dependency, DatabaseObject, ObjectStatus, ObjectType};

/// Node payload: identity plus the object facts the algorithms need.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Display-cased qualified name.
    pub qualified_name: String,
    /// Lowercase lookup key.
    pub key: String,
    pub object_type: ObjectType,
    /// Lowercase schema name.
    pub schema: String,
    pub status: ObjectStatus,
}

/// Whether an edge was declared in the input or inferred by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Explicit,
    Implicit,
}

/// Aggregate statistics over the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub num_layers: usize,
    pub cycle_count: usize,
    pub cycles: Vec<Vec<String>>,
    pub max_chain_depth: usize,
    pub root_nodes: usize,
    pub leaf_nodes: usize,
}

/// Result of layer decomposition: each layer holds lookup keys whose
/// dependencies lie entirely in earlier layers.
#[derive(Debug, Clone)]
pub struct LayerOutcome {
    pub layers: Vec<Vec<String>>,
    pub warnings: Vec<String>,
}

/// The directed dependency graph over a fixed object inventory.
pub struct DependencyGraph {
    graph: DiGraph<NodeInfo, EdgeKind>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph from an object list: one node per object, explicit
    /// edges from declared dependencies, then implicit convention edges.
    ///
    /// Dependency references that resolve to nothing in the inventory are
    /// dropped with a log entry, never an error — the inventory is assumed
    /// possibly incomplete.
    pub fn build(objects: &[DatabaseObject]) -> Self {
        let mut graph = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();

        for obj in objects {
            let key = obj.lookup_key();
            if index.contains_key(&key) {
                continue;
            }
            let idx = graph.add_node(NodeInfo {
                qualified_name: obj.qualified_name(),
                key: key.clone(),
                object_type: obj.object_type.clone(),
                schema: obj.schema_name.to_lowercase(),
                status: obj.status,
            });
            index.insert(key, idx);
        }

        let mut dg = Self { graph, index };
        dg.add_explicit_edges(objects);
        dg.add_implicit_edges();
        info!(
            nodes = dg.node_count(),
            edges = dg.edge_count(),
            "dependency graph built"
        );
        dg
    }

    fn add_explicit_edges(&mut self, objects: &[DatabaseObject]) {
        for obj in objects {
            let from_key = obj.lookup_key();
            let from = self.index[&from_key];
            for dep in &obj.dependencies {
                if dep.trim().is_empty() {
                    continue;
                }
                let resolved = resolve_dependency(dep, &obj.schema_name);
                match self.index.get(&resolved) {
                    Some(&to) => self.add_edge_checked(from, to, EdgeKind::Explicit),
                    None => debug!(
                        dependency = %dep,
                        object = %obj.qualified_name(),
                        "dependency not found in inventory, dropping"
                    ),
                }
            }
        }
    }

    /// Convention-derived edges:
    /// - statistics depend on the same-schema table whose name appears in
    ///   the statistics object's name;
    /// - external tables depend on every external data source and file
    ///   format;
    /// - tables, views, procedures, functions, and security objects depend
    ///   on the schema object matching their own schema name.
    fn add_implicit_edges(&mut self) {
        let mut schemas: Vec<(NodeIndex, String)> = Vec::new();
        let mut ext_sources: Vec<NodeIndex> = Vec::new();
        let mut ext_formats: Vec<NodeIndex> = Vec::new();
        let mut tables_by_schema: HashMap<String, Vec<(NodeIndex, String)>> = HashMap::new();

        for idx in self.graph.node_indices() {
            let info = &self.graph[idx];
            let unqualified = unqualified_name(&info.key);
            match info.object_type {
                ObjectType::Schema => schemas.push((idx, unqualified)),
                ObjectType::ExternalDataSource => ext_sources.push(idx),
                ObjectType::ExternalFileFormat => ext_formats.push(idx),
                ObjectType::Table => tables_by_schema
                    .entry(info.schema.clone())
                    .or_default()
                    .push((idx, unqualified)),
                _ => {}
            }
        }

        for idx in self.graph.node_indices().collect::<Vec<_>>() {
            let info = self.graph[idx].clone();
            let name_lower = unqualified_name(&info.key);

            match info.object_type {
                ObjectType::Statistics => {
                    if let Some(tables) = tables_by_schema.get(&info.schema) {
                        for (table_idx, table_name) in tables.clone() {
                            if name_lower.contains(table_name.as_str()) {
                                self.add_edge_checked(idx, table_idx, EdgeKind::Implicit);
                            }
                        }
                    }
                }
                ObjectType::ExternalTable => {
                    for target in ext_sources.iter().chain(ext_formats.iter()).copied() {
                        self.add_edge_checked(idx, target, EdgeKind::Implicit);
                    }
                }
                ObjectType::Table
                | ObjectType::View
                | ObjectType::StoredProcedure
                | ObjectType::Function
                | ObjectType::Security => {
                    for (schema_idx, schema_name) in schemas.clone() {
                        if schema_name == info.schema {
                            self.add_edge_checked(idx, schema_idx, EdgeKind::Implicit);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Add an edge unless it would be a self-loop or a duplicate of an
    /// existing edge between the same ordered pair.
    fn add_edge_checked(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
        if from == to {
            return;
        }
        if self.graph.find_edge(from, to).is_some() {
            return;
        }
        self.graph.add_edge(from, to, kind);
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Display-cased qualified name for a lookup key.
    pub fn display_name(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&idx| self.graph[idx].qualified_name.as_str())
    }

    pub fn node_status(&self, key: &str) -> Option<ObjectStatus> {
        self.index.get(key).map(|&idx| self.graph[idx].status)
    }

    pub fn node_type(&self, key: &str) -> Option<&ObjectType> {
        self.index.get(key).map(|&idx| &self.graph[idx].object_type)
    }

    /// Direct dependencies of a node, sorted by lookup key.
    pub fn direct_dependencies(&self, key: &str) -> Vec<String> {
        self.neighbor_keys(key, Outgoing)
    }

    /// Direct dependents of a node, sorted by lookup key.
    pub fn direct_dependents(&self, key: &str) -> Vec<String> {
        self.neighbor_keys(key, Incoming)
    }

    fn neighbor_keys(&self, key: &str, dir: petgraph::Direction) -> Vec<String> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// All strongly connected components of size > 1, as display names in
    /// visit order. Never mutates the graph.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                scc.into_iter()
                    .map(|idx| self.graph[idx].qualified_name.clone())
                    .collect()
            })
            .collect()
    }

    /// Kahn's algorithm with lexicographic tie-breaking for reproducible
    /// output. Returns lookup keys ordered so every dependency precedes
    /// its dependents. Fails if the graph has a cycle.
    pub fn topological_sort(&self) -> Result<Vec<String>, PlanError> {
        let mut pending: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Outgoing).count())
            .collect();

        let mut heap: BinaryHeap<Reverse<(String, NodeIndex)>> = self
            .graph
            .node_indices()
            .filter(|idx| pending[idx.index()] == 0)
            .map(|idx| Reverse((self.graph[idx].key.clone(), idx)))
            .collect();

        let mut result = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((key, idx))) = heap.pop() {
            result.push(key);
            for dependent in self.graph.neighbors_directed(idx, Incoming) {
                pending[dependent.index()] -= 1;
                if pending[dependent.index()] == 0 {
                    heap.push(Reverse((self.graph[dependent].key.clone(), dependent)));
                }
            }
        }

        if result.len() < self.graph.node_count() {
            return Err(PlanError::CircularDependency {
                cycles: self.detect_cycles(),
            });
        }
        Ok(result)
    }

    /// Group nodes into dependency layers: layer 0 holds nodes with no
    /// dependencies, layer k nodes whose dependencies all lie in layers
    /// 0..k-1. Nodes left unassigned by a cycle are handled per `policy`.
    pub fn layers(&self, policy: CircularResolution) -> Result<LayerOutcome, PlanError> {
        let no_removals: HashSet<EdgeIndex> = HashSet::new();
        let (layers, remaining) = self.wavefronts(&no_removals);
        if remaining.is_empty() {
            return Ok(LayerOutcome {
                layers,
                warnings: Vec::new(),
            });
        }

        match policy {
            CircularResolution::Error => Err(PlanError::CircularDependency {
                cycles: self.detect_cycles(),
            }),
            CircularResolution::Warn => {
                let mut layers = layers;
                let warning = format!(
                    "Unresolvable circular dependencies among {} object(s); placed in final layer.",
                    remaining.len()
                );
                warn!("{warning}");
                layers.push(remaining);
                Ok(LayerOutcome {
                    layers,
                    warnings: vec![warning],
                })
            }
            CircularResolution::Break => {
                let (removed, mut warnings) = self.edges_to_break();
                let (mut layers, remaining) = self.wavefronts(&removed);
                if !remaining.is_empty() {
                    let warning = format!(
                        "Unresolvable circular dependencies among {} object(s) after breaking edges; placed in final layer.",
                        remaining.len()
                    );
                    warn!("{warning}");
                    warnings.push(warning);
                    layers.push(remaining);
                }
                Ok(LayerOutcome { layers, warnings })
            }
        }
    }

    /// Pick one edge per strongly connected component to sever, so a
    /// subsequent layering pass can make progress. Lossy by design.
    fn edges_to_break(&self) -> (HashSet<EdgeIndex>, Vec<String>) {
        let mut removed = HashSet::new();
        let mut warnings = Vec::new();
        for scc in tarjan_scc(&self.graph) {
            if scc.len() < 2 {
                continue;
            }
            'search: for (i, &a) in scc.iter().enumerate() {
                for &b in scc.iter().skip(i + 1).chain(scc.iter().take(i)) {
                    if let Some(edge) = self.graph.find_edge(a, b) {
                        removed.insert(edge);
                        let msg = format!(
                            "Removed dependency edge '{}' -> '{}' to break a cycle.",
                            self.graph[a].qualified_name, self.graph[b].qualified_name
                        );
                        warn!("{msg}");
                        warnings.push(msg);
                        break 'search;
                    }
                }
            }
        }
        (removed, warnings)
    }

    /// In-degree-reduction wavefront pass. Returns the layers (each sorted
    /// by key) plus any nodes left unassigned, sorted by key.
    fn wavefronts(&self, removed: &HashSet<EdgeIndex>) -> (Vec<Vec<String>>, Vec<String>) {
        let mut pending: Vec<usize> = vec![0; self.graph.node_count()];
        for edge in self.graph.edge_references() {
            if !removed.contains(&edge.id()) {
                pending[edge.source().index()] += 1;
            }
        }

        let mut assigned = vec![false; self.graph.node_count()];
        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| pending[idx.index()] == 0)
            .collect();

        let mut layers: Vec<Vec<String>> = Vec::new();
        while !current.is_empty() {
            let mut keys: Vec<String> = current
                .iter()
                .map(|&idx| self.graph[idx].key.clone())
                .collect();
            keys.sort();
            layers.push(keys);

            let mut next: Vec<NodeIndex> = Vec::new();
            for &idx in &current {
                assigned[idx.index()] = true;
                let incoming: Vec<(EdgeIndex, NodeIndex)> = self
                    .graph
                    .edges_directed(idx, Incoming)
                    .map(|e| (e.id(), e.source()))
                    .collect();
                for (edge_id, dependent) in incoming {
                    if removed.contains(&edge_id) {
                        continue;
                    }
                    pending[dependent.index()] -= 1;
                    if pending[dependent.index()] == 0 {
                        next.push(dependent);
                    }
                }
            }
            current = next;
        }

        let mut remaining: Vec<String> = self
            .graph
            .node_indices()
            .filter(|idx| !assigned[idx.index()])
            .map(|idx| self.graph[idx].key.clone())
            .collect();
        remaining.sort();
        (layers, remaining)
    }

    /// All nodes transitively required by `key`, following forward edges,
    /// bounded by `max_depth` hops. The bound stops expansion; it is not
    /// an error.
    pub fn ancestors(&self, key: &str, max_depth: usize) -> HashSet<String> {
        self.bounded_reach(key, max_depth, Outgoing)
    }

    /// All nodes that transitively require `key`, following reverse edges,
    /// bounded by `max_depth` hops.
    pub fn descendants(&self, key: &str, max_depth: usize) -> HashSet<String> {
        self.bounded_reach(key, max_depth, Incoming)
    }

    fn bounded_reach(
        &self,
        key: &str,
        max_depth: usize,
        dir: petgraph::Direction,
    ) -> HashSet<String> {
        let Some(&start) = self.index.get(key) else {
            return HashSet::new();
        };
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
        queue.push_back((start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.graph.neighbors_directed(current, dir) {
                if neighbor != start && visited.insert(neighbor) {
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        visited
            .into_iter()
            .map(|idx| self.graph[idx].key.clone())
            .collect()
    }

    /// Statistics for reports. Layering uses the `warn` fallback so the
    /// summary never fails on cyclic input.
    pub fn summary(&self) -> GraphSummary {
        let outcome = self
            .layers(CircularResolution::Warn)
            .unwrap_or(LayerOutcome {
                layers: Vec::new(),
                warnings: Vec::new(),
            });
        let cycles = self.detect_cycles();

        let mut root_nodes = 0;
        let mut leaf_nodes = 0;
        for idx in self.graph.node_indices() {
            if self.graph.neighbors_directed(idx, Outgoing).next().is_none() {
                root_nodes += 1;
            }
            if self.graph.neighbors_directed(idx, Incoming).next().is_none() {
                leaf_nodes += 1;
            }
        }

        GraphSummary {
            total_nodes: self.graph.node_count(),
            total_edges: self.graph.edge_count(),
            num_layers: outcome.layers.len(),
            cycle_count: cycles.len(),
            cycles,
            max_chain_depth: outcome.layers.len().saturating_sub(1),
            root_nodes,
            leaf_nodes,
        }
    }
}

fn unqualified_name(key: &str) -> String {
    key.rsplit_once('.')
        .map(|(_, n)| n.to_string())
        .unwrap_or_else(|| key.to_string())
}
