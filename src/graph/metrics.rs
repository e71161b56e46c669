//! Summary metrics over a built snapshot: density, degree, most-connected
//! node and per-group statistics.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::{GraphEdge, GraphNode};

/// The node with the highest degree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MostConnected {
    pub id: i64,
    pub label: String,
    pub degree: usize,
}

/// Connectivity inside one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub nodes: usize,
    /// Edges with both endpoints in the group.
    pub internal_edges: usize,
    /// Edges with exactly one endpoint in the group.
    pub external_edges: usize,
    /// Internal edges over the possible pairs inside the group (0 for a single node).
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    /// Incident edge count per node id; every node is present, isolated ones at 0.
    pub degree: BTreeMap<i64, usize>,
    /// Incident edges at or above the strong threshold, per node id.
    pub strong_degree: BTreeMap<i64, usize>,
    pub most_connected: Option<MostConnected>,
    pub groups: BTreeMap<String, GroupStats>,
}

/// `edges / (n * (n - 1) / 2)`; 0 when fewer than two nodes.
pub fn density(node_count: usize, edge_count: usize) -> f64 {
    if node_count < 2 {
        return 0.0;
    }
    let max_edges = (node_count * (node_count - 1)) as f64 / 2.0;
    edge_count as f64 / max_edges
}

impl GraphMetrics {
    pub fn compute(nodes: &[GraphNode], edges: &[GraphEdge], strong_threshold: i64) -> Self {
        let mut degree: BTreeMap<i64, usize> = nodes.iter().map(|n| (n.id, 0)).collect();
        let mut strong_degree = degree.clone();

        // Endpoints that are not in the node list are ignored.
        for edge in edges {
            for endpoint in [edge.from, edge.to] {
                if let Some(d) = degree.get_mut(&endpoint) {
                    *d += 1;
                }
                if edge.width >= strong_threshold {
                    if let Some(d) = strong_degree.get_mut(&endpoint) {
                        *d += 1;
                    }
                }
            }
        }

        let most_connected = most_connected(nodes, edges, &degree);
        let groups = group_stats(nodes, edges);

        Self {
            node_count: nodes.len(),
            edge_count: edges.len(),
            density: density(nodes.len(), edges.len()),
            degree,
            strong_degree,
            most_connected,
            groups,
        }
    }

    /// Degree relative to the other nodes (`degree / (n - 1)`); 0 for unknown ids
    /// or graphs with fewer than two nodes.
    pub fn centrality(&self, id: i64) -> f64 {
        match self.degree.get(&id) {
            Some(&d) if self.node_count > 1 => d as f64 / (self.node_count - 1) as f64,
            _ => 0.0,
        }
    }
}

/// Highest-degree node. Ties go to the node met first when walking the edges
/// in order, `from` before `to`. `None` when no node has an edge.
fn most_connected(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    degree: &BTreeMap<i64, usize>,
) -> Option<MostConnected> {
    let max = degree.values().copied().max().filter(|&m| m > 0)?;
    let id = edges
        .iter()
        .flat_map(|e| [e.from, e.to])
        .find(|id| degree.get(id) == Some(&max))?;
    let label = nodes.iter().find(|n| n.id == id).map(|n| n.label.clone())?;
    Some(MostConnected { id, label, degree: max })
}

fn group_stats(nodes: &[GraphNode], edges: &[GraphEdge]) -> BTreeMap<String, GroupStats> {
    let group_of: HashMap<i64, &str> = nodes.iter().map(|n| (n.id, n.group.as_str())).collect();

    let mut stats: BTreeMap<String, GroupStats> = BTreeMap::new();
    for node in nodes {
        stats
            .entry(node.group.clone())
            .or_insert(GroupStats {
                nodes: 0,
                internal_edges: 0,
                external_edges: 0,
                density: 0.0,
            })
            .nodes += 1;
    }

    for edge in edges {
        let (Some(&g1), Some(&g2)) = (group_of.get(&edge.from), group_of.get(&edge.to)) else {
            continue;
        };
        if g1 == g2 {
            if let Some(s) = stats.get_mut(g1) {
                s.internal_edges += 1;
            }
        } else {
            for g in [g1, g2] {
                if let Some(s) = stats.get_mut(g) {
                    s.external_edges += 1;
                }
            }
        }
    }

    for s in stats.values_mut() {
        s.density = density(s.nodes, s.internal_edges);
    }

    stats
}
