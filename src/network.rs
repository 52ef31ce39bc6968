//! Station-to-station flow network.
//!
//! Trips are aggregated into directed (origin, destination, trip_count)
//! edges, thresholded relative to total trip volume before the graph is
//! built, then pruned of stations without known coordinates. Pruning happens
//! before any degree-based sizing so sizes always reflect the topology that
//! is actually rendered.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::TripTable;
use crate::stations::{StationDirectory, display_name};

/// Directed flow graph: node weights are station ids, edge weights are trip
/// counts.
pub type FlowGraph = DiGraph<i64, u64>;

/// Geographic position of a station.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Station id → coordinates, from the companion geocoding JSON (keys are ids
/// rendered as strings).
#[derive(Debug, Default, Clone)]
pub struct StationLocations {
    by_id: HashMap<i64, LatLon>,
}

impl StationLocations {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading station locations from {}", path.display()))?;
        let raw: HashMap<String, LatLon> =
            serde_json::from_str(&text).context("parsing station locations JSON")?;
        let by_id = raw
            .into_iter()
            .filter_map(|(key, loc)| key.parse::<i64>().ok().map(|id| (id, loc)))
            .collect();
        Ok(StationLocations { by_id })
    }

    pub fn get(&self, id: i64) -> Option<LatLon> {
        self.by_id.get(&id).copied()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.by_id.contains_key(&id)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(i64, f64, f64)]) -> Self {
        StationLocations {
            by_id: pairs
                .iter()
                .map(|&(id, lat, lon)| (id, LatLon { lat, lon }))
                .collect(),
        }
    }
}

/// Builds the directed flow graph from the canonical trip table.
///
/// Only rows with both station ids resolved participate. Edges whose
/// trip_count falls below `threshold * total_trips` are discarded before
/// construction; self-loops threshold like any other edge and stay in the
/// graph (removing them for display is the caller's call, see
/// [`remove_self_loops`]).
pub fn build_flow_graph(table: &TripTable, threshold: f64) -> FlowGraph {
    // BTreeMap keeps edge insertion deterministic across runs.
    let mut counts: BTreeMap<(i64, i64), u64> = BTreeMap::new();
    for row in table.rows() {
        if let (Some(start), Some(end)) = (row.start_station_id, row.end_station_id) {
            *counts.entry((start, end)).or_default() += 1;
        }
    }

    let total: u64 = counts.values().sum();
    let cutoff = threshold * total as f64;

    let mut graph = FlowGraph::new();
    let mut nodes: HashMap<i64, NodeIndex> = HashMap::new();
    let mut kept = 0usize;
    for ((start, end), trip_count) in counts {
        if (trip_count as f64) < cutoff {
            continue;
        }
        let a = *nodes.entry(start).or_insert_with(|| graph.add_node(start));
        let b = *nodes.entry(end).or_insert_with(|| graph.add_node(end));
        graph.add_edge(a, b, trip_count);
        kept += 1;
    }

    debug!(
        total_trips = total,
        edges = kept,
        nodes = graph.node_count(),
        "Flow graph built"
    );
    graph
}

/// Removes nodes with no known coordinates, along with their incident edges.
/// Must run before any degree-based sizing. Returns how many were removed.
pub fn prune_missing_coordinates(graph: &mut FlowGraph, locations: &StationLocations) -> usize {
    let before = graph.node_count();
    graph.retain_nodes(|g, idx| locations.contains(g[idx]));
    let removed = before - graph.node_count();
    if removed > 0 {
        info!(removed, "Pruned stations without coordinates");
    }
    removed
}

/// Strips self-loop edges; used for the visualisation copy of the graph.
pub fn remove_self_loops(graph: &mut FlowGraph) {
    graph.retain_edges(|g, e| {
        g.edge_endpoints(e)
            .map(|(a, b)| a != b)
            .unwrap_or(false)
    });
}

/// Projects the directed graph onto an undirected one where each edge weight
/// is the sum of both directed weights between the pair.
pub fn undirected_projection(graph: &FlowGraph) -> UnGraph<i64, u64> {
    let mut projected = UnGraph::new_undirected();
    let mut nodes: HashMap<i64, NodeIndex> = HashMap::new();
    for idx in graph.node_indices() {
        let id = graph[idx];
        nodes.insert(id, projected.add_node(id));
    }

    let mut weights: BTreeMap<(i64, i64), u64> = BTreeMap::new();
    for edge in graph.edge_references() {
        let u = graph[edge.source()];
        let v = graph[edge.target()];
        let forward = *edge.weight();
        let reverse = graph
            .find_edge(edge.target(), edge.source())
            .and_then(|e| graph.edge_weight(e))
            .copied()
            .unwrap_or(0);
        let key = if u <= v { (u, v) } else { (v, u) };
        weights.insert(key, forward + reverse);
    }

    for ((u, v), weight) in weights {
        projected.add_edge(nodes[&u], nodes[&v], weight);
    }
    projected
}

/// Trip-count-weighted out-degree, used for node sizing.
pub fn weighted_out_degree(graph: &FlowGraph, idx: NodeIndex) -> u64 {
    graph
        .edges_directed(idx, Direction::Outgoing)
        .map(|e| *e.weight())
        .sum()
}

/// Per-node annotation for the presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Weighted out-degree in the pruned graph.
    pub size: u64,
    pub community: usize,
}

/// One directed edge of the flow graph, for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct FlowEdge {
    pub start_station_id: i64,
    pub end_station_id: i64,
    pub trip_count: u64,
}

pub fn flow_edges(graph: &FlowGraph) -> Vec<FlowEdge> {
    graph
        .edge_references()
        .map(|e| FlowEdge {
            start_station_id: graph[e.source()],
            end_station_id: graph[e.target()],
            trip_count: *e.weight(),
        })
        .collect()
}

/// Assembles node annotations for a pruned graph. Every node is guaranteed a
/// coordinate (pruning ran first) and a community label (the partition covers
/// the projection's node set, which equals the graph's).
pub fn node_info(
    graph: &FlowGraph,
    locations: &StationLocations,
    directory: &StationDirectory,
    partition: &HashMap<i64, usize>,
) -> Vec<NodeInfo> {
    let mut infos: Vec<NodeInfo> = graph
        .node_indices()
        .filter_map(|idx| {
            let id = graph[idx];
            let loc = locations.get(id)?;
            let name = directory
                .lookup_name(id)
                .map(display_name)
                .unwrap_or_else(|| id.to_string());
            Some(NodeInfo {
                id,
                name,
                lat: loc.lat,
                lon: loc.lon,
                size: weighted_out_degree(graph, idx),
                community: partition.get(&id).copied().unwrap_or(0),
            })
        })
        .collect();
    infos.sort_by(|a, b| b.size.cmp(&a.size));
    infos
}
