//! Community detection on the undirected flow projection.
//!
//! Louvain modularity maximisation: repeated local moving of nodes between
//! communities followed by graph aggregation, until modularity stops
//! improving. Only partition membership is meaningful; label values are
//! arbitrary and not stable across algorithm changes. Node order is fixed by
//! node index, so a given input always yields the same partition.

use std::collections::HashMap;

use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use tracing::debug;

const MIN_MODULARITY_GAIN: f64 = 1e-7;

/// Weighted undirected graph in flat adjacency form, one aggregation level.
struct Level {
    /// Per node: (neighbor, weight), excluding self-loops.
    adj: Vec<Vec<(usize, f64)>>,
    /// Per node: self-loop weight.
    loops: Vec<f64>,
}

impl Level {
    fn node_count(&self) -> usize {
        self.adj.len()
    }

    /// Weighted degree; self-loops count twice, as usual for modularity.
    fn degree(&self, node: usize) -> f64 {
        self.adj[node].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * self.loops[node]
    }

    fn total_weight(&self) -> f64 {
        let edges: f64 = self
            .adj
            .iter()
            .flat_map(|neighbors| neighbors.iter().map(|&(_, w)| w))
            .sum();
        // Each non-loop edge appears in both adjacency lists.
        edges / 2.0 + self.loops.iter().sum::<f64>()
    }
}

/// Runs Louvain over the weighted undirected graph and returns station id →
/// community label. Every node in the graph gets exactly one label.
pub fn louvain_partition(graph: &UnGraph<i64, u64>) -> HashMap<i64, usize> {
    let ids: Vec<i64> = graph.node_indices().map(|idx| graph[idx]).collect();
    let index_of: HashMap<i64, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let mut level = Level {
        adj: vec![Vec::new(); ids.len()],
        loops: vec![0.0; ids.len()],
    };
    for edge in graph.edge_references() {
        let u = index_of[&graph[edge.source()]];
        let v = index_of[&graph[edge.target()]];
        let w = *edge.weight() as f64;
        if u == v {
            level.loops[u] += w;
        } else {
            level.adj[u].push((v, w));
            level.adj[v].push((u, w));
        }
    }

    // Each original node's community, refined level by level.
    let mut membership: Vec<usize> = (0..ids.len()).collect();
    let mut current_modularity = f64::NEG_INFINITY;

    loop {
        let (node2com, moved) = one_level(&level);
        let node2com = renumber(node2com);

        for slot in membership.iter_mut() {
            *slot = node2com[*slot];
        }

        let next = aggregate(&level, &node2com);
        let new_modularity = modularity(&next);
        let done = !moved || new_modularity - current_modularity < MIN_MODULARITY_GAIN;
        current_modularity = new_modularity;
        level = next;
        if done {
            break;
        }
    }

    debug!(
        nodes = ids.len(),
        communities = level.node_count(),
        modularity = current_modularity,
        "Louvain finished"
    );

    ids.into_iter()
        .enumerate()
        .map(|(i, id)| (id, membership[i]))
        .collect()
}

/// One pass of local moving. Returns the community of each node and whether
/// any node moved.
fn one_level(level: &Level) -> (Vec<usize>, bool) {
    let n = level.node_count();
    let two_m = 2.0 * level.total_weight();
    if two_m == 0.0 {
        return ((0..n).collect(), false);
    }

    let degrees: Vec<f64> = (0..n).map(|i| level.degree(i)).collect();
    let mut node2com: Vec<usize> = (0..n).collect();
    let mut sum_tot: Vec<f64> = degrees.clone();
    let mut moved_any = false;

    loop {
        let mut moved_this_pass = false;

        for node in 0..n {
            let own = node2com[node];
            sum_tot[own] -= degrees[node];

            // Weight from this node to each neighboring community.
            let mut com_weights: HashMap<usize, f64> = HashMap::new();
            for &(neighbor, w) in &level.adj[node] {
                *com_weights.entry(node2com[neighbor]).or_default() += w;
            }

            let mut best_com = own;
            let mut best_gain = com_weights.get(&own).copied().unwrap_or(0.0)
                - sum_tot[own] * degrees[node] / two_m;
            for (&com, &weight) in &com_weights {
                if com == own {
                    continue;
                }
                let gain = weight - sum_tot[com] * degrees[node] / two_m;
                // Strict improvement with a lower-index tiebreak keeps the
                // outcome independent of HashMap iteration order.
                if gain > best_gain + MIN_MODULARITY_GAIN
                    || (gain > best_gain - MIN_MODULARITY_GAIN && com < best_com)
                {
                    best_gain = gain;
                    best_com = com;
                }
            }

            sum_tot[best_com] += degrees[node];
            if best_com != own {
                node2com[node] = best_com;
                moved_this_pass = true;
                moved_any = true;
            }
        }

        if !moved_this_pass {
            break;
        }
    }

    (node2com, moved_any)
}

/// Renumbers community labels to consecutive small integers in order of first
/// appearance.
fn renumber(node2com: Vec<usize>) -> Vec<usize> {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    node2com
        .into_iter()
        .map(|com| {
            let next = mapping.len();
            *mapping.entry(com).or_insert(next)
        })
        .collect()
}

/// Collapses communities into single nodes for the next level.
fn aggregate(level: &Level, node2com: &[usize]) -> Level {
    let communities = node2com.iter().copied().max().map_or(0, |m| m + 1);
    let mut next = Level {
        adj: vec![Vec::new(); communities],
        loops: vec![0.0; communities],
    };

    let mut between: HashMap<(usize, usize), f64> = HashMap::new();
    for node in 0..level.node_count() {
        let cu = node2com[node];
        next.loops[cu] += level.loops[node];
        for &(neighbor, w) in &level.adj[node] {
            if neighbor < node {
                continue; // each undirected edge once
            }
            let cv = node2com[neighbor];
            if cu == cv {
                next.loops[cu] += w;
            } else {
                let key = if cu < cv { (cu, cv) } else { (cv, cu) };
                *between.entry(key).or_default() += w;
            }
        }
    }

    for ((cu, cv), w) in between {
        next.adj[cu].push((cv, w));
        next.adj[cv].push((cu, w));
    }
    next
}

/// Modularity of the partition where every node of `level` is its own
/// community (used after aggregation, where that is the current partition).
fn modularity(level: &Level) -> f64 {
    let m = level.total_weight();
    if m == 0.0 {
        return 0.0;
    }
    (0..level.node_count())
        .map(|node| {
            let inside = level.loops[node];
            let degree = level.degree(node);
            inside / m - (degree / (2.0 * m)).powi(2)
        })
        .sum()
}
