//! Weighted single-source shortest paths.
//!
//! One engine instance owns three work arrays sized to the node count
//! (tentative cost, settled flag, predecessor) plus the frontier heap, all
//! allocated once and reused across runs. A query performs no allocation
//! beyond heap growth on the first few calls.
//!
//! Frontier entries are immutable `(cost, node)` pairs: an improved
//! tentative cost pushes a fresh entry instead of a decrease-key, and stale
//! entries are discarded at pop time via the settled flag. Edge costs are
//! non-negative integers, so tentative costs sum exactly in `u64`.
//!
//! The engine serves one query at a time; callers wanting concurrency keep
//! one engine per worker over the shared read-only graph.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::graph::Graph;

/// Sentinel returned by one-to-one queries when the target is unreachable.
pub const UNREACHABLE: i64 = -1;

const INFINITY: u64 = u64::MAX;
const NO_PRED: i32 = -1;

/// Counters for a single run (heap traffic and edge relaxations).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStats {
    pub pushes: u64,
    pub pops: u64,
    pub relaxations: u64,
}

/// A reconstructed route: the node sequence plus exact aggregates re-summed
/// from the raw per-edge length and climb, independent of the query weight.
#[derive(Debug, Clone)]
pub struct PathSummary {
    /// Node ids from source to target inclusive.
    pub nodes: Vec<u32>,
    /// Weighted cost of the path under the query weight.
    pub cost: u64,
    /// Total physical length in centimeters.
    pub distance_cm: u64,
    /// Total positive climb in centimeters.
    pub climb_cm: u64,
}

/// Reusable Dijkstra state over a fixed-size graph.
pub struct DijkstraEngine {
    dist: Vec<u64>,
    settled: Vec<bool>,
    pred: Vec<i32>,
    heap: BinaryHeap<Reverse<(u64, u32)>>,
    stats: QueryStats,
}

impl DijkstraEngine {
    /// Allocate work arrays for a graph with `node_count` nodes.
    pub fn new(node_count: usize) -> Self {
        Self {
            dist: vec![INFINITY; node_count],
            settled: vec![false; node_count],
            pred: vec![NO_PRED; node_count],
            heap: BinaryHeap::with_capacity(1024),
            stats: QueryStats::default(),
        }
    }

    /// Shortest weighted cost from `source` to `target`, or [`UNREACHABLE`].
    ///
    /// Terminates as soon as the target is popped from the frontier.
    pub fn one_to_one(&mut self, graph: &Graph, source: u32, target: u32, weight: f64) -> i64 {
        self.search(graph, source, Some(target), weight, false)
    }

    /// Shortest weighted costs from `source` to every node; runs until the
    /// frontier drains. Read results through [`distance`](Self::distance).
    pub fn one_to_all(&mut self, graph: &Graph, source: u32, weight: f64) {
        self.search(graph, source, None, weight, false);
    }

    /// One-to-one with predecessor tracking and path reconstruction.
    /// Returns `None` when the target is unreachable; never a partial path.
    pub fn run_with_path(
        &mut self,
        graph: &Graph,
        source: u32,
        target: u32,
        weight: f64,
    ) -> Option<PathSummary> {
        let cost = self.search(graph, source, Some(target), weight, true);
        if cost < 0 {
            return None;
        }

        // Walk predecessors target -> source, then reverse.
        let mut nodes = Vec::new();
        let mut current = target as i32;
        while current != NO_PRED {
            nodes.push(current as u32);
            current = self.pred[current as usize];
        }
        nodes.reverse();

        // Totals come from the raw edge fields, not the weighted costs, so
        // the caller gets exact distance and climb for any weight.
        let mut distance_cm = 0u64;
        let mut climb_cm = 0u64;
        for pair in nodes.windows(2) {
            let edge = graph
                .find_edge(pair[0], pair[1])
                .expect("predecessor chain references a missing edge");
            distance_cm += edge.length_cm as u64;
            climb_cm += edge.climb_cm as u64;
        }

        Some(PathSummary {
            nodes,
            cost: cost as u64,
            distance_cm,
            climb_cm,
        })
    }

    /// Cost to `node` after a [`one_to_all`](Self::one_to_all) run;
    /// [`UNREACHABLE`] for nodes the search never reached.
    pub fn distance(&self, node: u32) -> i64 {
        match self.dist[node as usize] {
            INFINITY => UNREACHABLE,
            d => d as i64,
        }
    }

    /// Raw per-node costs from the last run (`u64::MAX` = unreachable).
    pub fn distances(&self) -> &[u64] {
        &self.dist
    }

    /// Counters from the last run.
    pub fn stats(&self) -> QueryStats {
        self.stats
    }

    fn search(
        &mut self,
        graph: &Graph,
        source: u32,
        target: Option<u32>,
        weight: f64,
        track_pred: bool,
    ) -> i64 {
        let n = graph.node_count();
        assert_eq!(self.dist.len(), n, "engine sized for a different graph");
        assert!((source as usize) < n, "source id {} out of range", source);
        if let Some(t) = target {
            assert!((t as usize) < n, "target id {} out of range", t);
        }

        self.dist.fill(INFINITY);
        self.settled.fill(false);
        if track_pred {
            self.pred.fill(NO_PRED);
        }
        self.heap.clear();
        self.stats = QueryStats::default();

        self.dist[source as usize] = 0;
        self.heap.push(Reverse((0, source)));
        self.stats.pushes += 1;

        while let Some(Reverse((cost, node))) = self.heap.pop() {
            self.stats.pops += 1;

            if Some(node) == target {
                return self.dist[node as usize] as i64;
            }
            if self.settled[node as usize] {
                continue;
            }
            self.settled[node as usize] = true;

            for edge in graph.outgoing(node) {
                let neighbor = edge.target;
                if self.settled[neighbor as usize] {
                    continue;
                }
                self.stats.relaxations += 1;

                let candidate = cost + edge.cost(weight);
                if candidate < self.dist[neighbor as usize] {
                    self.dist[neighbor as usize] = candidate;
                    if track_pred {
                        self.pred[neighbor as usize] = node as i32;
                    }
                    self.heap.push(Reverse((candidate, neighbor)));
                    self.stats.pushes += 1;
                }
            }
        }

        UNREACHABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, Node};

    fn build_graph(elevations: &[i32], edges: &[(u32, u32, u32)]) -> Graph {
        let mut graph = Graph::new(elevations.len(), edges.len());
        for (i, &elev) in elevations.iter().enumerate() {
            graph.nodes[i] = Node {
                lat: 48.0 + i as f64 * 0.0001,
                lon: 9.0,
                elevation_cm: elev,
            };
        }
        let mut next = 0usize;
        for (i, &(source, target, length_cm)) in edges.iter().enumerate() {
            for node in next..=source as usize {
                graph.offsets[node] = i as u32;
            }
            next = source as usize + 1;
            graph.edges.push(crate::graph::Edge {
                target,
                length_cm,
                climb_cm: 0,
            });
        }
        for node in next..=elevations.len() {
            graph.offsets[node] = edges.len() as u32;
        }
        graph.update_edge_climbs();
        graph
    }

    #[test]
    fn test_two_node_graph_weights() {
        // Nodes at 100 cm and 500 cm, one edge of 1500 cm: climb is 400 cm.
        let graph = build_graph(&[100, 500], &[(0, 1, 1500)]);
        assert_eq!(graph.outgoing(0)[0].climb_cm, 400);

        let mut engine = DijkstraEngine::new(graph.node_count());
        assert_eq!(engine.one_to_one(&graph, 0, 1, 1.0), 1500);
        assert_eq!(engine.one_to_one(&graph, 0, 1, 0.0), 400);
        assert_eq!(engine.one_to_one(&graph, 0, 1, 0.5), 950);
    }

    #[test]
    fn test_unreachable_returns_sentinel() {
        let graph = build_graph(&[0, 0], &[]);
        let mut engine = DijkstraEngine::new(2);

        for weight in [0.0, 0.5, 1.0] {
            assert_eq!(engine.one_to_one(&graph, 0, 1, weight), UNREACHABLE);
        }
        assert!(engine.run_with_path(&graph, 0, 1, 1.0).is_none());
    }

    #[test]
    fn test_source_equals_target_is_zero() {
        let graph = build_graph(&[0, 0, 0], &[(0, 1, 1000), (1, 2, 1000)]);
        let mut engine = DijkstraEngine::new(3);

        for node in 0..3 {
            for weight in [0.0, 0.3, 1.0] {
                assert_eq!(engine.one_to_one(&graph, node, node, weight), 0);
            }
        }
    }

    #[test]
    fn test_early_termination() {
        // Chain 0 -> 1 -> 2, flat, each edge 1000 cm.
        let graph = build_graph(&[0, 0, 0], &[(0, 1, 1000), (1, 2, 1000)]);
        let mut engine = DijkstraEngine::new(3);

        assert_eq!(engine.one_to_one(&graph, 0, 2, 1.0), 2000);

        // Reaching the direct neighbor must not explore past it: the source
        // pops first, then the target entry.
        assert_eq!(engine.one_to_one(&graph, 0, 1, 1.0), 1000);
        assert!(
            engine.stats().pops <= 2,
            "expected at most 2 pops, got {}",
            engine.stats().pops
        );
    }

    #[test]
    fn test_diamond_tie_breaking_is_deterministic() {
        // Two equal-cost paths 0 -> 1 -> 3 and 0 -> 2 -> 3.
        let graph = build_graph(
            &[0, 0, 0, 0],
            &[(0, 1, 1000), (0, 2, 1000), (1, 3, 1000), (2, 3, 1000)],
        );
        let mut engine = DijkstraEngine::new(4);

        let first = engine.run_with_path(&graph, 0, 3, 1.0).unwrap();
        assert_eq!(first.cost, 2000);
        for _ in 0..5 {
            let again = engine.run_with_path(&graph, 0, 3, 1.0).unwrap();
            assert_eq!(again.nodes, first.nodes);
            assert_eq!(again.cost, first.cost);
        }
    }

    #[test]
    fn test_one_to_all_matches_one_to_one() {
        // Small graph with a cycle and a detour; check consistency for all
        // targets at several weights.
        let graph = build_graph(
            &[0, 300, 100, 700, 0],
            &[
                (0, 1, 1000),
                (0, 2, 2500),
                (1, 2, 800),
                (1, 3, 4000),
                (2, 3, 2000),
                (3, 0, 500),
            ],
        );
        let mut all = DijkstraEngine::new(graph.node_count());
        let mut one = DijkstraEngine::new(graph.node_count());

        for weight in [0.0, 0.25, 0.5, 1.0] {
            all.one_to_all(&graph, 0, weight);
            for target in 0..graph.node_count() as u32 {
                assert_eq!(
                    all.distance(target),
                    one.one_to_one(&graph, 0, target, weight),
                    "mismatch for target {} at weight {}",
                    target,
                    weight
                );
            }
        }
        // Node 4 has no incoming edges at all.
        assert_eq!(all.distance(4), UNREACHABLE);
    }

    #[test]
    fn test_costs_are_non_negative() {
        let graph = build_graph(&[500, 100], &[(0, 1, 1200), (1, 0, 1200)]);
        let mut engine = DijkstraEngine::new(2);

        for weight in [0.0, 0.1, 0.9, 1.0] {
            let cost = engine.one_to_one(&graph, 0, 1, weight);
            assert!(cost >= 0 || cost == UNREACHABLE);
        }
    }

    #[test]
    fn test_symmetric_pair_at_full_distance_weight() {
        // Both directions exist with identical length; at w = 1.0 the cost
        // ignores the (asymmetric) climb entirely.
        let graph = build_graph(&[100, 900], &[(0, 1, 3000), (1, 0, 3000)]);
        let mut engine = DijkstraEngine::new(2);

        assert_eq!(
            engine.one_to_one(&graph, 0, 1, 1.0),
            engine.one_to_one(&graph, 1, 0, 1.0)
        );
    }

    #[test]
    fn test_path_reconstruction_and_sums() {
        // Uphill chain: 0 (0 cm) -> 1 (200 cm) -> 2 (150 cm).
        let graph = build_graph(&[0, 200, 150], &[(0, 1, 1000), (1, 2, 500)]);
        let mut engine = DijkstraEngine::new(3);

        let path = engine.run_with_path(&graph, 0, 2, 1.0).unwrap();
        assert_eq!(path.nodes, vec![0, 1, 2]);
        assert_eq!(path.distance_cm, 1500);
        // Climb: +200 on the first hop, downhill second hop counts zero.
        assert_eq!(path.climb_cm, 200);
        assert_eq!(path.cost, 1500);

        // Same path queried at pure-climb weight: aggregates are identical
        // because they are re-summed from the raw edges.
        let path = engine.run_with_path(&graph, 0, 2, 0.0).unwrap();
        assert_eq!(path.distance_cm, 1500);
        assert_eq!(path.climb_cm, 200);
        assert_eq!(path.cost, 200);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_source_panics() {
        let graph = build_graph(&[0, 0], &[(0, 1, 100)]);
        let mut engine = DijkstraEngine::new(2);
        engine.one_to_one(&graph, 9, 1, 1.0);
    }
}
