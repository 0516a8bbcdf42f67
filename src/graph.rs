//! Adjacency-array road graph.
//!
//! All nodes live in one array, all edges in another, with a per-node offset
//! array indexing into the edge array. The outgoing edges of node `i` occupy
//! `edges[offsets[i]..offsets[i+1]]`, so a relaxation pass is a linear scan
//! over one contiguous allocation.
//!
//! The graph is sized up front from the declared node and edge counts, filled
//! by the loader, and frozen once node elevations are assigned and edge
//! climbs recomputed. There is no API to grow or shrink it afterwards.

use anyhow::{bail, Result};
use serde::Serialize;

/// A graph node: geographic position plus elevation in centimeters.
///
/// Elevation starts at zero and is written exactly once during startup,
/// after the SRTM tiles have been consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Node {
    pub lat: f64,
    pub lon: f64,
    pub elevation_cm: i32,
}

/// A directed edge. The source node is implicit: an edge belongs to whichever
/// node's offset range contains it.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    /// Target node id.
    pub target: u32,
    /// Physical length in centimeters.
    pub length_cm: u32,
    /// Positive elevation gain in centimeters: `max(0, elev(target) - elev(source))`.
    pub climb_cm: u32,
}

impl Edge {
    /// Weighted cost of traversing this edge.
    ///
    /// `weight = 1.0` optimizes for distance only, `weight = 0.0` for climb
    /// only. The result is a non-negative integer in centimeters, rounded
    /// half-away-from-zero; this is the only floating-point step in the
    /// query path, so costs can be summed in `u64` without drift.
    #[inline(always)]
    pub fn cost(&self, weight: f64) -> u64 {
        (weight * self.length_cm as f64 + (1.0 - weight) * self.climb_cm as f64).round() as u64
    }
}

/// Geographic extent of a loaded graph, plus its centroid.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub center_lat: f64,
    pub center_lon: f64,
}

/// The in-memory routing graph.
#[derive(Debug)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// `nodes.len() + 1` entries, monotonically non-decreasing,
    /// `offsets[0] == 0`, `offsets[n] == edges.len()`.
    pub offsets: Vec<u32>,
}

impl Graph {
    /// Create an empty graph sized for the declared counts. The loader fills
    /// nodes by id, appends edges in source order and maintains the offsets.
    pub fn new(node_count: usize, edge_count: usize) -> Self {
        Self {
            nodes: vec![Node::default(); node_count],
            edges: Vec::with_capacity(edge_count),
            offsets: vec![0u32; node_count + 1],
        }
    }

    #[inline(always)]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline(always)]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline(always)]
    pub fn node(&self, id: u32) -> &Node {
        &self.nodes[id as usize]
    }

    /// Outgoing edges of a node as a contiguous slice.
    #[inline(always)]
    pub fn outgoing(&self, node: u32) -> &[Edge] {
        let start = self.offsets[node as usize] as usize;
        let end = self.offsets[node as usize + 1] as usize;
        &self.edges[start..end]
    }

    /// Find the first edge from `source` to `target`, if any.
    pub fn find_edge(&self, source: u32, target: u32) -> Option<&Edge> {
        self.outgoing(source).iter().find(|e| e.target == target)
    }

    /// Recompute every edge's climb from the current node elevations:
    /// `climb = max(0, elev(target) - elev(source))`. Lengths are untouched.
    ///
    /// Must run after node elevations are assigned and before any query.
    pub fn update_edge_climbs(&mut self) {
        for source in 0..self.nodes.len() {
            let source_elev = self.nodes[source].elevation_cm;
            let start = self.offsets[source] as usize;
            let end = self.offsets[source + 1] as usize;
            for i in start..end {
                let target_elev = self.nodes[self.edges[i].target as usize].elevation_cm;
                self.edges[i].climb_cm = (target_elev - source_elev).max(0) as u32;
            }
        }
    }

    /// Bounding box and centroid over all node coordinates.
    pub fn bounds(&self) -> Bounds {
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lon = f64::MAX;
        let mut max_lon = f64::MIN;

        for node in &self.nodes {
            min_lat = min_lat.min(node.lat);
            max_lat = max_lat.max(node.lat);
            min_lon = min_lon.min(node.lon);
            max_lon = max_lon.max(node.lon);
        }

        Bounds {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
            center_lat: (min_lat + max_lat) / 2.0,
            center_lon: (min_lon + max_lon) / 2.0,
        }
    }

    /// Rough memory footprint of the adjacency arrays in bytes.
    pub fn estimated_memory_bytes(&self) -> u64 {
        let node_bytes = self.nodes.len() as u64 * (8 + 8 + 4);
        let edge_bytes = self.edges.len() as u64 * (4 + 4 + 4);
        let offset_bytes = self.offsets.len() as u64 * 4;
        node_bytes + edge_bytes + offset_bytes
    }

    /// Sweep the structural invariants: offset monotonicity and boundary
    /// values, target ids in range. Climb non-negativity is guaranteed by the
    /// `u32` representation. Run once after loading.
    pub fn validate(&self) -> Result<()> {
        let n = self.nodes.len();
        let m = self.edges.len();

        if self.offsets.len() != n + 1 {
            bail!("offset array has {} entries, expected {}", self.offsets.len(), n + 1);
        }
        if self.offsets[0] != 0 {
            bail!("offsets[0] = {}, expected 0", self.offsets[0]);
        }
        if self.offsets[n] as usize != m {
            bail!("offsets[{}] = {}, expected edge count {}", n, self.offsets[n], m);
        }
        for i in 0..n {
            if self.offsets[i] > self.offsets[i + 1] {
                bail!(
                    "offsets not monotone at node {}: {} > {}",
                    i,
                    self.offsets[i],
                    self.offsets[i + 1]
                );
            }
        }
        for (i, edge) in self.edges.iter().enumerate() {
            if edge.target as usize >= n {
                bail!("edge {} targets node {} outside [0, {})", i, edge.target, n);
            }
        }

        Ok(())
    }
}
