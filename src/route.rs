//! Route service: slider-to-weight translation and route materialization.
//!
//! Raw distance values dwarf raw climb values on real terrain, so feeding
//! the UI slider straight into the cost blend collapses most of its range
//! onto the pure-distance route. The service therefore probes both extremes
//! first and only then runs the search that produces the returned route.

use serde::Serialize;

use crate::dijkstra::DijkstraEngine;
use crate::graph::Graph;

/// Exponent of the slider remap. Tunable: any curve that is monotone and
/// agrees with the slider at 0 and 1 keeps the route scenarios valid; 0.7
/// spreads visible route variation over the middle of the slider.
const SLIDER_EXPONENT: f64 = 0.7;

/// A materialized route with exact aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    /// Node ids from source to target.
    pub node_ids: Vec<u32>,
    /// `[lon, lat]` pairs in GeoJSON coordinate order.
    pub coordinates: Vec<[f64; 2]>,
    /// Sum of per-edge lengths along the path, in centimeters.
    pub distance_cm: u64,
    /// Sum of per-edge climbs along the path, in centimeters.
    pub climb_cm: u64,
}

/// Wraps a Dijkstra engine and owns its mutable work arrays; one route
/// computation at a time per service instance.
pub struct RouteService {
    engine: DijkstraEngine,
}

impl RouteService {
    pub fn new(node_count: usize) -> Self {
        Self {
            engine: DijkstraEngine::new(node_count),
        }
    }

    /// Compute the route for a slider position in `[0, 1]` (1 favors
    /// shortest distance, 0 favors least climb).
    ///
    /// Two reference searches at the extreme weights establish the
    /// magnitudes `d_max` and `g_max`; the slider is then rescaled and a
    /// third search produces the returned route. `None` means source and
    /// target are not connected; there is never a partial result.
    pub fn route(&mut self, graph: &Graph, from: u32, to: u32, slider: f64) -> Option<Route> {
        let distance_route = self.engine.run_with_path(graph, from, to, 1.0)?;
        let climb_route = self.engine.run_with_path(graph, from, to, 0.0)?;

        let d_max = distance_route.distance_cm.max(climb_route.distance_cm);
        let g_max = distance_route.climb_cm.max(climb_route.climb_cm);

        let weight = rescale_slider(slider, d_max, g_max);
        let path = self.engine.run_with_path(graph, from, to, weight)?;

        let coordinates = path
            .nodes
            .iter()
            .map(|&id| {
                let node = graph.node(id);
                [node.lon, node.lat]
            })
            .collect();

        Some(Route {
            coordinates,
            distance_cm: path.distance_cm,
            climb_cm: path.climb_cm,
            node_ids: path.nodes,
        })
    }
}

/// Map the slider onto a routing weight.
///
/// On degenerate terrain (no distance or no climb anywhere on either
/// reference route) the slider passes through unchanged; otherwise the
/// power curve shifts meaningful variation into the middle of the range.
fn rescale_slider(slider: f64, d_max: u64, g_max: u64) -> f64 {
    if d_max == 0 || g_max == 0 {
        slider
    } else {
        slider.powf(SLIDER_EXPONENT)
    }
}
