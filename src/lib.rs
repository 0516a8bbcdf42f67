//! velo-route: climb-aware bicycle routing over country-scale road graphs.
//!
//! Pipeline at startup:
//! - Parse the `.fmi` graph text into a packed adjacency array
//! - Assign every node an elevation from SRTM `.hgt` tiles
//! - Recompute per-edge climbs from the node elevations
//!
//! Steady state: weighted Dijkstra queries where the edge cost blends
//! physical distance with positive elevation gain under a caller-chosen
//! weight in [0, 1]. Serves a batch benchmark harness (`.que` in, costs out)
//! and an interactive HTTP endpoint (two map clicks in, polyline plus
//! distance and climb out).

pub mod cli;
pub mod dijkstra;
pub mod elevation;
pub mod fmi;
pub mod graph;
pub mod nearest;
pub mod route;
pub mod server;

pub use dijkstra::{DijkstraEngine, PathSummary, UNREACHABLE};
pub use elevation::ElevationStore;
pub use graph::{Edge, Graph, Node};
pub use route::{Route, RouteService};
