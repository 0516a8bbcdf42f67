//! HTTP API for interactive routing.
//!
//! # Endpoints
//!
//! - `GET /nearest?lat=F&lon=F` - snap a map click to the closest graph node
//! - `GET /route?from=I&to=I&slider=F` - route between two node ids
//! - `GET /bounds` - bounding box and centroid of the loaded graph
//! - `GET /health` - liveness check
//! - `GET /api-docs/openapi.json` - OpenAPI document
//! - anything else - static front-end files from the configured web dir
//!
//! The graph is read-only and shared freely; the route engine's work arrays
//! are mutable and guarded by a mutex, serializing queries per engine
//! instance. Route computation runs on the blocking pool so a multi-second
//! Dijkstra cannot stall the async runtime.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::TcpListener as StdTcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::graph::{Bounds, Graph};
use crate::nearest::nearest_node;
use crate::route::RouteService;

#[derive(OpenApi)]
#[openapi(
    paths(nearest_handler, route_handler, bounds_handler, health_handler),
    components(schemas(
        NearestResponse,
        RouteResponse,
        LineString,
        BoundsResponse,
        HealthResponse,
        ErrorResponse
    )),
    info(
        title = "velo-route API",
        description = "Climb-aware bicycle routing over a country-scale road graph"
    )
)]
struct ApiDoc;

/// Shared state: the frozen graph plus one serialized route engine.
pub struct ServerState {
    graph: Graph,
    bounds: Bounds,
    router: Mutex<RouteService>,
}

impl ServerState {
    pub fn new(graph: Graph) -> Self {
        let bounds = graph.bounds();
        let router = Mutex::new(RouteService::new(graph.node_count()));
        Self {
            graph,
            bounds,
            router,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============ /nearest ============

#[derive(Debug, Deserialize, IntoParams)]
pub struct NearestParams {
    /// Latitude in degrees
    lat: f64,
    /// Longitude in degrees
    lon: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NearestResponse {
    /// Id of the closest graph node
    #[serde(rename = "nodeId")]
    pub node_id: u32,
    /// Latitude of that node
    pub lat: f64,
    /// Longitude of that node
    pub lon: f64,
}

/// Snap a coordinate to the closest graph node
#[utoipa::path(
    get,
    path = "/nearest",
    params(NearestParams),
    responses(
        (status = 200, description = "Closest node", body = NearestResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
    )
)]
async fn nearest_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<NearestParams>,
) -> Response {
    if !(-90.0..=90.0).contains(&params.lat) {
        return bad_request(format!("latitude {} outside [-90, 90]", params.lat));
    }
    if !(-180.0..=180.0).contains(&params.lon) {
        return bad_request(format!("longitude {} outside [-180, 180]", params.lon));
    }

    let node_id = nearest_node(&state.graph, params.lat, params.lon);
    let node = state.graph.node(node_id);

    Json(NearestResponse {
        node_id,
        lat: node.lat,
        lon: node.lon,
    })
    .into_response()
}

// ============ /route ============

#[derive(Debug, Deserialize, IntoParams)]
pub struct RouteParams {
    /// Source node id
    from: u32,
    /// Target node id
    to: u32,
    /// Trade-off slider: 1.0 favors shortest distance, 0.0 least climb
    slider: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteResponse {
    /// Total route length in centimeters
    #[serde(rename = "distanceCm")]
    pub distance_cm: u64,
    /// Total positive climb in centimeters
    #[serde(rename = "elevationGainCm")]
    pub elevation_gain_cm: u64,
    /// Route geometry as a GeoJSON LineString
    pub geojson: LineString,
}

/// GeoJSON LineString geometry.
#[derive(Debug, Serialize, ToSchema)]
pub struct LineString {
    /// Always "LineString"
    #[serde(rename = "type")]
    pub kind: String,
    /// `[lon, lat]` pairs from source to target
    pub coordinates: Vec<[f64; 2]>,
}

impl LineString {
    fn new(coordinates: Vec<[f64; 2]>) -> Self {
        Self {
            kind: "LineString".to_string(),
            coordinates,
        }
    }
}

/// Compute a route between two graph nodes
#[utoipa::path(
    get,
    path = "/route",
    params(RouteParams),
    responses(
        (status = 200, description = "Route found", body = RouteResponse),
        (status = 400, description = "Invalid parameters", body = ErrorResponse),
        (status = 404, description = "No route between the nodes", body = ErrorResponse),
    )
)]
async fn route_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<RouteParams>,
) -> Response {
    let node_count = state.graph.node_count() as u32;
    if params.from >= node_count {
        return bad_request(format!("from node {} outside [0, {})", params.from, node_count));
    }
    if params.to >= node_count {
        return bad_request(format!("to node {} outside [0, {})", params.to, node_count));
    }
    if !(0.0..=1.0).contains(&params.slider) {
        return bad_request(format!("slider {} outside [0, 1]", params.slider));
    }

    // Dijkstra over 12M nodes can take seconds; keep it off the async runtime.
    let state_clone = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut router = state_clone
            .router
            .lock()
            .expect("route engine mutex poisoned");
        router.route(&state_clone.graph, params.from, params.to, params.slider)
    })
    .await;

    match result {
        Ok(Some(route)) => Json(RouteResponse {
            distance_cm: route.distance_cm,
            elevation_gain_cm: route.climb_cm,
            geojson: LineString::new(route.coordinates),
        })
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no route found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("route computation failed: {}", e),
            }),
        )
            .into_response(),
    }
}

// ============ /bounds ============

#[derive(Debug, Serialize, ToSchema)]
pub struct BoundsResponse {
    #[serde(rename = "minLat")]
    pub min_lat: f64,
    #[serde(rename = "maxLat")]
    pub max_lat: f64,
    #[serde(rename = "minLon")]
    pub min_lon: f64,
    #[serde(rename = "maxLon")]
    pub max_lon: f64,
    #[serde(rename = "centerLat")]
    pub center_lat: f64,
    #[serde(rename = "centerLon")]
    pub center_lon: f64,
}

/// Bounding box and centroid of the loaded graph
#[utoipa::path(
    get,
    path = "/bounds",
    responses((status = 200, description = "Graph extent", body = BoundsResponse))
)]
async fn bounds_handler(State(state): State<Arc<ServerState>>) -> Json<BoundsResponse> {
    let b = state.bounds;
    Json(BoundsResponse {
        min_lat: b.min_lat,
        max_lat: b.max_lat,
        min_lon: b.min_lon,
        max_lon: b.max_lon,
        center_lat: b.center_lat,
        center_lon: b.center_lon,
    })
}

// ============ /health ============

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub nodes: usize,
    pub edges: usize,
}

/// Liveness check with graph size
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is up", body = HealthResponse))
)]
async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        nodes: state.graph.node_count(),
        edges: state.graph.edge_count(),
    })
}

// ============ Router & serve ============

/// Build the axum router over a prepared state.
pub fn build_router(state: Arc<ServerState>, web_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/nearest", get(nearest_handler))
        .route("/route", get(route_handler))
        .route("/bounds", get(bounds_handler))
        .route("/health", get(health_handler))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .fallback_service(ServeDir::new(web_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Find a free port starting from the given port.
pub fn find_free_port(start: u16) -> u16 {
    for port in start..65535 {
        if StdTcpListener::bind(("127.0.0.1", port)).is_ok() {
            return port;
        }
    }
    panic!("no free port found");
}

/// Shutdown signal: waits for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, starting graceful shutdown");
}

/// Serve the API over a loaded graph until interrupted.
pub async fn serve(graph: Graph, port: Option<u16>, web_dir: PathBuf) -> anyhow::Result<()> {
    let state = Arc::new(ServerState::new(graph));
    let port = port.unwrap_or_else(|| find_free_port(8080));
    let app = build_router(state, &web_dir);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("server listening on http://127.0.0.1:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn two_node_graph() -> Graph {
        let mut graph = Graph::new(2, 1);
        graph.nodes[0] = Node {
            lat: 48.0,
            lon: 9.0,
            elevation_cm: 100,
        };
        graph.nodes[1] = Node {
            lat: 48.0001,
            lon: 9.0,
            elevation_cm: 500,
        };
        graph.offsets = vec![0, 1, 1];
        graph.edges.push(crate::graph::Edge {
            target: 1,
            length_cm: 1500,
            climb_cm: 0,
        });
        graph.update_edge_climbs();
        graph
    }

    #[test]
    fn test_route_response_serialization() {
        // Field names are part of the wire contract.
        let response = RouteResponse {
            distance_cm: 1500,
            elevation_gain_cm: 400,
            geojson: LineString::new(vec![[9.0, 48.0], [9.0, 48.0001]]),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["distanceCm"], 1500);
        assert_eq!(json["elevationGainCm"], 400);
        assert_eq!(json["geojson"]["type"], "LineString");
        assert_eq!(json["geojson"]["coordinates"][0][0], 9.0);
    }

    #[test]
    fn test_nearest_response_serialization() {
        let response = NearestResponse {
            node_id: 7,
            lat: 48.0,
            lon: 9.0,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["nodeId"], 7);
        assert_eq!(json["lat"], 48.0);
    }

    #[test]
    fn test_state_precomputes_bounds() {
        let state = ServerState::new(two_node_graph());
        assert_eq!(state.bounds.min_lat, 48.0);
        assert_eq!(state.bounds.max_lat, 48.0001);
        assert_eq!(state.bounds.center_lon, 9.0);
    }

    #[test]
    fn test_route_via_state() {
        let state = Arc::new(ServerState::new(two_node_graph()));
        let route = {
            let mut router = state.router.lock().unwrap();
            router.route(&state.graph, 0, 1, 1.0).unwrap()
        };
        assert_eq!(route.distance_cm, 1500);
        assert_eq!(route.climb_cm, 400);
    }
}
