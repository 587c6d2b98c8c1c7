//! API Routes
//!
//! HTTP endpoints exposing the published views, network selection and metrics

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::Metrics;
use crate::config::PeerMapConfig;
use crate::format::time_elapsed;
use crate::types::{Dashboard, Peer};

/// Shared API state
pub struct ApiState {
    pub config: Arc<PeerMapConfig>,
    pub dashboard: Arc<RwLock<Dashboard>>,
    pub metrics: Arc<Metrics>,
    pub network_tx: watch::Sender<String>,
}

/// Build the API router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))

        // Published views
        .route("/dashboard", get(get_dashboard))
        .route("/peers", get(get_peers))
        .route("/versions", get(get_versions))
        .route("/heatmap", get(get_heatmap))
        .route("/rankings", get(get_rankings))

        // Network selection
        .route("/network", get(get_network))
        .route("/network/:name", post(switch_network))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_api_server(
    config: Arc<PeerMapConfig>,
    dashboard: Arc<RwLock<Dashboard>>,
    metrics: Arc<Metrics>,
    network_tx: watch::Sender<String>,
) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));

    let state = Arc::new(ApiState {
        config,
        dashboard,
        metrics,
        network_tx,
    });

    info!("📊 HTTP API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /status - Service and view status
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.read().await;

    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.metrics.uptime_secs(),
        "network": *state.network_tx.borrow(),
        "poll_interval_secs": state.config.poll_interval_secs,
        "table_updated_at": dashboard.table.as_ref().map(|t| t.updated_at),
        "map_updated_at": dashboard.map.as_ref().map(|m| m.updated_at),
    }))
}

/// GET /dashboard - Both published views
async fn get_dashboard(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.read().await;
    Json(dashboard.clone())
}

/// Table row with a human-readable last seen label
#[derive(Serialize)]
struct PeerRow<'a> {
    #[serde(flatten)]
    peer: &'a Peer,
    last_seen_label: String,
}

/// GET /peers - Located peers, most recently seen first
async fn get_peers(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.read().await;
    let now = Utc::now();

    let Some(table) = dashboard.table.as_ref() else {
        return Json(serde_json::json!({ "network": null, "total": 0, "peers": [] }));
    };

    let peers: Vec<PeerRow> = table
        .peers
        .iter()
        .map(|peer| PeerRow {
            peer,
            last_seen_label: time_elapsed(peer.last_seen.secs_since_epoch, now),
        })
        .collect();

    Json(serde_json::json!({
        "network": table.network,
        "total": table.total,
        "pending_lookups": table.pending_lookups,
        "peers": peers,
    }))
}

/// GET /versions - Version distribution
async fn get_versions(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.read().await;
    let versions = dashboard
        .table
        .as_ref()
        .map(|t| t.versions.clone())
        .unwrap_or_default();
    Json(versions)
}

/// GET /heatmap - `[lat, lon, weight]` points
async fn get_heatmap(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.read().await;
    let points = dashboard
        .map
        .as_ref()
        .map(|m| m.heat_points.clone())
        .unwrap_or_default();
    Json(points)
}

/// GET /rankings - Busiest locations
async fn get_rankings(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.read().await;
    let rankings = dashboard
        .map
        .as_ref()
        .map(|m| m.rankings.clone())
        .unwrap_or_default();
    Json(rankings)
}

/// GET /network - Currently selected network
async fn get_network(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let network = state.network_tx.borrow().clone();
    Json(serde_json::json!({ "network": network }))
}

/// POST /network/:name - Switch network and poll it right away
async fn switch_network(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let name = name.trim().to_string();
    if name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "network name must not be empty" })),
        );
    }

    state.network_tx.send_replace(name.clone());
    info!("Network switch requested: {}", name);

    (StatusCode::OK, Json(serde_json::json!({ "network": name })))
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.metrics.to_json())
}
