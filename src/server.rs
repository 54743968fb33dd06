use crate::config::AppConfig;
use crate::coordinator::{switch_indicator, ClickOutcome, Dashboard, Phase, SharedDashboard, SwitchReport};
use crate::data::{GeoLoader, SourceFetcher};
use crate::error::DashboardError;
use crate::headless::{HeadlessMap, Scene};
use crate::scale::Legend;
use crate::table::{Layout, PropertyRow, PropertyTable};
use crate::types::{DatasetKind, GeoFeature, ViewRole};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub struct AppState {
    pub dashboard: SharedDashboard<HeadlessMap>,
    pub loader: GeoLoader<SourceFetcher>,
}

type ApiError = (StatusCode, String);

#[derive(Serialize)]
pub struct IndicatorSummary {
    key: String,
    label: String,
    active: bool,
}

#[derive(Deserialize)]
pub struct ClickRequest {
    geoid: String,
}

#[derive(Serialize)]
pub struct LegendResponse {
    hex: Option<Legend>,
    tract: Option<Legend>,
}

#[derive(Deserialize)]
pub struct SelectionParams {
    #[serde(default)]
    layout: Layout,
}

#[derive(Serialize)]
pub struct SelectionResponse {
    phase: Phase,
    geoid: Option<String>,
    label: Option<String>,
    cells: Vec<Vec<String>>,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct QueryResponse {
    geoid: String,
    label: Option<String>,
    properties: Vec<PropertyRow>,
}

/// Display name of a feature from the configured label column.
fn label_of(config: &AppConfig, feature: &GeoFeature) -> Option<String> {
    let field = config.input.label_field.as_deref()?;
    feature.value(field).map(|v| v.to_string())
}

pub fn router(state: Arc<AppState>, static_dir: &std::path::Path) -> Router {
    Router::new()
        .route("/api/indicators", get(indicators_handler))
        .route("/api/indicator/:key", post(switch_handler))
        .route("/api/views/:view", get(view_handler))
        .route("/api/views/:view/click", post(click_handler))
        .route("/api/legend", get(legend_handler))
        .route("/api/selection", get(selection_handler))
        .route("/api/query", get(query_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let fetcher = SourceFetcher::new().context("Failed to build HTTP client")?;
    let loader = GeoLoader::new(fetcher, &config.input.id_field);
    let default_indicator = config
        .default_indicator()
        .context("No indicators configured")?
        .key
        .clone();
    let port = config.server.port;
    let static_dir = config.server.static_dir.clone();

    let dashboard = Arc::new(Mutex::new(Dashboard::new(config, |_| HeadlessMap::new())));
    let state = Arc::new(AppState { dashboard, loader });

    info!(indicator = %default_indicator, "Loading initial datasets");
    let report = switch_indicator(&state.dashboard, &state.loader, &default_indicator).await?;
    info!(hex = ?report.hex, tract = ?report.tract, "Initial load finished");

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let app = router(state, &static_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn indicators_handler(State(state): State<Arc<AppState>>) -> Json<Vec<IndicatorSummary>> {
    let dashboard = state.dashboard.lock();
    let active = dashboard.state().indicator();
    let summaries = dashboard
        .config()
        .indicators
        .iter()
        .map(|indicator| IndicatorSummary {
            key: indicator.key.clone(),
            label: indicator.label().to_string(),
            active: active.is_some_and(|a| a.eq_ignore_ascii_case(&indicator.key)),
        })
        .collect();
    Json(summaries)
}

async fn switch_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<SwitchReport>, ApiError> {
    match switch_indicator(&state.dashboard, &state.loader, &key).await {
        Ok(report) => Ok(Json(report)),
        Err(e @ DashboardError::UnknownIndicator(_)) => {
            warn!(indicator = %key, "{}", e);
            Err((StatusCode::NOT_FOUND, e.to_string()))
        }
    }
}

async fn view_handler(
    State(state): State<Arc<AppState>>,
    Path(view): Path<ViewRole>,
) -> Json<Scene> {
    Json(state.dashboard.lock().view(view).map().scene())
}

async fn click_handler(
    State(state): State<Arc<AppState>>,
    Path(view): Path<ViewRole>,
    Json(request): Json<ClickRequest>,
) -> Json<ClickOutcome> {
    Json(state.dashboard.lock().click_feature(view, &request.geoid))
}

async fn legend_handler(State(state): State<Arc<AppState>>) -> Json<LegendResponse> {
    let dashboard = state.dashboard.lock();
    Json(LegendResponse {
        hex: dashboard.legend(DatasetKind::Hex),
        tract: dashboard.legend(DatasetKind::Tract),
    })
}

async fn selection_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SelectionParams>,
) -> Json<SelectionResponse> {
    let dashboard = state.dashboard.lock();
    let cells = dashboard
        .selected_properties()
        .map(|table| table.cells(params.layout))
        .unwrap_or_default();
    Json(SelectionResponse {
        phase: dashboard.state().phase(),
        geoid: dashboard.state().selection().selected().map(str::to_string),
        label: dashboard
            .selected_feature()
            .and_then(|feature| label_of(dashboard.config(), feature)),
        cells,
    })
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let dashboard = state.dashboard.lock();
    let config = dashboard.config();
    Json(dashboard.locate(params.lon, params.lat).map(|feature| QueryResponse {
        geoid: feature.id.clone(),
        label: label_of(config, feature),
        properties: PropertyTable::for_feature(feature, &config.input.id_field).rows,
    }))
}
