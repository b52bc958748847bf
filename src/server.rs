use crate::config::{AppConfig, CountColumn, MapConfig};
use crate::style::Popup;
use crate::types::{FilterEvent, FilterState};
use crate::view::{Dataset, ViewSnapshot};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

// `dataset` is None when the initial load failed
pub struct AppState {
    pub config: AppConfig,
    pub dataset: Option<Dataset>,
    pub filter: Mutex<FilterState>,
}

impl AppState {
    pub fn new(config: AppConfig, dataset: Option<Dataset>) -> Self {
        Self {
            config,
            dataset,
            filter: Mutex::new(FilterState::default()),
        }
    }

    fn dataset(&self) -> Result<&Dataset, StatusCode> {
        self.dataset.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

/// Page bootstrap: map placement and the counter element ids.
#[derive(Serialize)]
pub struct PageConfig {
    map: MapConfig,
    counters: Vec<CountColumn>,
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let dataset = match Dataset::load(config.clone()).await {
        Ok(dataset) => Some(dataset),
        Err(e) => {
            error!("Failed to load dashboard data: {:#}", e);
            None
        }
    };

    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let app = router(Arc::new(AppState::new(config, dataset)));

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let web_dir = ServeDir::new(&state.config.server.web_dir);

    Router::new()
        .route("/api/config", get(config_handler))
        .route("/api/view", get(view_handler))
        .route("/api/filter", post(filter_handler))
        .route("/api/query", get(query_handler))
        .fallback_service(web_dir)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<PageConfig> {
    Json(PageConfig {
        map: state.config.map.clone(),
        counters: state.config.columns.counts.clone(),
    })
}

async fn view_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ViewSnapshot>, StatusCode> {
    let dataset = state.dataset()?;
    let filter = state.filter.lock().await;
    Ok(Json(dataset.snapshot(&filter)))
}

async fn filter_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<FilterEvent>,
) -> Result<Json<ViewSnapshot>, StatusCode> {
    let dataset = state.dataset()?;
    let mut filter = state.filter.lock().await;
    let (next, snapshot) = dataset.dispatch(filter.clone(), event);
    *filter = next;
    Ok(Json(snapshot))
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Option<Popup>>, StatusCode> {
    let dataset = state.dataset()?;
    Ok(Json(dataset.popup_at(params.lon, params.lat)))
}
