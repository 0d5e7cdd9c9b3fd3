use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::join::JoinOutcome;
use crate::pipeline;
use crate::projection;
use crate::render;
use crate::types::{Crs, RegionGeometry, UnmatchedRegion};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{Coord, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

// Bounding box of one boundary record, pointing back into `AppState::geometries`.
pub struct RegionIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Shared, read-only server state. Boundaries never change between
/// statistic updates, so they are loaded once; statistics are reloaded on
/// every request.
pub struct AppState {
    pub geometries: Vec<RegionGeometry>,
    pub tree: RTree<RegionIndex>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, geometries: Vec<RegionGeometry>) -> Self {
        let items: Vec<RegionIndex> = geometries
            .iter()
            .enumerate()
            .filter_map(|(index, region)| {
                let rect = region.geometry.bounding_rect()?;
                Some(RegionIndex {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Self {
            geometries,
            tree: RTree::bulk_load(items),
            config,
        }
    }

    /// Index of the region containing `point` (in the target CRS).
    pub fn locate(&self, point: Point<f64>) -> Option<usize> {
        let envelope = AABB::from_point([point.x(), point.y()]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .filter(|&i| self.geometries[i].geometry.contains(&point))
            .min()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error!("request failed: {}", self);
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RegionSummary {
    pub name: String,
    pub statistic: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct RegionsResponse {
    pub regions: Vec<RegionSummary>,
    pub unmatched: Vec<UnmatchedRegion>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(map_handler))
        .route("/api/regions", get(regions_handler))
        .route("/api/query", get(query_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, geometries: Vec<RegionGeometry>) -> Result<()> {
    info!(regions = geometries.len(), "building spatial index");
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, geometries));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Runs an isolated statistics load + join against the cached boundaries.
async fn fresh_join(state: Arc<AppState>) -> Result<JoinOutcome, ServerError> {
    tokio::task::spawn_blocking(move || {
        pipeline::join_with_geometries(&state.config, state.geometries.clone())
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))?
    .map_err(ServerError::from)
}

pub async fn map_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>, ServerError> {
    let style = state.config.output.map.clone();
    let outcome = fresh_join(state).await?;
    let map = render::render_map(&outcome.regions, &style)?;
    Ok(Html(map.html))
}

pub async fn regions_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RegionsResponse>, ServerError> {
    let outcome = fresh_join(state).await?;
    let regions = outcome
        .regions
        .iter()
        .map(|r| RegionSummary {
            name: r.region_name.clone(),
            statistic: r.statistic,
        })
        .collect();
    Ok(Json(RegionsResponse {
        regions,
        unmatched: outcome.unmatched,
    }))
}

pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Option<RegionSummary>>, ServerError> {
    let target = state.config.processing.target_crs;
    let projected = projection::transform_coord(Coord { x: params.lon, y: params.lat }, Crs::WGS84, target)?;

    let Some(index) = state.locate(Point::from(projected)) else {
        return Ok(Json(None));
    };

    // Joined output keeps geometry order, so the index carries over.
    let outcome = fresh_join(state).await?;
    Ok(Json(outcome.regions.get(index).map(|r| RegionSummary {
        name: r.region_name.clone(),
        statistic: r.statistic,
    })))
}
