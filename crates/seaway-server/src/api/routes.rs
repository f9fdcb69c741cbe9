//! REST API routes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;
use crate::worker::{BoundaryError, BoundaryStatus};
use seaway_core::{
    BoundingBox, ClassifierStats, FailureReason, GeoPoint, RouteRequest, RouteResult,
    SourceError, WaterClassification,
};

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/route", post(find_route))
        .route("/v1/water", get(classify_point))
        .route("/v1/water/preload", post(preload_area))
        .route("/v1/worker", get(worker_status))
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bad_request(error: &str, details: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "details": details })),
    )
}

fn validate_point(name: &str, lat: f64, lon: f64) -> Result<GeoPoint, ApiError> {
    let point = GeoPoint::new(lat, lon);
    if !point.is_finite() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(bad_request(
            "Invalid coordinate",
            format!(
                "{} must have lat within [-90, 90] and lon within [-180, 180], got ({}, {})",
                name, lat, lon
            ),
        ));
    }
    Ok(point)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBody {
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub success: bool,
    pub waypoints: Vec<GeoPoint>,
    /// Nautical miles.
    pub distance: f64,
    pub crosses_land: bool,
    pub waypoint_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl From<RouteResult> for RouteResponse {
    fn from(result: RouteResult) -> Self {
        Self {
            success: result.success,
            crosses_land: result.crosses_land(),
            waypoint_count: result.waypoints.len(),
            distance: result.distance_nm,
            failure_reason: result.failure_reason,
            waypoints: result.waypoints,
        }
    }
}

async fn find_route(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RouteBody>,
) -> Result<Json<RouteResponse>, ApiError> {
    let start = validate_point("start", body.start_lat, body.start_lon)?;
    let end = validate_point("end", body.end_lat, body.end_lon)?;
    let request = RouteRequest {
        start,
        end,
        max_iterations: body.max_iterations.unwrap_or(state.config().max_iterations),
    };

    let result = state.boundary().find_route(request).await;
    if let Some(reason) = result.failure_reason {
        tracing::info!(
            "Route ({:.5}, {:.5}) -> ({:.5}, {:.5}) unavailable: {:?}",
            start.lat,
            start.lon,
            end.lat,
            end.lon,
            reason
        );
    }
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize)]
pub struct WaterQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterResponse {
    pub lat: f64,
    pub lon: f64,
    pub classification: WaterClassification,
    pub is_water: bool,
}

async fn classify_point(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WaterQuery>,
) -> Result<Json<WaterResponse>, ApiError> {
    let point = validate_point("point", query.lat, query.lon)?;
    let classification = match state.boundary().classify(point).await {
        Ok(classification) => classification,
        Err(err) => {
            tracing::warn!("Classification unavailable, reporting land: {}", err);
            WaterClassification::Land
        }
    };
    Ok(Json(WaterResponse {
        lat: point.lat,
        lon: point.lon,
        classification,
        is_water: classification.is_water(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadBody {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

async fn preload_area(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PreloadBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let bounds = BoundingBox::new(body.min_lat, body.min_lon, body.max_lat, body.max_lon);
    if !bounds.is_valid() || bounds.crosses_antimeridian() {
        return Err(bad_request(
            "Invalid bounding box",
            "min_lat/min_lon must not exceed max_lat/max_lon and must be in range; \
             antimeridian-crossing boxes are not supported"
                .to_string(),
        ));
    }

    match state.boundary().preload(bounds).await {
        Ok(loaded) => Ok(Json(json!({ "loaded": loaded }))),
        Err(BoundaryError::Source(
            err @ (SourceError::InvalidBounds(_) | SourceError::TooManyTiles { .. }),
        )) => Err(bad_request("Preload rejected", err.to_string())),
        Err(BoundaryError::Source(err)) => {
            tracing::error!("Preload failed: {}", err);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Preload failed", "details": err.to_string() })),
            ))
        }
        Err(err) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Worker unavailable", "details": err.to_string() })),
        )),
    }
}

#[derive(Debug, Serialize)]
struct WorkerStatusResponse {
    boundary: BoundaryStatus,
    worker: Option<ClassifierStats>,
}

async fn worker_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let boundary = state.boundary();
    let worker = match boundary.worker_stats().await {
        Ok(stats) => Some(stats),
        Err(err) => {
            tracing::debug!("Worker stats unavailable: {}", err);
            None
        }
    };
    Json(WorkerStatusResponse {
        boundary: boundary.status(),
        worker,
    })
}
