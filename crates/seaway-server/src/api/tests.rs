use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::{api, config::Config, state::AppState, worker::WorkerBoundary, worker::WorkerConfig};
use seaway_core::{
    BoundingBox, GeoPoint, SourceError, SourceStats, WaterClassification, WaterClassifier,
    WaterSource,
};

/// Open water with a north-south strip of land around longitude 0.
struct Strip;

impl WaterSource for Strip {
    fn classify(&self, point: GeoPoint) -> Option<WaterClassification> {
        Some(if point.lon.abs() <= 0.01 {
            WaterClassification::Land
        } else {
            WaterClassification::Ocean
        })
    }

    fn preload(&mut self, _bounds: &BoundingBox) -> Result<usize, SourceError> {
        Ok(0)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            kind: "strip".to_string(),
            resident_units: 1,
            capacity: 1,
            ready: true,
        }
    }
}

fn app_with(boundary: WorkerBoundary) -> Router {
    let state = Arc::new(AppState::new(boundary, Config::default()));
    api::routes().with_state(state)
}

async fn setup_app() -> (Router, WorkerBoundary) {
    let boundary = WorkerBoundary::new(WorkerConfig::default(), || {
        Ok(WaterClassifier::new(Box::new(Strip), 10_000))
    });
    boundary.initialize().await.expect("worker starts");
    (app_with(boundary.clone()), boundary)
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn open_water_route_is_direct() {
    let (app, boundary) = setup_app().await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/route",
            json!({ "startLat": 47.60, "startLon": -122.35, "endLat": 47.62, "endLon": -122.33 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["waypointCount"], 2);
    assert_eq!(body["crossesLand"], false);
    assert!(body["distance"].as_f64().unwrap() > 1.0);
    assert!(body.get("failureReason").is_none());
    assert_eq!(body["waypoints"][0]["lat"], 47.60);

    boundary.shutdown().await;
}

#[tokio::test]
async fn start_on_land_reports_reason_with_direct_line() {
    let (app, boundary) = setup_app().await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/route",
            json!({ "startLat": 0.0, "startLon": 0.0, "endLat": 0.0, "endLon": 0.5 }),
        ))
        .await
        .unwrap();
    let body = read_json(res).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["failureReason"], "StartOnLand");
    assert_eq!(body["waypointCount"], 2);
    assert_eq!(body["crossesLand"], true);

    boundary.shutdown().await;
}

#[tokio::test]
async fn out_of_range_coordinate_is_rejected() {
    let (app, boundary) = setup_app().await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/route",
            json!({ "startLat": 95.0, "startLon": 0.0, "endLat": 0.0, "endLon": 0.5 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = read_json(res).await;
    assert_eq!(body["error"], "Invalid coordinate");

    boundary.shutdown().await;
}

#[tokio::test]
async fn water_query_classifies_points() {
    let (app, boundary) = setup_app().await;

    let res = app.clone().oneshot(get("/v1/water?lat=10&lon=0")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["classification"], "land");
    assert_eq!(body["isWater"], false);

    let res = app.clone().oneshot(get("/v1/water?lat=10&lon=1")).await.unwrap();
    let body = read_json(res).await;
    assert_eq!(body["classification"], "ocean");
    assert_eq!(body["isWater"], true);

    boundary.shutdown().await;
}

#[tokio::test]
async fn preload_validates_bounds() {
    let (app, boundary) = setup_app().await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/water/preload",
            json!({ "minLat": 0.0, "minLon": 179.5, "maxLat": 1.0, "maxLon": -179.5 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/water/preload",
            json!({ "minLat": 47.0, "minLon": -123.0, "maxLat": 48.0, "maxLon": -122.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(read_json(res).await["loaded"], 0);

    boundary.shutdown().await;
}

#[tokio::test]
async fn worker_status_reports_ready_generation() {
    let (app, boundary) = setup_app().await;

    app.clone().oneshot(get("/v1/water?lat=10&lon=1")).await.unwrap();
    let res = app.clone().oneshot(get("/v1/worker")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["boundary"]["state"], "ready");
    assert_eq!(body["boundary"]["generation"], 1);
    assert_eq!(body["boundary"]["restarts"], 0);
    assert!(body["boundary"]["startedAt"].is_string());
    assert_eq!(body["worker"]["source"]["kind"], "strip");
    assert_eq!(body["worker"]["queries"], 1);

    boundary.shutdown().await;
}

#[tokio::test]
async fn uninitialized_worker_degrades() {
    let boundary = WorkerBoundary::new(WorkerConfig::default(), || {
        Ok(WaterClassifier::new(Box::new(Strip), 10_000))
    });
    let app = app_with(boundary);

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/route",
            json!({ "startLat": 47.60, "startLon": -122.35, "endLat": 47.62, "endLon": -122.33 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["failureReason"], "WorkerUnavailable");
    assert_eq!(body["waypointCount"], 2);

    let res = app.clone().oneshot(get("/v1/water?lat=10&lon=1")).await.unwrap();
    assert_eq!(read_json(res).await["isWater"], false);

    let res = app
        .clone()
        .oneshot(post_json(
            "/v1/water/preload",
            json!({ "minLat": 47.0, "minLon": -123.0, "maxLat": 48.0, "maxLon": -122.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}
