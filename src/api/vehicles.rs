use std::collections::HashMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::providers::gtfs::ReferenceCatalog;
use crate::sync::{CatalogStore, TrackerStore};
use crate::tracker::motion::{LatLon, PositionTween};

#[derive(Clone)]
pub struct VehiclesState {
    pub tracker: TrackerStore,
    pub catalog: CatalogStore,
    /// Also the tween duration for position estimates.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VehicleSnapshot {
    pub trip_id: String,
    pub route: String,
    pub destination: String,
    pub platform: String,
    pub delay_seconds: i32,
    /// Delay rounded to whole minutes, negative when running early.
    pub delay_minutes: i64,
    pub current_stop_id: Option<String>,
    pub current_stop: String,
    pub position: LatLon,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VehicleListResponse {
    pub vehicles: Vec<VehicleSnapshot>,
    pub count: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EstimatedPosition {
    pub position: LatLon,
    /// False when the vehicle snapped, no previous fix to animate from.
    pub interpolating: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PositionEstimatesResponse {
    pub vehicles: HashMap<String, EstimatedPosition>,
    pub timestamp: String,
}

fn delay_minutes(delay_seconds: i32) -> i64 {
    (f64::from(delay_seconds) / 60.0).round() as i64
}

fn stop_display(catalog: Option<&ReferenceCatalog>, stop_id: Option<&str>) -> String {
    match stop_id {
        None => "in transit".to_string(),
        Some(id) => catalog
            .and_then(|c| c.stops.get(id))
            .cloned()
            .unwrap_or_else(|| format!("stop {id} (name not found)")),
    }
}

#[utoipa::path(
    get,
    path = "/api/vehicles",
    responses(
        (status = 200, description = "All tracked vehicles", body = VehicleListResponse)
    ),
    tag = "vehicles"
)]
pub async fn list_vehicles(State(state): State<VehiclesState>) -> Json<VehicleListResponse> {
    let catalog = state.catalog.read().await;
    let tracker = state.tracker.read().await;
    let mut vehicles: Vec<VehicleSnapshot> = tracker
        .vehicles()
        .values()
        .map(|record| VehicleSnapshot {
            trip_id: record.trip_id.clone(),
            route: record.route.clone(),
            destination: record.destination.clone(),
            platform: record.platform.clone(),
            delay_seconds: record.delay_seconds,
            delay_minutes: delay_minutes(record.delay_seconds),
            current_stop_id: record.current_stop_id.clone(),
            current_stop: stop_display(catalog.as_ref(), record.current_stop_id.as_deref()),
            position: record.position,
            updated_at: record.updated_at.to_rfc3339(),
        })
        .collect();
    vehicles.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));
    Json(VehicleListResponse {
        count: vehicles.len(),
        vehicles,
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[utoipa::path(
    get,
    path = "/api/vehicles/position_estimates",
    responses(
        (status = 200, description = "Interpolated positions keyed by trip id", body = PositionEstimatesResponse)
    ),
    tag = "vehicles"
)]
pub async fn position_estimates(
    State(state): State<VehiclesState>,
) -> Json<PositionEstimatesResponse> {
    let now = Utc::now();
    let tracker = state.tracker.read().await;
    let vehicles = tracker
        .vehicles()
        .values()
        .map(|record| {
            let elapsed_ms = (now - record.updated_at).num_milliseconds().max(0) as u64;
            let tween = PositionTween::new(
                record.previous_position,
                record.position,
                state.poll_interval_ms,
            );
            (
                record.trip_id.clone(),
                EstimatedPosition {
                    position: tween.sample(elapsed_ms),
                    interpolating: !tween.is_snap(),
                },
            )
        })
        .collect();
    Json(PositionEstimatesResponse {
        vehicles,
        timestamp: now.to_rfc3339(),
    })
}

pub fn router(state: VehiclesState) -> Router {
    Router::new()
        .route("/", get(list_vehicles))
        .route("/position_estimates", get(position_estimates))
        .with_state(state)
}
