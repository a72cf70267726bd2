use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::sync::{CatalogStore, TrackerStore};

#[derive(Clone)]
pub struct HealthState {
    pub catalog: CatalogStore,
    pub tracker: TrackerStore,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub catalog_loaded: bool,
    pub routes: usize,
    pub trips: usize,
    pub stops: usize,
    pub active_vehicles: usize,
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health and catalog counters", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    let catalog = state.catalog.read().await;
    let tracker = state.tracker.read().await;
    let (routes, trips, stops) = catalog
        .as_ref()
        .map(|c| (c.routes.len(), c.trips.len(), c.stops.len()))
        .unwrap_or((0, 0, 0));
    Json(HealthResponse {
        status: if catalog.is_some() { "ok" } else { "starting" }.to_string(),
        catalog_loaded: catalog.is_some(),
        routes,
        trips,
        stops,
        active_vehicles: tracker.len(),
    })
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/", get(health)).with_state(state)
}
