pub mod health;
pub mod vehicles;
pub mod ws;

use axum::Router;

pub fn router(
    health_state: health::HealthState,
    vehicles_state: vehicles::VehiclesState,
    ws_state: ws::WsState,
) -> Router {
    Router::new()
        .nest("/api/health", health::router(health_state))
        .nest("/api/vehicles", vehicles::router(vehicles_state))
        .nest("/api/ws", ws::router(ws_state))
}
