mod api;
mod config;
mod providers;
mod sync;
mod tracker;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use tracker::render::BroadcastRenderer;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health,
        api::vehicles::list_vehicles,
        api::vehicles::position_estimates,
    ),
    components(schemas(
        api::health::HealthResponse,
        api::vehicles::VehicleListResponse,
        api::vehicles::VehicleSnapshot,
        api::vehicles::PositionEstimatesResponse,
        api::vehicles::EstimatedPosition,
        tracker::motion::LatLon,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "vehicles", description = "Tracked vehicles and position estimates")
    )
)]
struct ApiDoc;

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_permissive {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse()
                .unwrap_or_else(|_| panic!("invalid CORS origin: {origin}"))
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "railtrace=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        std::env::var("RAILTRACE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path).expect("Failed to load config");
    config.validate().expect("Invalid config");
    info!(region = %config.region.name, "Starting railtrace");

    let renderer = BroadcastRenderer::new();
    let manager = sync::SyncManager::new(config.clone(), renderer.clone())
        .expect("Failed to build sync manager");
    // a missing catalog is fatal, polling never starts without it
    let manager = sync::spawn(manager)
        .await
        .expect("Failed to load reference catalog");

    let health_state = api::health::HealthState {
        catalog: manager.catalog_store(),
        tracker: manager.tracker_store(),
    };
    let vehicles_state = api::vehicles::VehiclesState {
        tracker: manager.tracker_store(),
        catalog: manager.catalog_store(),
        poll_interval_ms: config.feeds.poll_interval_ms,
    };
    let ws_state = api::ws::WsState {
        renderer,
        tracker: manager.tracker_store(),
    };

    let app = Router::new()
        .merge(api::router(health_state, vehicles_state, ws_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|err| panic!("Failed to bind {}: {err}", config.bind_addr));
    info!(addr = %config.bind_addr, "Listening");
    axum::serve(listener, app).await.expect("Server error");
}
