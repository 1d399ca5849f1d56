use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dispatch_api::bus::{GroupBus, InMemoryBus};
use dispatch_api::config::Config;
use dispatch_api::db::trips::{MemoryTrips, TripRepository};
use dispatch_api::db::users::{MemoryUsers, UserRepository};
use dispatch_api::gateway::dispatch::TripDispatcher;
use dispatch_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env, falling back to the crate-local file when run from the
    // workspace root.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // In-memory stores. A database-backed implementation plugs in behind the
    // same traits.
    let users: Arc<dyn UserRepository> = Arc::new(MemoryUsers::new());
    let trips: Arc<dyn TripRepository> = Arc::new(MemoryTrips::new());
    let bus: Arc<dyn GroupBus> = Arc::new(InMemoryBus::new());
    let dispatcher = TripDispatcher::new(users.clone(), trips.clone(), bus.clone());

    tracing::info!(port, "dispatch-api configured");

    let state = AppState {
        config: Arc::new(config),
        users,
        trips,
        bus,
        dispatcher,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(dispatch_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "dispatch-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
