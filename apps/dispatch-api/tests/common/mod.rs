use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

use dispatch_api::auth::tokens;
use dispatch_api::bus::InMemoryBus;
use dispatch_api::config::Config;
use dispatch_api::db::trips::MemoryTrips;
use dispatch_api::db::users::{MemoryUsers, UserRepository};
use dispatch_api::gateway::dispatch::TripDispatcher;
use dispatch_api::models::user::{Role, User};
use dispatch_api::AppState;
use ridewire_common::id::PrefixedId;

pub const TEST_JWT_SECRET: &str = "test-secret-not-for-production";

/// Test state plus concrete handles for seeding and probing.
pub struct TestContext {
    pub state: AppState,
    pub bus: Arc<InMemoryBus>,
    pub users: Arc<MemoryUsers>,
    pub trips: Arc<MemoryTrips>,
}

/// Build an AppState on in-memory stores with a fixed test secret.
pub fn test_state() -> TestContext {
    let config = Config {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        port: 0,
        access_token_ttl_secs: 3600,
        refresh_token_ttl_secs: 30 * 24 * 3600,
    };
    let users = Arc::new(MemoryUsers::new());
    let trips = Arc::new(MemoryTrips::new());
    let bus = Arc::new(InMemoryBus::new());
    let dispatcher = TripDispatcher::new(users.clone(), trips.clone(), bus.clone());

    let state = AppState {
        config: Arc::new(config),
        users: users.clone(),
        trips: trips.clone(),
        bus: bus.clone(),
        dispatcher,
    };

    TestContext {
        state,
        bus,
        users,
        trips,
    }
}

/// Seed a user straight into the repository. The password hash is a dummy;
/// flows that exercise real passwords register through POST /api/v1/users.
pub async fn seed_user(users: &MemoryUsers, username: &str, role: Role) -> User {
    users
        .create(User {
            id: User::generate(),
            username: username.to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role,
            password_hash: "unused".to_string(),
            created_at: Utc::now(),
        })
        .await
        .expect("seed user")
}

/// Mint a valid access token for a seeded user.
pub fn access_token(user: &User) -> String {
    tokens::mint(user, tokens::TOKEN_USE_ACCESS, 3600, TEST_JWT_SECRET).expect("mint access token")
}

/// Mint a refresh token (never accepted by the gateway).
pub fn refresh_token(user: &User) -> String {
    tokens::mint(user, tokens::TOKEN_USE_REFRESH, 3600, TEST_JWT_SECRET)
        .expect("mint refresh token")
}

/// Start a real TCP server for WebSocket testing. The server runs in the
/// background for the life of the test.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = dispatch_api::routes::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Build an in-process test server for plain HTTP assertions.
pub fn test_server(state: AppState) -> axum_test::TestServer {
    let app = dispatch_api::routes::router().with_state(state);
    axum_test::TestServer::new(app).expect("test server")
}

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect to the gateway with a token in the query string.
pub async fn connect(addr: SocketAddr, token: &str) -> WsStream {
    let url = format!("ws://{addr}/gateway?token={token}");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws_stream
}

/// Attempt a gateway handshake, returning the raw result so tests can
/// assert on refused upgrades.
pub async fn try_connect(
    addr: SocketAddr,
    token: Option<&str>,
) -> Result<WsStream, tungstenite::Error> {
    let url = match token {
        Some(token) => format!("ws://{addr}/gateway?token={token}"),
        None => format!("ws://{addr}/gateway"),
    };
    tokio_tungstenite::connect_async(&url)
        .await
        .map(|(ws, _)| ws)
}

/// Send a JSON value as a text frame.
pub async fn send_json(ws: &mut WsStream, value: &serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Read the next text frame as JSON, failing after five seconds.
pub async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for frame")
        .expect("stream ended")
        .expect("ws read error");
    let text = msg.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse frame")
}

/// Assert nothing is delivered within a short window.
pub async fn assert_silent(ws: &mut WsStream) {
    let result = time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}
