//! WebSocket upgrade handler and per-connection event loop.
//!
//! Authentication happens before the upgrade completes: a missing or bad
//! token refuses the handshake with a 401 and no session is created. Once
//! upgraded, the session multiplexes two event sources onto one loop, frames
//! arriving from the client and envelopes published to its groups.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::tokens;
use crate::bus::MAILBOX_CAPACITY;
use crate::error::ApiError;
use crate::models::trip::TripStatus;
use crate::models::user::{Role, UserSummary};
use crate::AppState;

use super::dispatch::DRIVER_POOL;
use super::envelope::{Envelope, TYPE_CREATE_TRIP, TYPE_ECHO, TYPE_UPDATE_TRIP};
use super::session::Session;

/// Close codes (4000-range for application-level).
const CLOSE_INTERNAL_ERROR: u16 = 4000;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

/// Query parameters accepted on the gateway handshake.
#[derive(Debug, Deserialize)]
struct ConnectParams {
    #[serde(default)]
    token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let token = params.token.as_deref().unwrap_or("");
    if token.is_empty() {
        return Err(ApiError::unauthorized("Missing token"));
    }

    let claims = tokens::verify_access(token, &state.config.jwt_secret)?;
    let user = state
        .users
        .get(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unknown subject"))?;
    let identity = user.summary();

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, identity)))
}

async fn handle_connection(socket: WebSocket, state: AppState, identity: UserSummary) {
    let (mut ws_tx, ws_rx) = socket.split();
    let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_CAPACITY);
    let mut session = Session::new(identity, mailbox_tx, state.bus.clone());

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.identity.id,
        role = session.identity.role.as_str(),
        "gateway session established"
    );

    if let Err(err) = join_initial_groups(&state, &mut session).await {
        tracing::error!(
            session_id = %session.session_id,
            code = %err.code,
            "failed to join initial groups"
        );
        let _ = send_close(&mut ws_tx, CLOSE_INTERNAL_ERROR, "Subscription setup failed").await;
        session.leave_all().await;
        return;
    }

    run_session(&state, &mut session, ws_tx, ws_rx, mailbox_rx).await;

    // Unwind every membership so no group keeps a dead delivery handle.
    session.leave_all().await;

    tracing::info!(
        session_id = %session.session_id,
        user_id = %session.identity.id,
        "gateway session ended"
    );
}

/// Baseline memberships for a fresh session: drivers join the driver pool,
/// and both parties rejoin the groups of trips they are already part of.
/// Completed trips receive no further updates and are skipped.
async fn join_initial_groups(state: &AppState, session: &mut Session) -> Result<(), ApiError> {
    if session.identity.role == Role::Driver {
        session.join(DRIVER_POOL).await;
    }
    for trip in state.trips.list_for_user(&session.identity.id).await? {
        if trip.status != TripStatus::Completed {
            session.join(&trip.id).await;
        }
    }
    Ok(())
}

/// Main session event loop: read client frames, forward group deliveries.
async fn run_session(
    state: &AppState,
    session: &mut Session,
    mut ws_tx: futures_util::stream::SplitSink<WebSocket, Message>,
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
    mut mailbox_rx: mpsc::Receiver<Arc<Envelope>>,
) {
    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let envelope: Envelope = match serde_json::from_str(&text) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                tracing::debug!(
                                    ?e,
                                    session_id = %session.session_id,
                                    "undecodable frame dropped"
                                );
                                continue;
                            }
                        };
                        if let Some(reply) = handle_envelope(state, session, envelope).await {
                            let json = serde_json::to_string(&reply).unwrap();
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id = %session.session_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Envelope published to one of this session's groups.
            delivery = mailbox_rx.recv() => {
                match delivery {
                    Some(envelope) => {
                        let json = serde_json::to_string(envelope.as_ref()).unwrap();
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

/// Route one inbound envelope. A returned envelope goes back to this
/// session only; everything else travels through the bus. Unrecognized
/// types are dropped without an error so newer clients keep working.
async fn handle_envelope(
    state: &AppState,
    session: &Session,
    envelope: Envelope,
) -> Option<Envelope> {
    match envelope.kind.as_str() {
        TYPE_ECHO => match envelope.groups.as_deref() {
            Some(groups) if !groups.is_empty() => {
                // Republish to each named group; the sender hears it back
                // only if it is subscribed like anyone else.
                let stripped = Envelope::new(TYPE_ECHO, envelope.data);
                for group in groups {
                    state.bus.publish(group, stripped.clone()).await;
                }
                None
            }
            _ => Some(Envelope::new(TYPE_ECHO, envelope.data)),
        },
        TYPE_CREATE_TRIP => {
            match state
                .dispatcher
                .create_trip(&session.identity, envelope.data)
                .await
            {
                Ok(reply) => Some(reply),
                Err(err) => Some(Envelope::error(&err)),
            }
        }
        TYPE_UPDATE_TRIP => {
            match state
                .dispatcher
                .update_trip(&session.identity, envelope.data)
                .await
            {
                Ok(()) => None,
                Err(err) => Some(Envelope::error(&err)),
            }
        }
        other => {
            tracing::debug!(
                session_id = %session.session_id,
                kind = other,
                "unsupported message type dropped"
            );
            None
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
