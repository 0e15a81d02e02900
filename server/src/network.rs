//! HTTP and WebSocket surface.
//!
//! All realtime traffic flows over a single WebSocket endpoint at
//! `/ws`. Admin commands are additionally exposed as PIN-guarded HTTP
//! routes so dashboards and scripts can drive the game without holding
//! a socket open. `X-Admin-Pin` authenticates both surfaces.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use shared::{ClientMessage, Position, Role, ServerMessage, TeamPatch};
use tokio::sync::{mpsc, Mutex};

use crate::broadcast::{Audience, Broadcaster};
use crate::config::Config;
use crate::state::{CommandError, PositionSource, StateManager};
use crate::utils;

const ADMIN_PIN_HEADER: &str = "x-admin-pin";

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Mutex<StateManager>>,
    pub broadcaster: Broadcaster,
    pub config: Arc<Config>,
}

/// Failures surfaced to HTTP callers as JSON error bodies.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Command(CommandError),
}

impl From<CommandError> for ApiError {
    fn from(e: CommandError) -> Self {
        ApiError::Command(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "invalid admin PIN".to_string())
            }
            ApiError::Command(e) => {
                let status = match e {
                    CommandError::Validation(_) => StatusCode::BAD_REQUEST,
                    CommandError::UnknownIdentity(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::CONFLICT,
                };
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn require_admin_pin(headers: &HeaderMap, config: &Config) -> Result<(), ApiError> {
    let supplied = headers
        .get(ADMIN_PIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if supplied == config.admin_pin {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/state", get(get_state))
        .route("/api/game/start", post(start_game))
        .route("/api/game/stop", post(stop_game))
        .route("/api/game/reset", post(reset_game))
        .route("/api/teams/add", post(add_team))
        .route("/api/teams/update", post(update_team))
        .route("/api/teams/remove", post(remove_team))
        .route("/api/position", post(set_position))
        .route("/api/position/toggle", post(toggle_position))
        .route("/api/state/clear", post(clear_state))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.manager.lock().await.snapshot();
    Json(snapshot)
}

// --- admin HTTP commands ------------------------------------------------

async fn start_game(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    state.manager.lock().await.start_game();
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_game(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    state.manager.lock().await.stop_game();
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_game(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    state.manager.lock().await.reset_game();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AddTeamBody {
    name: String,
    color: String,
}

async fn add_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AddTeamBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    let id = state
        .manager
        .lock()
        .await
        .add_team(&body.name, &body.color)?;
    Ok(Json(json!({ "teamId": id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTeamBody {
    team_id: u32,
    updates: TeamPatch,
}

async fn update_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateTeamBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    state
        .manager
        .lock()
        .await
        .update_team(body.team_id, body.updates)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveTeamBody {
    team_id: u32,
}

async fn remove_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RemoveTeamBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    state.manager.lock().await.remove_team(body.team_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PositionBody {
    identity: String,
    position: Position,
}

async fn set_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PositionBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    state.manager.lock().await.update_position(
        &body.identity,
        body.position.lat,
        body.position.lon,
        PositionSource::Static,
        true,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ToggleBody {
    identity: String,
}

async fn toggle_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ToggleBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    state
        .manager
        .lock()
        .await
        .toggle_position_source(&body.identity)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_state(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    require_admin_pin(&headers, &state.config)?;
    state.manager.lock().await.clear_all();
    Ok(StatusCode::NO_CONTENT)
}

// --- WebSocket ----------------------------------------------------------

async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // The PIN is checked at upgrade time; the flag gates the admin
    // register path once the socket is up.
    let admin_ok = require_admin_pin(&headers, &state.config).is_ok();
    ws.on_upgrade(move |socket| handle_socket(socket, state, admin_ok))
}

async fn handle_socket(socket: WebSocket, state: AppState, admin_ok: bool) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = state.broadcaster.register(tx);

    // Outbound frames are funneled through the channel so broadcasts
    // never await a slow socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    state.broadcaster.send_to(conn_id, &ServerMessage::Connected);

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_frame(&state, conn_id, admin_ok, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Socket error on peer {}: {}", conn_id, e);
                break;
            }
        }
    }

    if let Some(session) = state.broadcaster.remove(conn_id) {
        if session.role == Some(Role::CapturePoint) {
            if let Some(identity) = session.identity {
                info!("Capture point {} disconnected", identity);
                state.manager.lock().await.release_connection(&identity);
                state.broadcaster.broadcast(
                    &ServerMessage::NodeDisconnect {
                        identity: identity.clone(),
                    },
                    Audience::AdminOnly,
                    None,
                );
                state.broadcaster.broadcast(
                    &ServerMessage::NodeLeft { identity },
                    Audience::All,
                    None,
                );
            }
        }
    }
    writer.abort();
}

async fn handle_frame(state: &AppState, conn_id: u64, admin_ok: bool, text: &str) {
    let message = match ClientMessage::from_frame(text) {
        Ok(message) => message,
        Err(e) => {
            // A garbled frame is logged but the connection survives.
            warn!("Malformed frame from peer {}: {}", conn_id, e);
            return;
        }
    };

    match message {
        ClientMessage::Register { identity, role } => {
            if role == Role::Admin && !admin_ok {
                warn!("Peer {} tried to register as admin without PIN", conn_id);
                return;
            }

            let outcome = match state.manager.lock().await.register_node(identity, role) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Registration failed for peer {}: {}", conn_id, e);
                    return;
                }
            };

            state
                .broadcaster
                .identify(conn_id, role, &outcome.identity, utils::now_ms());
            if outcome.newly_assigned {
                state.broadcaster.send_to(
                    conn_id,
                    &ServerMessage::IdentityAssigned {
                        identity: outcome.identity.clone(),
                    },
                );
            }
            state.broadcaster.send_to(
                conn_id,
                &ServerMessage::ServerState {
                    state: outcome.snapshot,
                },
            );
            state.broadcaster.broadcast(
                &ServerMessage::NodeJoined {
                    identity: outcome.identity,
                    role,
                },
                Audience::All,
                Some(conn_id),
            );
        }

        ClientMessage::CaptureEvent { identity, team_id } => {
            if let Err(e) = state
                .manager
                .lock()
                .await
                .handle_capture(&identity, Some(team_id))
            {
                warn!("Capture by {} rejected: {}", identity, e);
            }
        }

        ClientMessage::PositionUpdate { identity, position } => {
            let from_admin = state.broadcaster.is_admin_conn(conn_id);
            if let Err(e) = state.manager.lock().await.update_position(
                &identity,
                position.lat,
                position.lon,
                PositionSource::Gps,
                from_admin,
            ) {
                warn!("Position update for {} rejected: {}", identity, e);
            }
        }

        ClientMessage::Heartbeat => {
            let now = utils::now_ms();
            state.broadcaster.touch(conn_id, now);
            if let Some(identity) = state.broadcaster.identity_of(conn_id) {
                state.manager.lock().await.touch_identity(&identity);
            }
            state
                .broadcaster
                .send_to(conn_id, &ServerMessage::HeartbeatAck);
        }

        ClientMessage::ServerStateRequest => {
            let snapshot = state.manager.lock().await.snapshot();
            state
                .broadcaster
                .send_to(conn_id, &ServerMessage::ServerState { state: snapshot });
        }

        ClientMessage::StartGame
        | ClientMessage::StopGame
        | ClientMessage::ResetGame
        | ClientMessage::AddTeam { .. }
        | ClientMessage::UpdateTeam { .. }
        | ClientMessage::RemoveTeam { .. }
        | ClientMessage::SetStaticPosition { .. }
        | ClientMessage::TogglePositionSource { .. } => {
            if !state.broadcaster.is_admin_conn(conn_id) {
                warn!("Peer {} sent admin command without admin role", conn_id);
                return;
            }
            if let Err(e) = dispatch_admin(state, message).await {
                warn!("Admin command failed: {}", e);
            }
        }

        ClientMessage::Unrecognized => {
            warn!("Unrecognized message type from peer {}", conn_id);
        }
    }
}

async fn dispatch_admin(state: &AppState, message: ClientMessage) -> Result<(), CommandError> {
    let mut mgr = state.manager.lock().await;
    match message {
        ClientMessage::StartGame => mgr.start_game(),
        ClientMessage::StopGame => mgr.stop_game(),
        ClientMessage::ResetGame => mgr.reset_game(),
        ClientMessage::AddTeam { name, color } => {
            mgr.add_team(&name, &color)?;
        }
        ClientMessage::UpdateTeam { team_id, updates } => mgr.update_team(team_id, updates)?,
        ClientMessage::RemoveTeam { team_id } => mgr.remove_team(team_id)?,
        ClientMessage::SetStaticPosition { identity, position } => mgr.update_position(
            &identity,
            position.lat,
            position.lon,
            PositionSource::Static,
            true,
        )?,
        ClientMessage::TogglePositionSource { identity } => {
            mgr.toggle_position_source(&identity)?
        }
        _ => {}
    }
    Ok(())
}
