use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{FromRequest, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use fieldpong_core::net::messages::{ClientMessage, GameResponseMsg, ResponseStatus};
use fieldpong_core::net::protocol::{
    MAX_MESSAGE_SIZE, check_protocol_version, decode_client_message, decode_message_type,
};
use fieldpong_core::player::{PlayerId, PlayerIdentity};

use crate::identity::ConnectionHandle;
use crate::state::{AppState, ConnectionGuard};

pub async fn ws_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    // Identity is settled before the upgrade
    let params = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .unwrap_or_default();
    let handle = ConnectionHandle {
        connection_id: state.allocate_connection_id(),
        params,
    };
    let Some(identity) = state.identity.resolve(&handle) else {
        tracing::debug!(connection_id = handle.connection_id, "Unidentified connection refused");
        return Err(StatusCode::UNAUTHORIZED);
    };

    // Perform WebSocket upgrade manually
    let ws = WebSocketUpgrade::from_request(request, &state)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let connection_id = handle.connection_id;
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, identity, connection_id))
        .into_response())
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    identity: PlayerIdentity,
    connection_id: u64,
) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (ws_sender, mut ws_receiver) = socket.split();
    let player_id = identity.id;

    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    state.lobby.write().await.connect(identity, connection_id, tx);
    tracing::info!(player_id, connection_id, "Player connected");

    spawn_writer(ws_sender, rx);

    read_loop(&mut ws_receiver, &state, player_id).await;

    // Connection closed: leave the queue and pause any running match
    state.lobby.write().await.disconnect(player_id, connection_id);
    tracing::info!(player_id, connection_id, "Player disconnected");
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    });
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: tokio::time::Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the message is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    player_id: PlayerId,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        // Rate limit: drop messages that exceed per-connection rate
        if !rate_limiter.allow() {
            tracing::warn!(player_id, "Rate limited");
            continue;
        }

        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        let msg_type = match decode_message_type(&data) {
            Ok(t) => t,
            Err(_) => continue,
        };

        // Server-authoritative: state, lifecycle and responses only flow outward.
        if !msg_type.is_client_message() {
            tracing::warn!(player_id, ?msg_type, "Rejected server-only message from client");
            continue;
        }

        let client_msg = match decode_client_message(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(player_id, ?msg_type, error = %e, "Malformed client message");
                continue;
            },
        };

        let declared_version = match &client_msg {
            ClientMessage::JoinQueue(join) => Some(join.protocol_version),
            ClientMessage::Rejoin(rejoin) => Some(rejoin.protocol_version),
            _ => None,
        };
        if let Some(version) = declared_version
            && let Err(e) = check_protocol_version(version)
        {
            tracing::warn!(player_id, version, "Protocol version mismatch");
            state.lobby.read().await.send_response(
                player_id,
                GameResponseMsg::with_message(ResponseStatus::Rejected, e.to_string()),
            );
            continue;
        }

        match client_msg {
            ClientMessage::PlayerMove(mv) => {
                state.lobby.read().await.route_move(player_id, mv.y);
            },
            ClientMessage::JoinQueue(join) => {
                let mut lobby = state.lobby.write().await;
                lobby.join_queue(player_id, &join.queue_type, Arc::clone(&state.lobby));
            },
            ClientMessage::LeaveQueue(_) => {
                state.lobby.write().await.leave_queue(player_id);
            },
            ClientMessage::LobbyReady(_) => {
                state.lobby.read().await.lobby_ready(player_id);
            },
            ClientMessage::Rejoin(rejoin) => {
                state.lobby.read().await.rejoin(player_id, &rejoin.match_id);
            },
        }
    }
}
