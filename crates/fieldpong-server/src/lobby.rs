use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use fieldpong_core::config::{MatchConfig, MatchMode};
use fieldpong_core::error::MatchError;
use fieldpong_core::matchmaker::{Matchmaker, MatchmakerStats, Pairing};
use fieldpong_core::net::messages::{GameResponseMsg, ResponseStatus, ServerMessage};
use fieldpong_core::net::protocol::encode_server_message;
use fieldpong_core::player::{PlayerId, PlayerIdentity};
use fieldpong_core::state::{EndReason, MatchId, MatchResult};
use fieldpong_core::time::epoch_millis;

use crate::game_loop::{GameBroadcast, GameCommand, spawn_match_session};
use crate::results::ResultSink;
use crate::state::SharedLobby;

/// Bounded per-player outbound channel. Sends use `try_send` so one slow
/// client never stalls a match.
pub type PlayerSender = mpsc::Sender<Bytes>;

type SharedSenders = Arc<Mutex<HashMap<PlayerId, PlayerSender>>>;

struct Connection {
    connection_id: u64,
    identity: PlayerIdentity,
    sender: PlayerSender,
}

struct MatchEntry {
    command_tx: mpsc::UnboundedSender<GameCommand>,
    /// Shared with the broadcast forwarder, so rejoining players are picked up
    /// without restarting it.
    senders: SharedSenders,
}

#[derive(Debug, Clone, Serialize)]
pub struct LobbyStats {
    #[serde(flatten)]
    pub matchmaker: MatchmakerStats,
    pub connected_players: usize,
}

/// Connected players, the matchmaker, and the running match sessions.
///
/// Shared as [`SharedLobby`]; every queue operation happens under its write lock.
pub struct Lobby {
    matchmaker: Matchmaker,
    connections: HashMap<PlayerId, Connection>,
    matches: HashMap<MatchId, MatchEntry>,
    match_config: Arc<MatchConfig>,
    results: Arc<dyn ResultSink>,
}

fn lock_senders(
    senders: &SharedSenders,
) -> std::sync::MutexGuard<'_, HashMap<PlayerId, PlayerSender>> {
    senders.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Lobby {
    pub fn new(match_config: Arc<MatchConfig>, results: Arc<dyn ResultSink>) -> Self {
        Self {
            matchmaker: Matchmaker::new(),
            connections: HashMap::new(),
            matches: HashMap::new(),
            match_config,
            results,
        }
    }

    /// Register a connection for `identity`, replacing any earlier one.
    pub fn connect(&mut self, identity: PlayerIdentity, connection_id: u64, sender: PlayerSender) {
        let player_id = identity.id;
        if let Some(old) = self.connections.get(&player_id) {
            tracing::info!(
                player_id,
                old_connection = old.connection_id,
                connection_id,
                "Replacing existing connection"
            );
        }

        // A live match keeps streaming to whichever connection is newest.
        if let Some(entry) = self.entry_of(player_id) {
            let mut senders = lock_senders(&entry.senders);
            if senders.contains_key(&player_id) {
                senders.insert(player_id, sender.clone());
            }
        }

        self.connections.insert(
            player_id,
            Connection {
                connection_id,
                identity,
                sender,
            },
        );
    }

    /// Drop a closed connection. Stale connection ids are ignored so a
    /// replaced connection cannot tear down its successor.
    pub fn disconnect(&mut self, player_id: PlayerId, connection_id: u64) {
        match self.connections.get(&player_id) {
            Some(conn) if conn.connection_id == connection_id => {
                self.connections.remove(&player_id);
            },
            _ => return,
        }

        if self.matchmaker.dequeue(player_id).is_ok() {
            tracing::debug!(player_id, "Removed from queue on disconnect");
        }

        if let Some(entry) = self.entry_of(player_id) {
            lock_senders(&entry.senders).remove(&player_id);
            if let Err(e) = entry
                .command_tx
                .send(GameCommand::Disconnected { player_id })
            {
                tracing::debug!(player_id, error = %e, "Match session gone");
            }
        }
    }

    /// Queue a player and start any match the queue can now form.
    pub fn join_queue(&mut self, player_id: PlayerId, queue_type: &str, lobby: SharedLobby) {
        match self.matchmaker.enqueue(player_id, queue_type, epoch_millis()) {
            Ok(()) => {
                self.send_response(player_id, GameResponseMsg::new(ResponseStatus::Queued));
                if let Some(mode) = MatchMode::from_queue_type(queue_type) {
                    self.pair_waiting(mode, lobby);
                }
            },
            Err(MatchError::AlreadyQueued(_)) => {
                self.send_response(player_id, GameResponseMsg::new(ResponseStatus::AlreadyQueued));
            },
            Err(e) => {
                self.send_response(
                    player_id,
                    GameResponseMsg::with_message(ResponseStatus::Rejected, e.to_string()),
                );
            },
        }
    }

    pub fn leave_queue(&mut self, player_id: PlayerId) {
        let status = match self.matchmaker.dequeue(player_id) {
            Ok(_) => ResponseStatus::LeftQueue,
            Err(_) => ResponseStatus::NotQueued,
        };
        self.send_response(player_id, GameResponseMsg::new(status));
    }

    fn pair_waiting(&mut self, mode: MatchMode, lobby: SharedLobby) {
        loop {
            match self.matchmaker.try_pair(mode) {
                Ok(Some(pairing)) => self.start_match(pairing, Arc::clone(&lobby)),
                Ok(None) => break,
                Err(MatchError::InvariantViolation {
                    player_id,
                    existing_match,
                }) => {
                    tracing::error!(
                        player_id,
                        existing_match = %existing_match,
                        "Player bound to two matches; ending the stale one"
                    );
                    self.abort_match(&existing_match);
                    if self.matchmaker.release(&existing_match).is_none() {
                        break;
                    }
                },
                Err(e) => {
                    tracing::error!(queue = mode.as_str(), error = %e, "Pairing failed");
                    break;
                },
            }
        }
    }

    fn start_match(&mut self, pairing: Pairing, lobby: SharedLobby) {
        let match_id = pairing.match_id.clone();
        let players = [pairing.left, pairing.right];
        let names = players.map(|pid| self.display_name(pid));

        let game = pairing.into_match(&self.match_config);
        let (command_tx, broadcast_rx, _game_task) =
            spawn_match_session(game, self.match_config.as_ref().clone(), names);

        let senders: SharedSenders = Arc::new(Mutex::new(
            players
                .iter()
                .filter_map(|pid| Some((*pid, self.connections.get(pid)?.sender.clone())))
                .collect(),
        ));

        let shared_senders = Arc::clone(&senders);
        let results = Arc::clone(&self.results);
        let match_id_owned = match_id.clone();
        tokio::spawn(async move {
            if let Some(result) =
                forward_broadcasts(broadcast_rx, shared_senders, &match_id_owned).await
            {
                results.record(result);
            }
            lobby.write().await.end_match(&match_id_owned);
        });

        self.matches.insert(
            match_id,
            MatchEntry {
                command_tx,
                senders,
            },
        );
    }

    fn display_name(&self, player_id: PlayerId) -> String {
        self.connections
            .get(&player_id)
            .map(|c| c.identity.display_name.clone())
            .unwrap_or_else(|| format!("Player {player_id}"))
    }

    fn entry_of(&self, player_id: PlayerId) -> Option<&MatchEntry> {
        let match_id = self.matchmaker.match_of(player_id)?;
        self.matches.get(match_id)
    }

    /// Route a paddle target to the player's match.
    pub fn route_move(&self, player_id: PlayerId, y: f32) {
        self.route(player_id, GameCommand::PlayerMove { player_id, y });
    }

    pub fn lobby_ready(&self, player_id: PlayerId) {
        self.route(player_id, GameCommand::LobbyReady { player_id });
    }

    fn route(&self, player_id: PlayerId, cmd: GameCommand) {
        let Some(entry) = self.entry_of(player_id) else {
            self.send_response(
                player_id,
                GameResponseMsg::with_message(ResponseStatus::Rejected, "not in a match"),
            );
            return;
        };
        if let Err(e) = entry.command_tx.send(cmd) {
            tracing::debug!(player_id, error = %e, "Match session gone");
        }
    }

    /// Reattach a player's current connection to `match_id`.
    pub fn rejoin(&self, player_id: PlayerId, match_id: &str) {
        let entry = self
            .matchmaker
            .match_of(player_id)
            .filter(|current| current.as_str() == match_id)
            .and_then(|current| self.matches.get(current));
        let (Some(entry), Some(conn)) = (entry, self.connections.get(&player_id)) else {
            self.send_response(player_id, GameResponseMsg::new(ResponseStatus::NoLongerActive));
            return;
        };

        lock_senders(&entry.senders).insert(player_id, conn.sender.clone());
        if entry
            .command_tx
            .send(GameCommand::Reconnected { player_id })
            .is_err()
        {
            lock_senders(&entry.senders).remove(&player_id);
            self.send_response(player_id, GameResponseMsg::new(ResponseStatus::NoLongerActive));
        }
    }

    /// Ask a match to end with `InternalError`. Cleanup follows through the
    /// forwarder like any other ending.
    fn abort_match(&self, match_id: &str) {
        if let Some(entry) = self.matches.get(match_id)
            && let Err(e) = entry.command_tx.send(GameCommand::ForceEnd {
                reason: EndReason::InternalError,
            })
        {
            tracing::debug!(match_id, error = %e, "Match session already stopped");
        }
    }

    /// Forget a finished match and free its players for the queues.
    pub fn end_match(&mut self, match_id: &str) {
        if let Some(entry) = self.matches.remove(match_id)
            && let Err(e) = entry.command_tx.send(GameCommand::Stop)
        {
            tracing::debug!(match_id, error = %e, "Match session already stopped");
        }
        if let Some(players) = self.matchmaker.release(match_id) {
            tracing::info!(match_id, ?players, "Match released");
        }
    }

    pub fn stats(&self) -> LobbyStats {
        LobbyStats {
            matchmaker: self.matchmaker.stats(),
            connected_players: self.connections.len(),
        }
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Send a raw binary message to a specific player.
    pub fn send_to_player(&self, player_id: PlayerId, data: Bytes) {
        if let Some(conn) = self.connections.get(&player_id)
            && let Err(e) = conn.sender.try_send(data)
        {
            tracing::debug!(
                player_id, error = %e,
                "Failed to send to player (slow or disconnected)"
            );
        }
    }

    pub fn send_response(&self, player_id: PlayerId, response: GameResponseMsg) {
        match encode_server_message(&ServerMessage::GameResponse(response)) {
            Ok(data) => self.send_to_player(player_id, Bytes::from(data)),
            Err(e) => tracing::error!(player_id, error = %e, "Failed to encode GameResponse"),
        }
    }
}

/// Forward a match's broadcasts to its players until the session ends.
/// Returns the match result, if the match reached an end.
async fn forward_broadcasts(
    mut broadcast_rx: mpsc::UnboundedReceiver<GameBroadcast>,
    senders: SharedSenders,
    match_id: &str,
) -> Option<MatchResult> {
    while let Some(broadcast) = broadcast_rx.recv().await {
        match broadcast {
            GameBroadcast::ToAll(data) => {
                let snapshot = lock_senders(&senders).clone();
                for (&player_id, sender) in &snapshot {
                    if sender.try_send(data.clone()).is_err() {
                        tracing::debug!(
                            player_id,
                            match_id,
                            "Skipping broadcast to slow client (channel full or closed)"
                        );
                    }
                }
            },
            GameBroadcast::ToPlayer(player_id, data) => {
                let sender = lock_senders(&senders).get(&player_id).cloned();
                if let Some(sender) = sender
                    && sender.try_send(data).is_err()
                {
                    tracing::debug!(player_id, match_id, "Dropped message to slow client");
                }
            },
            GameBroadcast::GameEnded(result) => {
                tracing::info!(match_id, ended = result.is_some(), "Match session ended");
                return result;
            },
        }
    }
    None
}
