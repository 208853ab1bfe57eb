use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use fieldpong_core::config::MatchConfig;
use fieldpong_core::error::MatchError;
use fieldpong_core::fsm::ReconnectOutcome;
use fieldpong_core::net::messages::{
    GameEndMsg, GamePauseMsg, GameResponseMsg, GameStartMsg, LobbyStartMsg, ResponseStatus,
    ServerMessage,
};
use fieldpong_core::net::protocol::encode_server_message;
use fieldpong_core::player::{PlayerId, Side};
use fieldpong_core::simulation;
use fieldpong_core::state::{EndReason, Match, MatchEvent, MatchPhase, MatchResult};
use fieldpong_core::time::epoch_millis;

/// Commands sent from the WebSocket handlers to a match tick loop.
#[derive(Debug)]
pub enum GameCommand {
    PlayerMove { player_id: PlayerId, y: f32 },
    LobbyReady { player_id: PlayerId },
    Disconnected { player_id: PlayerId },
    Reconnected { player_id: PlayerId },
    ForceEnd { reason: EndReason },
    Stop,
}

/// Output of a match tick loop, fanned out to the players' connections.
#[derive(Debug, Clone)]
pub enum GameBroadcast {
    /// Serialized ServerMessage bytes for both players.
    /// Uses `Bytes` for zero-copy cloning across player channels.
    ToAll(Bytes),
    ToPlayer(PlayerId, Bytes),
    /// The loop has exited. Carries the result if the match reached an end.
    GameEnded(Option<MatchResult>),
}

/// Spawn a match tick loop as a tokio task.
/// Returns the command sender and broadcast receiver.
pub fn spawn_match_session(
    game: Match,
    config: MatchConfig,
    names: [String; 2],
) -> (
    mpsc::UnboundedSender<GameCommand>,
    mpsc::UnboundedReceiver<GameBroadcast>,
    JoinHandle<()>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        run_match_tick_loop(game, config, names, cmd_rx, broadcast_tx).await;
    });

    (cmd_tx, broadcast_rx, handle)
}

/// The server-authoritative tick loop for one match. Owns the match exclusively.
async fn run_match_tick_loop(
    mut game: Match,
    config: MatchConfig,
    names: [String; 2],
    mut cmd_rx: mpsc::UnboundedReceiver<GameCommand>,
    broadcast_tx: mpsc::UnboundedSender<GameBroadcast>,
) {
    let [player1, player2] = names;
    send_all(
        &broadcast_tx,
        &ServerMessage::LobbyStart(LobbyStartMsg { player1, player2 }),
    );

    if config.immediate_start
        && let Err(e) = game.begin()
    {
        tracing::error!(match_id = %game.id, error = %e, "Failed to start match");
    }
    let events = game.drain_events();
    if let Some(result) = dispatch_events(&game, events, &broadcast_tx) {
        let _ = broadcast_tx.send(GameBroadcast::GameEnded(Some(result)));
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Skipped ticks must not stretch the grace window past real time.
                game.expire_pause(epoch_millis(), config.pause_grace_ms);
                let events = simulation::step(&mut game, &config);
                if let Some(result) = dispatch_events(&game, events, &broadcast_tx) {
                    let _ = broadcast_tx.send(GameBroadcast::GameEnded(Some(result)));
                    break;
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(GameCommand::Stop) | None => {
                        let _ = broadcast_tx.send(GameBroadcast::GameEnded(game.result()));
                        break;
                    },
                    Some(cmd) => {
                        let resync = apply_command(&mut game, cmd, &config, &broadcast_tx);
                        let events = game.drain_events();
                        if let Some(result) = dispatch_events(&game, events, &broadcast_tx) {
                            let _ = broadcast_tx.send(GameBroadcast::GameEnded(Some(result)));
                            break;
                        }
                        if let Some(side) = resync {
                            resync_player(&game, side, &broadcast_tx);
                        }
                    },
                }
            }
        }
    }

    tracing::debug!(match_id = %game.id, tick = game.tick, "Match loop exited");
}

/// Apply one command to the match. Returns the side of a rejoining player
/// whose connection needs to be brought up to date.
fn apply_command(
    game: &mut Match,
    cmd: GameCommand,
    config: &MatchConfig,
    broadcast_tx: &mpsc::UnboundedSender<GameBroadcast>,
) -> Option<Side> {
    match cmd {
        GameCommand::PlayerMove { player_id, y } => {
            let Some(side) = game.side_of(player_id) else {
                tracing::debug!(match_id = %game.id, player_id, "Move from non-participant");
                return None;
            };
            if let Err(e) = game.submit_move(side, y) {
                reject(broadcast_tx, player_id, &e);
            }
            None
        },
        GameCommand::LobbyReady { player_id } => {
            let side = game.side_of(player_id)?;
            if let Err(e) = game.acknowledge_lobby(side) {
                reject(broadcast_tx, player_id, &e);
            }
            None
        },
        GameCommand::Disconnected { player_id } => {
            if let Some(side) = game.side_of(player_id) {
                game.disconnect(side, epoch_millis());
            }
            None
        },
        GameCommand::Reconnected { player_id } => {
            let side = game.side_of(player_id)?;
            game.expire_pause(epoch_millis(), config.pause_grace_ms);
            let outcome = game.reconnect(side, config.pause_grace_ticks());
            tracing::info!(match_id = %game.id, player_id, ?outcome, "Player rejoined");
            let reply = match outcome {
                // Announced to both players by the Resumed event.
                ReconnectOutcome::Resumed => None,
                ReconnectOutcome::StillPaused => Some(GameResponseMsg::with_message(
                    ResponseStatus::MatchPaused,
                    "waiting for opponent",
                )),
                ReconnectOutcome::AlreadyConnected => Some(GameResponseMsg::with_message(
                    ResponseStatus::Resumed,
                    "already connected",
                )),
                ReconnectOutcome::NoLongerActive => {
                    Some(GameResponseMsg::new(ResponseStatus::NoLongerActive))
                },
            };
            if let Some(reply) = reply {
                send_to(broadcast_tx, player_id, &ServerMessage::GameResponse(reply));
            }
            (outcome != ReconnectOutcome::NoLongerActive).then_some(side)
        },
        GameCommand::ForceEnd { reason } => {
            game.force_end(reason);
            None
        },
        GameCommand::Stop => None,
    }
}

/// Bring a returning connection up to date with the match it rejoined.
fn resync_player(game: &Match, side: Side, broadcast_tx: &mpsc::UnboundedSender<GameBroadcast>) {
    let player_id = game.player(side);
    if game.phase == MatchPhase::Lobby {
        return;
    }
    send_to(
        broadcast_tx,
        player_id,
        &ServerMessage::GameStart(GameStartMsg {
            side,
            match_type: game.queue_type.clone(),
            match_id: game.id.clone(),
        }),
    );
    send_to(
        broadcast_tx,
        player_id,
        &ServerMessage::FieldEffect(game.effect.current().to_msg()),
    );
    if let Some(pause) = game.pause_state() {
        send_to(
            broadcast_tx,
            player_id,
            &ServerMessage::GamePause(GamePauseMsg {
                paused_at_epoch_millis: pause.paused_at_epoch_ms,
            }),
        );
    }
}

fn reject(broadcast_tx: &mpsc::UnboundedSender<GameBroadcast>, player_id: PlayerId, e: &MatchError) {
    let status = match e {
        MatchError::IllegalTransition {
            phase: MatchPhase::Paused,
            ..
        } => ResponseStatus::MatchPaused,
        _ => ResponseStatus::Rejected,
    };
    tracing::debug!(player_id, error = %e, "Command rejected");
    send_to(
        broadcast_tx,
        player_id,
        &ServerMessage::GameResponse(GameResponseMsg::with_message(status, e.to_string())),
    );
}

/// Translate match events into wire messages. Returns the result once the
/// match has ended.
fn dispatch_events(
    game: &Match,
    events: Vec<MatchEvent>,
    broadcast_tx: &mpsc::UnboundedSender<GameBroadcast>,
) -> Option<MatchResult> {
    let mut ended = None;
    for event in events {
        match event {
            MatchEvent::Started => {
                for side in Side::BOTH {
                    send_to(
                        broadcast_tx,
                        game.player(side),
                        &ServerMessage::GameStart(GameStartMsg {
                            side,
                            match_type: game.queue_type.clone(),
                            match_id: game.id.clone(),
                        }),
                    );
                }
            },
            MatchEvent::Snapshot(state) => {
                send_all(broadcast_tx, &ServerMessage::GameState(state));
            },
            MatchEvent::EffectChanged(effect) => {
                tracing::debug!(match_id = %game.id, kind = ?effect.kind(), "Field effect changed");
                send_all(broadcast_tx, &ServerMessage::FieldEffect(effect.to_msg()));
            },
            MatchEvent::Scored { side, score } => {
                tracing::debug!(
                    match_id = %game.id,
                    ?side,
                    player1 = score.player1,
                    player2 = score.player2,
                    "Point scored"
                );
            },
            MatchEvent::Paused { at_epoch_ms, .. } => {
                send_all(
                    broadcast_tx,
                    &ServerMessage::GamePause(GamePauseMsg {
                        paused_at_epoch_millis: at_epoch_ms,
                    }),
                );
            },
            MatchEvent::Resumed => {
                send_all(
                    broadcast_tx,
                    &ServerMessage::GameResponse(GameResponseMsg::new(ResponseStatus::Resumed)),
                );
            },
            MatchEvent::Ended(result) => {
                send_all(
                    broadcast_tx,
                    &ServerMessage::GameEnd(GameEndMsg {
                        winner: result.winner,
                        reason: result.reason,
                        final_score: result.final_score,
                    }),
                );
                ended = Some(result);
            },
        }
    }
    ended
}

fn send_all(broadcast_tx: &mpsc::UnboundedSender<GameBroadcast>, msg: &ServerMessage) {
    match encode_server_message(msg) {
        Ok(data) => {
            let _ = broadcast_tx.send(GameBroadcast::ToAll(Bytes::from(data)));
        },
        Err(e) => tracing::error!(msg_type = ?msg.message_type(), error = %e, "Failed to encode"),
    }
}

fn send_to(
    broadcast_tx: &mpsc::UnboundedSender<GameBroadcast>,
    player_id: PlayerId,
    msg: &ServerMessage,
) {
    match encode_server_message(msg) {
        Ok(data) => {
            let _ = broadcast_tx.send(GameBroadcast::ToPlayer(player_id, Bytes::from(data)));
        },
        Err(e) => tracing::error!(
            player_id, msg_type = ?msg.message_type(), error = %e, "Failed to encode"
        ),
    }
}
