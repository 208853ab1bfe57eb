//! Phase transitions and command admission for a [`Match`].
//!
//! Every method here either performs a legal transition and queues the
//! resulting [`MatchEvent`]s on the match, or returns an error and leaves the
//! match untouched.

use crate::error::MatchError;
use crate::player::Side;
use crate::state::{EndReason, Match, MatchEvent, MatchPhase, PauseState};

/// What happened when a player came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The last missing player returned and play continues.
    Resumed,
    /// This player is back but the opponent is still missing.
    StillPaused,
    /// The player was never marked disconnected.
    AlreadyConnected,
    /// The match has ended; there is nothing to rejoin.
    NoLongerActive,
}

impl Match {
    /// Record a lobby acknowledgement. Play starts once both sides have acknowledged.
    pub fn acknowledge_lobby(&mut self, side: Side) -> Result<(), MatchError> {
        if self.phase != MatchPhase::Lobby {
            return Err(MatchError::IllegalTransition {
                phase: self.phase,
                command: "lobby ready",
            });
        }
        self.lobby_acks[side.index()] = true;
        if self.lobby_acks.iter().all(|ack| *ack) {
            self.start_play();
        }
        Ok(())
    }

    /// Skip the handshake and start immediately.
    pub fn begin(&mut self) -> Result<(), MatchError> {
        if self.phase != MatchPhase::Lobby {
            return Err(MatchError::IllegalTransition {
                phase: self.phase,
                command: "begin",
            });
        }
        self.start_play();
        Ok(())
    }

    fn start_play(&mut self) {
        self.phase = MatchPhase::Playing;
        tracing::info!(match_id = %self.id, queue = %self.queue_type, "Match started");
        self.emit(MatchEvent::Started);
        let current = self.effect.current();
        self.emit(MatchEvent::EffectChanged(current));
    }

    /// Set the paddle target for `side`. Last write wins; the paddle keeps
    /// travelling toward it on every playing tick until it arrives.
    pub fn submit_move(&mut self, side: Side, y: f32) -> Result<(), MatchError> {
        if self.phase != MatchPhase::Playing {
            return Err(MatchError::IllegalTransition {
                phase: self.phase,
                command: "player move",
            });
        }
        if !y.is_finite() {
            return Err(MatchError::InvalidCommand(format!(
                "paddle target must be finite, got {y}"
            )));
        }
        self.paddle_targets[side.index()] = Some(y);
        Ok(())
    }

    /// Transport reported that `side` went away.
    pub fn disconnect(&mut self, side: Side, now_epoch_ms: u64) {
        match self.phase {
            MatchPhase::Playing => {
                self.connected[side.index()] = false;
                self.paddle_targets = [None, None];
                self.pause = Some(PauseState {
                    paused_at_tick: self.tick,
                    paused_at_epoch_ms: now_epoch_ms,
                });
                self.phase = MatchPhase::Paused;
                tracing::info!(match_id = %self.id, ?side, tick = self.tick, "Match paused");
                self.emit(MatchEvent::Paused {
                    side,
                    at_epoch_ms: now_epoch_ms,
                });
            },
            MatchPhase::Paused => {
                self.connected[side.index()] = false;
            },
            MatchPhase::Queued | MatchPhase::Lobby => {
                // Nobody has played yet, so there is no one to award the match to.
                self.connected[side.index()] = false;
                self.end(EndReason::Abandon, None);
            },
            MatchPhase::Ended { .. } => {},
        }
    }

    /// A disconnected player is back. `grace_ticks` bounds how long after the
    /// pause this is still accepted.
    pub fn reconnect(&mut self, side: Side, grace_ticks: u64) -> ReconnectOutcome {
        if self.phase == MatchPhase::Paused {
            self.check_pause_timeout(grace_ticks);
        }
        match self.phase {
            MatchPhase::Ended { .. } => ReconnectOutcome::NoLongerActive,
            MatchPhase::Paused => {
                if self.connected[side.index()] {
                    return ReconnectOutcome::AlreadyConnected;
                }
                self.connected[side.index()] = true;
                if self.connected.iter().all(|c| *c) {
                    self.pause = None;
                    self.phase = MatchPhase::Playing;
                    tracing::info!(match_id = %self.id, ?side, tick = self.tick, "Match resumed");
                    self.emit(MatchEvent::Resumed);
                    ReconnectOutcome::Resumed
                } else {
                    ReconnectOutcome::StillPaused
                }
            },
            MatchPhase::Queued | MatchPhase::Lobby | MatchPhase::Playing => {
                ReconnectOutcome::AlreadyConnected
            },
        }
    }

    /// End a paused match whose grace window has elapsed. Fires at most once.
    pub(crate) fn check_pause_timeout(&mut self, grace_ticks: u64) {
        let Some(pause) = self.pause else {
            return;
        };
        if self.phase != MatchPhase::Paused
            || self.tick.saturating_sub(pause.paused_at_tick) < grace_ticks
        {
            return;
        }
        self.abandon_paused();
    }

    /// Wall-clock counterpart of the tick-counted grace window, for hosts
    /// whose ticks can fall behind real time.
    pub fn expire_pause(&mut self, now_epoch_ms: u64, grace_ms: u64) {
        let Some(pause) = self.pause else {
            return;
        };
        if self.phase != MatchPhase::Paused
            || now_epoch_ms.saturating_sub(pause.paused_at_epoch_ms) < grace_ms
        {
            return;
        }
        self.abandon_paused();
    }

    fn abandon_paused(&mut self) {
        let winner = match self.connected {
            [true, false] => Some(Side::Left),
            [false, true] => Some(Side::Right),
            _ => None,
        };
        self.pause = None;
        self.end(EndReason::Abandon, winner);
    }

    /// Stop the match regardless of phase, with no winner.
    pub fn force_end(&mut self, reason: EndReason) {
        if self.phase.is_ended() {
            return;
        }
        tracing::warn!(match_id = %self.id, ?reason, phase = self.phase.name(), "Match force-ended");
        self.end(reason, None);
    }

    /// End on score once either side reaches `win_score`. Returns true if the match ended.
    pub(crate) fn check_win(&mut self, win_score: u32) -> bool {
        if self.score.player1.max(self.score.player2) < win_score {
            return false;
        }
        let winner = self.score.leader();
        self.end(EndReason::Score, winner);
        true
    }

    fn end(&mut self, reason: EndReason, winner: Option<Side>) {
        if self.phase.is_ended() {
            return;
        }
        self.phase = MatchPhase::Ended { reason, winner };
        self.paddle_targets = [None, None];
        tracing::info!(
            match_id = %self.id,
            ?reason,
            ?winner,
            player1_score = self.score.player1,
            player2_score = self.score.player2,
            "Match ended"
        );
        if let Some(result) = self.result() {
            self.emit(MatchEvent::Ended(result));
        }
    }
}
