use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::{MatchConfig, MatchMode};
use crate::field_effect::{ActiveEffect, FieldEffect};
use crate::geometry::{Rect, Vec2};
use crate::net::messages::GameStateMsg;
use crate::player::{PlayerId, Side};

/// Match identifier (UUID v4 string).
pub type MatchId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// A player reached the winning score.
    Score,
    /// A disconnected player did not return within the grace window.
    Abandon,
    /// The host detected a broken invariant and stopped the match.
    InternalError,
}

/// Lifecycle phase of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "phase")]
pub enum MatchPhase {
    Queued,
    Lobby,
    Playing,
    Paused,
    Ended {
        reason: EndReason,
        winner: Option<Side>,
    },
}

impl MatchPhase {
    pub fn name(&self) -> &'static str {
        match self {
            MatchPhase::Queued => "queued",
            MatchPhase::Lobby => "lobby",
            MatchPhase::Playing => "playing",
            MatchPhase::Paused => "paused",
            MatchPhase::Ended { .. } => "ended",
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, MatchPhase::Ended { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paddle {
    pub side: Side,
    pub x: f32,
    /// Centre of the paddle, within `[0, field_height]`.
    pub y: f32,
    pub height: f32,
    pub half_width: f32,
    /// Maximum travel per tick.
    pub speed: f32,
    /// Signed travel applied on the most recent tick.
    pub last_displacement: f32,
}

impl Paddle {
    pub fn new(side: Side, config: &MatchConfig) -> Self {
        let x = match side {
            Side::Left => config.paddle_inset,
            Side::Right => config.field_width - config.paddle_inset,
        };
        Self {
            side,
            x,
            y: config.field_height / 2.0,
            height: config.paddle_height,
            half_width: config.paddle_half_width,
            speed: config.paddle_speed,
            last_displacement: 0.0,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(
            Vec2::new(self.x, self.y),
            Vec2::new(self.half_width, self.height / 2.0),
        )
    }

    /// Unit normal of the hitting face, pointing into the field.
    pub fn normal(&self) -> Vec2 {
        match self.side {
            Side::Left => Vec2::new(1.0, 0.0),
            Side::Right => Vec2::new(-1.0, 0.0),
        }
    }

    /// Move toward `target`, bounded by the field and by `speed`.
    /// Returns true once the paddle sits exactly on the clamped target.
    pub fn move_toward(&mut self, target: f32, field_height: f32) -> bool {
        let target = target.clamp(0.0, field_height);
        let before = self.y;
        let remaining = target - self.y;
        if remaining.abs() <= self.speed {
            self.y = target;
        } else {
            self.y = (self.y + self.speed.copysign(remaining)).clamp(0.0, field_height);
        }
        self.last_displacement = self.y - before;
        self.y == target
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
}

impl Ball {
    pub fn speed(&self) -> f32 {
        self.velocity.magnitude()
    }
}

/// Points per side. `player1` is Left, `player2` is Right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub player1: u32,
    pub player2: u32,
}

impl Score {
    pub fn get(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.player1,
            Side::Right => self.player2,
        }
    }

    pub fn award(&mut self, side: Side) {
        match side {
            Side::Left => self.player1 += 1,
            Side::Right => self.player2 += 1,
        }
    }

    /// Side with strictly more points.
    pub fn leader(&self) -> Option<Side> {
        match self.player1.cmp(&self.player2) {
            std::cmp::Ordering::Greater => Some(Side::Left),
            std::cmp::Ordering::Less => Some(Side::Right),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn as_array(&self) -> [u32; 2] {
        [self.player1, self.player2]
    }
}

/// Bookkeeping for a paused match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseState {
    pub paused_at_tick: u64,
    pub paused_at_epoch_ms: u64,
}

/// Final outcome handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: MatchId,
    pub queue_type: String,
    pub player1: PlayerId,
    pub player2: PlayerId,
    pub final_score: [u32; 2],
    pub winner: Option<PlayerId>,
    pub reason: EndReason,
    /// Tick on which the match ended.
    pub ended_at_tick: u64,
}

/// Something observers of a match need to hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    /// Both sides are in and play has begun.
    Started,
    Snapshot(GameStateMsg),
    /// The visible field effect changed.
    EffectChanged(FieldEffect),
    Scored { side: Side, score: Score },
    Paused { side: Side, at_epoch_ms: u64 },
    Resumed,
    Ended(MatchResult),
}

/// Authoritative state of one two-player match.
///
/// Owned by exactly one driver; every mutation goes through the state
/// machine in `fsm` or the tick in `simulation`.
#[derive(Debug, Clone)]
pub struct Match {
    pub id: MatchId,
    pub queue_type: String,
    pub mode: MatchMode,
    /// Indexed by [`Side::index`].
    pub players: [PlayerId; 2],
    pub ball: Ball,
    pub paddles: [Paddle; 2],
    pub score: Score,
    pub effect: ActiveEffect,
    pub phase: MatchPhase,
    pub tick: u64,
    pub(crate) pause: Option<PauseState>,
    pub(crate) connected: [bool; 2],
    pub(crate) lobby_acks: [bool; 2],
    /// Latest requested paddle centre per side, held until reached.
    pub(crate) paddle_targets: [Option<f32>; 2],
    pub(crate) ticks_until_rotation: Option<u32>,
    pub(crate) rng: StdRng,
    events: Vec<MatchEvent>,
}

impl Match {
    /// A freshly paired match waiting in the lobby.
    pub fn new(
        id: MatchId,
        mode: MatchMode,
        left: PlayerId,
        right: PlayerId,
        config: &MatchConfig,
    ) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            id,
            queue_type: mode.as_str().to_string(),
            mode,
            players: [left, right],
            ball: Ball {
                position: config.field_center(),
                velocity: config.initial_ball_velocity,
                radius: config.ball_radius,
            },
            paddles: [Paddle::new(Side::Left, config), Paddle::new(Side::Right, config)],
            score: Score::default(),
            effect: ActiveEffect::default(),
            phase: MatchPhase::Lobby,
            tick: 0,
            pause: None,
            connected: [true, true],
            lobby_acks: [false, false],
            paddle_targets: [None, None],
            ticks_until_rotation: mode.effect_interval_ticks(&config.effects),
            rng: StdRng::seed_from_u64(seed),
            events: Vec::new(),
        }
    }

    pub fn side_of(&self, player_id: PlayerId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.players[side.index()] == player_id)
    }

    pub fn player(&self, side: Side) -> PlayerId {
        self.players[side.index()]
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        &self.paddles[side.index()]
    }

    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        &mut self.paddles[side.index()]
    }

    pub fn is_connected(&self, side: Side) -> bool {
        self.connected[side.index()]
    }

    pub fn pause_state(&self) -> Option<PauseState> {
        self.pause
    }

    /// Wire snapshot of the current state.
    pub fn snapshot(&self) -> GameStateMsg {
        let block = self.effect.current().collision_geometry();
        GameStateMsg {
            tick: self.tick,
            ball_pos_x: self.ball.position.x,
            ball_pos_y: self.ball.position.y,
            ball_vel_x: self.ball.velocity.x,
            ball_vel_y: self.ball.velocity.y,
            left_paddle_y: self.paddle(Side::Left).y,
            right_paddle_y: self.paddle(Side::Right).y,
            player1_score: self.score.player1,
            player2_score: self.score.player2,
            block_x: block.map(|r| r.center.x),
            block_y: block.map(|r| r.center.y),
        }
    }

    /// Outcome of an ended match.
    pub fn result(&self) -> Option<MatchResult> {
        match self.phase {
            MatchPhase::Ended { reason, winner } => Some(MatchResult {
                match_id: self.id.clone(),
                queue_type: self.queue_type.clone(),
                player1: self.player(Side::Left),
                player2: self.player(Side::Right),
                final_score: self.score.as_array(),
                winner: winner.map(|side| self.player(side)),
                reason,
                ended_at_tick: self.tick,
            }),
            _ => None,
        }
    }

    pub(crate) fn emit(&mut self, event: MatchEvent) {
        self.events.push(event);
    }

    /// Take every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<MatchEvent> {
        std::mem::take(&mut self.events)
    }
}
