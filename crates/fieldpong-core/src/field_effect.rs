use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;
use crate::geometry::{Rect, Vec2, inverse_square_pull};
use crate::net::messages::FieldEffectMsg;
use crate::state::Ball;

/// Numerator of the gravity term: acceleration is `magnitude * 2 / speed`.
pub const GRAVITY_SCALE: f32 = 2.0;

/// Lower bound on ball speed when dividing by it.
pub const MIN_EFFECT_SPEED: f32 = 1.0;

/// Wire tag of a field effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldEffectKind {
    Normal,
    Gravity,
    TimeZone,
    BlackHole,
    Block,
}

impl FieldEffectKind {
    /// Kinds the rotation can switch to.
    pub const ROTATING: [FieldEffectKind; 4] = [
        FieldEffectKind::Gravity,
        FieldEffectKind::TimeZone,
        FieldEffectKind::BlackHole,
        FieldEffectKind::Block,
    ];
}

/// Environmental modifier to ball physics. At most one is active per match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldEffect {
    Normal,
    /// Vertical pull; positive magnitude pulls toward the bottom edge.
    Gravity { magnitude: f32 },
    /// Time runs at `time_factor` while the ball centre is inside the zone.
    TimeZone {
        center: Vec2,
        radius: f32,
        time_factor: f32,
    },
    BlackHole {
        center: Vec2,
        radius: f32,
        pull_strength: f32,
        horizon: f32,
    },
    /// Immovable obstacle the ball bounces off.
    Block { center: Vec2, half_extent: Vec2 },
}

/// What an effect does to the ball during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectStep {
    pub velocity_delta: Vec2,
    pub time_factor: f32,
    /// The ball crossed a black hole's horizon this tick.
    pub absorbed: bool,
}

impl EffectStep {
    pub const NEUTRAL: EffectStep = EffectStep {
        velocity_delta: Vec2::ZERO,
        time_factor: 1.0,
        absorbed: false,
    };
}

impl FieldEffect {
    pub fn kind(&self) -> FieldEffectKind {
        match self {
            FieldEffect::Normal => FieldEffectKind::Normal,
            FieldEffect::Gravity { .. } => FieldEffectKind::Gravity,
            FieldEffect::TimeZone { .. } => FieldEffectKind::TimeZone,
            FieldEffect::BlackHole { .. } => FieldEffectKind::BlackHole,
            FieldEffect::Block { .. } => FieldEffectKind::Block,
        }
    }

    /// Velocity change and time scaling this effect applies to `ball` over `dt` ticks.
    pub fn apply(&self, ball: &Ball, dt: f32) -> EffectStep {
        match *self {
            FieldEffect::Normal | FieldEffect::Block { .. } => EffectStep::NEUTRAL,
            FieldEffect::Gravity { magnitude } => {
                let speed = ball.velocity.magnitude().max(MIN_EFFECT_SPEED);
                EffectStep {
                    velocity_delta: Vec2::new(0.0, magnitude * GRAVITY_SCALE / speed * dt),
                    ..EffectStep::NEUTRAL
                }
            },
            FieldEffect::TimeZone {
                center,
                radius,
                time_factor,
            } => {
                if ball.position.distance(center) <= radius {
                    EffectStep {
                        time_factor,
                        ..EffectStep::NEUTRAL
                    }
                } else {
                    EffectStep::NEUTRAL
                }
            },
            FieldEffect::BlackHole {
                center,
                radius,
                pull_strength,
                horizon,
            } => {
                if ball.position.distance(center) > radius {
                    return EffectStep::NEUTRAL;
                }
                let pull = inverse_square_pull(ball.position, center, pull_strength, horizon);
                EffectStep {
                    velocity_delta: pull.accel.scale(dt),
                    time_factor: 1.0,
                    absorbed: pull.within_horizon,
                }
            },
        }
    }

    /// Solid geometry the ball collides with, if any.
    pub fn collision_geometry(&self) -> Option<Rect> {
        match *self {
            FieldEffect::Block {
                center,
                half_extent,
            } => Some(Rect::new(center, half_extent)),
            _ => None,
        }
    }

    pub fn to_msg(&self) -> FieldEffectMsg {
        let (pos, magnitude) = match *self {
            FieldEffect::Normal => (Vec2::ZERO, 0.0),
            FieldEffect::Gravity { magnitude } => (Vec2::ZERO, magnitude),
            FieldEffect::TimeZone {
                center,
                time_factor,
                ..
            } => (center, time_factor),
            FieldEffect::BlackHole {
                center,
                pull_strength,
                ..
            } => (center, pull_strength),
            FieldEffect::Block {
                center,
                half_extent,
            } => (center, half_extent.x),
        };
        FieldEffectMsg {
            effect_type: self.kind(),
            x_pos: pos.x,
            y_pos: pos.y,
            magnitude,
        }
    }
}

/// Draw the next effect for a rotation, never repeating `current`'s kind.
pub fn next_effect<R: Rng + ?Sized>(
    rng: &mut R,
    current: FieldEffectKind,
    config: &MatchConfig,
) -> FieldEffect {
    let candidates: Vec<FieldEffectKind> = FieldEffectKind::ROTATING
        .into_iter()
        .filter(|k| *k != current)
        .collect();
    let kind = candidates[rng.random_range(0..candidates.len())];
    let fx = &config.effects;

    // Keep effects in the middle band so they never sit on a paddle.
    let center = Vec2::new(
        rng.random_range(config.field_width * 0.3..=config.field_width * 0.7),
        rng.random_range(config.field_height * 0.25..=config.field_height * 0.75),
    );

    match kind {
        FieldEffectKind::Gravity => {
            let sign = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            FieldEffect::Gravity {
                magnitude: sign * fx.gravity_magnitude,
            }
        },
        FieldEffectKind::TimeZone => FieldEffect::TimeZone {
            center,
            radius: fx.time_zone_radius,
            time_factor: if rng.random_bool(0.5) {
                fx.time_zone_slow_factor
            } else {
                fx.time_zone_fast_factor
            },
        },
        FieldEffectKind::BlackHole => FieldEffect::BlackHole {
            center,
            radius: fx.black_hole_radius,
            pull_strength: fx.black_hole_pull,
            horizon: fx.black_hole_horizon,
        },
        FieldEffectKind::Block => FieldEffect::Block {
            center,
            half_extent: Vec2::new(fx.block_half_extent, fx.block_half_extent),
        },
        FieldEffectKind::Normal => FieldEffect::Normal,
    }
}

/// The effect currently installed on a match plus its accumulated state.
///
/// Accumulated state (gravity flips, active tick count) belongs to one
/// installed effect and is discarded by [`ActiveEffect::switch`]. After a
/// point the effect is suspended for a grace period during which the field
/// behaves as `Normal`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEffect {
    effect: FieldEffect,
    ticks_active: u32,
    flipped: bool,
    suspended_for: u32,
}

impl ActiveEffect {
    pub fn new(effect: FieldEffect) -> Self {
        Self {
            effect,
            ticks_active: 0,
            flipped: false,
            suspended_for: 0,
        }
    }

    /// The installed effect, ignoring suspension and flips.
    pub fn installed(&self) -> FieldEffect {
        self.effect
    }

    /// The effect the simulation should apply this tick.
    pub fn current(&self) -> FieldEffect {
        if self.suspended_for > 0 {
            return FieldEffect::Normal;
        }
        match self.effect {
            FieldEffect::Gravity { magnitude } if self.flipped => FieldEffect::Gravity {
                magnitude: -magnitude,
            },
            other => other,
        }
    }

    pub fn ticks_active(&self) -> u32 {
        self.ticks_active
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_for > 0
    }

    /// Install a new effect. Any remaining suspension carries over.
    pub fn switch(&mut self, effect: FieldEffect) {
        let suspended_for = self.suspended_for;
        *self = ActiveEffect::new(effect);
        self.suspended_for = suspended_for;
    }

    /// Neutralize the field for `ticks`. Returns true if the visible effect changed.
    pub fn suspend(&mut self, ticks: u32) -> bool {
        let was_visible = self.current() != FieldEffect::Normal;
        self.suspended_for = ticks;
        was_visible && ticks > 0
    }

    /// Advance one playing tick. Returns the newly visible effect when it changed.
    pub fn advance(&mut self, gravity_flip_ticks: u32) -> Option<FieldEffect> {
        if self.suspended_for > 0 {
            self.suspended_for -= 1;
            if self.suspended_for == 0 && self.effect != FieldEffect::Normal {
                return Some(self.current());
            }
            return None;
        }
        self.ticks_active += 1;
        if matches!(self.effect, FieldEffect::Gravity { .. })
            && gravity_flip_ticks > 0
            && self.ticks_active % gravity_flip_ticks == 0
        {
            self.flipped = !self.flipped;
            return Some(self.current());
        }
        None
    }
}

impl Default for ActiveEffect {
    fn default() -> Self {
        ActiveEffect::new(FieldEffect::Normal)
    }
}
