use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;

/// Queue type with its own effect rotation and serve pace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Plain Pong, no field effects.
    Boring,
    Standard,
    /// Faster rotation and faster serves.
    Death,
}

impl MatchMode {
    pub const ALL: [MatchMode; 3] = [MatchMode::Boring, MatchMode::Standard, MatchMode::Death];

    pub fn from_queue_type(queue_type: &str) -> Option<MatchMode> {
        match queue_type {
            "boring" => Some(MatchMode::Boring),
            "standard" => Some(MatchMode::Standard),
            "death" => Some(MatchMode::Death),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Boring => "boring",
            MatchMode::Standard => "standard",
            MatchMode::Death => "death",
        }
    }

    /// Ticks between effect switches, or `None` when effects never rotate.
    pub fn effect_interval_ticks(self, effects: &EffectConfig) -> Option<u32> {
        match self {
            MatchMode::Boring => None,
            MatchMode::Standard => Some(effects.interval_ticks.max(1)),
            MatchMode::Death => Some(effects.death_interval_ticks.max(1)),
        }
    }

    pub fn serve_speed(self, serve: &ServeConfig) -> f32 {
        match self {
            MatchMode::Death => serve.speed * serve.death_speed_multiplier,
            MatchMode::Boring | MatchMode::Standard => serve.speed,
        }
    }
}

/// Serve policy applied on every ball reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Ball speed right after a reset (units/tick).
    pub speed: f32,
    /// Serve direction is drawn uniformly within +/- this angle (degrees)
    /// from the horizontal.
    pub max_angle_deg: f32,
    pub death_speed_multiplier: f32,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            // |(12, 8)|, the opening serve speed
            speed: 14.422_205,
            max_angle_deg: 35.0,
            death_speed_multiplier: 1.5,
        }
    }
}

/// Tuning for the field effect rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Ticks between switches in the standard queue.
    pub interval_ticks: u32,
    /// Ticks between switches in the death queue.
    pub death_interval_ticks: u32,
    /// Ticks effects stay suspended after a point is scored.
    pub grace_ticks: u32,
    pub gravity_magnitude: f32,
    /// Gravity reverses direction every this many ticks. `0` disables flipping.
    pub gravity_flip_ticks: u32,
    pub time_zone_radius: f32,
    pub time_zone_slow_factor: f32,
    pub time_zone_fast_factor: f32,
    /// Radius of the black hole's influence.
    pub black_hole_radius: f32,
    pub black_hole_pull: f32,
    /// Distance at which the ball is absorbed and bounced out.
    pub black_hole_horizon: f32,
    pub block_half_extent: f32,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            interval_ticks: 600,
            death_interval_ticks: 300,
            grace_ticks: 90,
            gravity_magnitude: 1.0,
            gravity_flip_ticks: 240,
            time_zone_radius: 250.0,
            time_zone_slow_factor: 0.5,
            time_zone_fast_factor: 1.8,
            black_hole_radius: 300.0,
            black_hole_pull: 2000.0,
            black_hole_horizon: 12.0,
            block_half_extent: 100.0,
        }
    }
}

/// Data-driven configuration for a single match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub field_width: f32,
    pub field_height: f32,
    /// First player to reach this score wins.
    pub win_score: u32,
    /// Reconnection window after a disconnect (milliseconds).
    pub pause_grace_ms: u64,
    /// Simulation tick period (milliseconds).
    pub tick_interval_ms: u64,
    /// Skip the lobby handshake and start playing as soon as a pair is made.
    pub immediate_start: bool,
    pub ball_radius: f32,
    /// Opening ball velocity of a fresh match (units/tick).
    pub initial_ball_velocity: Vec2,
    pub max_ball_speed: f32,
    /// Speed added to the ball per unit of paddle travel on the hitting tick.
    pub smash_factor: f32,
    pub paddle_height: f32,
    pub paddle_half_width: f32,
    /// Distance from each goal line to the paddle centre.
    pub paddle_inset: f32,
    /// Maximum paddle travel per tick.
    pub paddle_speed: f32,
    /// Fixed RNG seed for serves and effect rotation. Random per match when unset.
    pub seed: Option<u64>,
    pub serve: ServeConfig,
    pub effects: EffectConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            field_width: 1600.0,
            field_height: 900.0,
            win_score: 11,
            pause_grace_ms: 15_000,
            tick_interval_ms: 16,
            immediate_start: false,
            ball_radius: 5.0,
            initial_ball_velocity: Vec2::new(12.0, 8.0),
            max_ball_speed: 40.0,
            smash_factor: 0.1,
            paddle_height: 120.0,
            paddle_half_width: 10.0,
            paddle_inset: 30.0,
            paddle_speed: 90.0,
            seed: None,
            serve: ServeConfig::default(),
            effects: EffectConfig::default(),
        }
    }
}

impl MatchConfig {
    /// Standalone match tuning from `FIELDPONG_MATCH_CONFIG`, or else
    /// `config/match.toml`. `None` when no usable file is found.
    pub fn load() -> Option<Self> {
        if let Ok(path) = std::env::var("FIELDPONG_MATCH_CONFIG")
            && !path.is_empty()
        {
            return Self::load_file(Path::new(&path));
        }
        Self::load_file(Path::new("config/match.toml"))
    }

    pub fn load_file(path: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<Self>(&contents) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded match configuration");
                Some(config)
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse match configuration, ignoring"
                );
                None
            },
        }
    }

    /// Grace window expressed in whole ticks (at least one).
    pub fn pause_grace_ticks(&self) -> u64 {
        let tick = self.tick_interval_ms.max(1);
        self.pause_grace_ms.div_ceil(tick).max(1)
    }

    pub fn field_center(&self) -> Vec2 {
        Vec2::new(self.field_width / 2.0, self.field_height / 2.0)
    }

    /// Reject configurations the simulation cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.field_width > 0.0 && self.field_height > 0.0) {
            return Err("field dimensions must be positive".to_string());
        }
        if self.win_score == 0 {
            return Err("win_score must be at least 1".to_string());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be at least 1".to_string());
        }
        if self.ball_radius <= 0.0 || self.ball_radius * 2.0 >= self.field_height {
            return Err("ball_radius must be positive and fit the field".to_string());
        }
        if self.serve.speed <= 0.0 || self.serve.speed > self.max_ball_speed {
            return Err("serve.speed must be in (0, max_ball_speed]".to_string());
        }
        if !(0.0..90.0).contains(&self.serve.max_angle_deg) {
            return Err("serve.max_angle_deg must be in [0, 90)".to_string());
        }
        if self.initial_ball_velocity.magnitude() <= 0.0 {
            return Err("initial_ball_velocity must be non-zero".to_string());
        }
        if self.paddle_inset * 2.0 >= self.field_width {
            return Err("paddle_inset leaves no room between the paddles".to_string());
        }
        if self.effects.black_hole_horizon <= 0.0 {
            return Err("effects.black_hole_horizon must be positive".to_string());
        }
        Ok(())
    }
}
