//! Fixed-timestep simulation of a single match.

use rand::Rng;

use crate::config::MatchConfig;
use crate::field_effect::{FieldEffect, next_effect};
use crate::geometry::{Vec2, circle_rect_contact, reflect};
use crate::player::Side;
use crate::state::{Match, MatchEvent, MatchPhase};

/// Advance `m` by one tick and return everything observers must be told.
///
/// Outside `Playing` no physics runs; paused matches only evaluate their
/// grace window. Every tick ends with a snapshot, which doubles as a
/// heartbeat while the match is not being played.
pub fn step(m: &mut Match, config: &MatchConfig) -> Vec<MatchEvent> {
    if m.phase.is_ended() {
        return m.drain_events();
    }
    m.tick += 1;

    match m.phase {
        MatchPhase::Playing => advance_playing(m, config),
        MatchPhase::Paused => m.check_pause_timeout(config.pause_grace_ticks()),
        MatchPhase::Queued | MatchPhase::Lobby | MatchPhase::Ended { .. } => {},
    }

    let snapshot = m.snapshot();
    m.emit(MatchEvent::Snapshot(snapshot));
    m.drain_events()
}

fn advance_playing(m: &mut Match, config: &MatchConfig) {
    apply_moves(m, config);
    rotate_effects(m, config);

    let effect = m.effect.current();
    let fx = effect.apply(&m.ball, 1.0);
    m.ball.velocity = m.ball.velocity + fx.velocity_delta.scale(fx.time_factor);
    m.ball.position = m.ball.position + m.ball.velocity.scale(fx.time_factor);
    if fx.absorbed {
        bounce_off_horizon(m, effect);
    }

    collide_block(m, effect);
    for side in Side::BOTH {
        collide_paddle(m, side, config);
    }
    collide_walls(m, config);
    check_scoring(m, config);
}

fn apply_moves(m: &mut Match, config: &MatchConfig) {
    for side in Side::BOTH {
        let Some(target) = m.paddle_targets[side.index()] else {
            m.paddle_mut(side).last_displacement = 0.0;
            continue;
        };
        if m.paddle_mut(side).move_toward(target, config.field_height) {
            m.paddle_targets[side.index()] = None;
        }
    }
}

fn rotate_effects(m: &mut Match, config: &MatchConfig) {
    if let Some(changed) = m.effect.advance(config.effects.gravity_flip_ticks) {
        m.emit(MatchEvent::EffectChanged(changed));
    }

    let Some(remaining) = m.ticks_until_rotation else {
        return;
    };
    if remaining > 1 {
        m.ticks_until_rotation = Some(remaining - 1);
        return;
    }
    let next = next_effect(&mut m.rng, m.effect.installed().kind(), config);
    m.effect.switch(next);
    m.ticks_until_rotation = m.mode.effect_interval_ticks(&config.effects);
    tracing::debug!(match_id = %m.id, effect = ?next.kind(), tick = m.tick, "Field effect switched");
    if !m.effect.is_suspended() {
        m.emit(MatchEvent::EffectChanged(next));
    }
}

/// Score-neutral bounce out of a black hole's horizon.
fn bounce_off_horizon(m: &mut Match, effect: FieldEffect) {
    let FieldEffect::BlackHole {
        center, horizon, ..
    } = effect
    else {
        return;
    };
    m.ball.velocity = -m.ball.velocity;
    // Re-emerge on the side the ball is now heading toward.
    let outward = m
        .ball
        .velocity
        .normalize_or((m.ball.position - center).normalize_or(Vec2::new(1.0, 0.0)));
    m.ball.position = center + outward.scale(horizon + m.ball.radius);
}

fn collide_block(m: &mut Match, effect: FieldEffect) {
    let Some(rect) = effect.collision_geometry() else {
        return;
    };
    if let Some(contact) = circle_rect_contact(m.ball.position, m.ball.radius, &rect) {
        m.ball.position = m.ball.position + contact.normal.scale(contact.depth);
        if m.ball.velocity.dot(contact.normal) < 0.0 {
            m.ball.velocity = reflect(m.ball.velocity, contact.normal);
        }
    }
}

fn collide_paddle(m: &mut Match, side: Side, config: &MatchConfig) {
    let paddle = m.paddle(side);
    let rect = paddle.rect();
    let face = paddle.normal();
    let displacement = paddle.last_displacement;

    let Some(contact) = circle_rect_contact(m.ball.position, m.ball.radius, &rect) else {
        return;
    };
    m.ball.position = m.ball.position + contact.normal.scale(contact.depth);
    if m.ball.velocity.dot(face) >= 0.0 {
        // Already travelling away from this paddle.
        return;
    }

    let reflected = reflect(m.ball.velocity, face);
    let speed = (reflected.magnitude() + config.smash_factor * displacement.abs())
        .min(config.max_ball_speed);
    m.ball.velocity = reflected.with_magnitude(speed).unwrap_or(face.scale(speed));
}

fn collide_walls(m: &mut Match, config: &MatchConfig) {
    let r = m.ball.radius;
    let ball = &mut m.ball;
    if ball.position.y - r < 0.0 {
        ball.position.y = r;
        ball.velocity.y = ball.velocity.y.abs();
    } else if ball.position.y + r > config.field_height {
        ball.position.y = config.field_height - r;
        ball.velocity.y = -ball.velocity.y.abs();
    }
}

fn check_scoring(m: &mut Match, config: &MatchConfig) {
    let x = m.ball.position.x;
    let scorer = if x < 0.0 {
        Side::Right
    } else if x > config.field_width {
        Side::Left
    } else {
        return;
    };

    m.score.award(scorer);
    let score = m.score;
    tracing::debug!(
        match_id = %m.id,
        ?scorer,
        player1 = score.player1,
        player2 = score.player2,
        "Point scored"
    );
    m.emit(MatchEvent::Scored {
        side: scorer,
        score,
    });

    if m.check_win(config.win_score) {
        return;
    }

    // Serve toward the side that conceded.
    serve(m, config, scorer.opposite());
    if m.effect.suspend(config.effects.grace_ticks) {
        m.emit(MatchEvent::EffectChanged(FieldEffect::Normal));
    }
}

/// Reset the ball to the centre with a fresh serve toward `toward`.
pub(crate) fn serve(m: &mut Match, config: &MatchConfig, toward: Side) {
    let max_angle = config.serve.max_angle_deg.to_radians();
    let angle = if max_angle > 0.0 {
        m.rng.random_range(-max_angle..=max_angle)
    } else {
        0.0
    };
    let speed = m.mode.serve_speed(&config.serve).min(config.max_ball_speed);
    let dir_x = match toward {
        Side::Left => -1.0,
        Side::Right => 1.0,
    };
    m.ball.position = config.field_center();
    m.ball.velocity = Vec2::new(dir_x * angle.cos(), angle.sin()).scale(speed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchMode;
    use crate::field_effect::FieldEffect;
    use crate::fsm::ReconnectOutcome;
    use crate::state::EndReason;

    fn config() -> MatchConfig {
        MatchConfig {
            seed: Some(11),
            ..MatchConfig::default()
        }
    }

    fn playing(mode: MatchMode, config: &MatchConfig) -> Match {
        let mut m = Match::new("sim".to_string(), mode, 1, 2, config);
        m.begin().unwrap();
        m.drain_events();
        m
    }

    /// Park both paddles at the top edge, out of the ball's way.
    fn park_paddles(m: &mut Match) {
        for side in Side::BOTH {
            m.paddle_mut(side).y = 0.0;
        }
    }

    fn snapshots(events: &[MatchEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, MatchEvent::Snapshot(_)))
            .count()
    }

    #[test]
    fn every_tick_emits_one_snapshot() {
        let config = config();
        let mut m = playing(MatchMode::Standard, &config);
        let events = step(&mut m, &config);
        assert_eq!(snapshots(&events), 1);
        assert_eq!(m.tick, 1);
    }

    #[test]
    fn ball_moves_by_velocity_on_normal_field() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        step(&mut m, &config);
        assert_eq!(m.ball.position, Vec2::new(812.0, 458.0));
        assert_eq!(m.ball.velocity, Vec2::new(12.0, 8.0));
    }

    #[test]
    fn lobby_ticks_only_heartbeat() {
        let config = config();
        let mut m = Match::new("sim".to_string(), MatchMode::Standard, 1, 2, &config);
        let ball = m.ball.clone();
        let events = step(&mut m, &config);
        assert_eq!(m.ball, ball);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MatchEvent::Snapshot(_)));
    }

    #[test]
    fn crossing_left_edge_scores_for_player2_and_resets() {
        let config = MatchConfig {
            win_score: 5,
            ..config()
        };
        let mut m = playing(MatchMode::Boring, &config);
        park_paddles(&mut m);
        m.ball.velocity = Vec2::new(-12.0, 8.0);

        let mut scored = false;
        for _ in 0..200 {
            let events = step(&mut m, &config);
            if events.iter().any(|e| matches!(e, MatchEvent::Scored { .. })) {
                scored = true;
                break;
            }
        }
        assert!(scored);
        assert_eq!(m.score.player2, 1);
        assert_eq!(m.score.player1, 0);
        assert_eq!(m.ball.position, Vec2::new(800.0, 450.0));
        assert!(m.ball.velocity.magnitude() > 0.0);
        // Served toward the side that conceded.
        assert!(m.ball.velocity.x < 0.0);
        assert_eq!(m.phase, MatchPhase::Playing);
    }

    #[test]
    fn crossing_right_edge_scores_for_player1() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        park_paddles(&mut m);
        m.ball.position = Vec2::new(1595.0, 450.0);
        m.ball.velocity = Vec2::new(12.0, 0.0);
        step(&mut m, &config);
        assert_eq!(m.score.player1, 1);
        assert!(m.ball.velocity.x > 0.0);
    }

    #[test]
    fn reaching_win_score_ends_the_match() {
        let config = MatchConfig {
            win_score: 1,
            ..config()
        };
        let mut m = playing(MatchMode::Boring, &config);
        park_paddles(&mut m);
        m.ball.position = Vec2::new(5.0, 450.0);
        m.ball.velocity = Vec2::new(-12.0, 0.0);
        let events = step(&mut m, &config);
        assert_eq!(
            m.phase,
            MatchPhase::Ended {
                reason: EndReason::Score,
                winner: Some(Side::Right)
            }
        );
        let result = events
            .iter()
            .find_map(|e| match e {
                MatchEvent::Ended(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(result.winner, Some(2));
        assert_eq!(result.final_score, [0, 1]);

        // Further ticks do nothing.
        let tick = m.tick;
        assert!(step(&mut m, &config).is_empty());
        assert_eq!(m.tick, tick);
    }

    #[test]
    fn paddle_hit_reflects_and_adds_smash() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        m.ball.position = Vec2::new(52.0, 450.0);
        m.ball.velocity = Vec2::new(-10.0, 0.0);
        m.submit_move(Side::Left, 500.0).unwrap();
        step(&mut m, &config);
        assert!(m.ball.velocity.x > 0.0);
        let expected = 10.0 + config.smash_factor * 50.0;
        assert!((m.ball.velocity.magnitude() - expected).abs() < 1e-3);
    }

    #[test]
    fn paddle_smash_is_capped() {
        let config = MatchConfig {
            smash_factor: 10.0,
            ..config()
        };
        let mut m = playing(MatchMode::Boring, &config);
        m.ball.position = Vec2::new(52.0, 450.0);
        m.ball.velocity = Vec2::new(-10.0, 0.0);
        m.submit_move(Side::Left, 500.0).unwrap();
        step(&mut m, &config);
        assert!(m.ball.velocity.x > 0.0);
        assert!((m.ball.velocity.magnitude() - config.max_ball_speed).abs() < 1e-3);
    }

    #[test]
    fn paddle_moves_clamp_to_field() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        m.paddle_mut(Side::Right).y = 880.0;
        m.submit_move(Side::Right, 10_000.0).unwrap();
        step(&mut m, &config);
        assert_eq!(m.paddle(Side::Right).y, 900.0);
    }

    #[test]
    fn far_paddle_target_is_reached_over_several_ticks() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        assert_eq!(m.paddle(Side::Left).y, 450.0);
        m.submit_move(Side::Left, 800.0).unwrap();

        step(&mut m, &config);
        assert_eq!(m.paddle(Side::Left).y, 540.0);
        assert_eq!(m.paddle(Side::Left).last_displacement, 90.0);

        for _ in 0..9 {
            step(&mut m, &config);
        }
        assert_eq!(m.paddle(Side::Left).y, 800.0);
        assert_eq!(m.paddle(Side::Left).last_displacement, 0.0);
        assert_eq!(m.paddle_targets[Side::Left.index()], None);
    }

    #[test]
    fn newer_target_replaces_one_still_in_flight() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        m.submit_move(Side::Right, 900.0).unwrap();
        step(&mut m, &config);
        assert_eq!(m.paddle(Side::Right).y, 540.0);

        m.submit_move(Side::Right, 500.0).unwrap();
        step(&mut m, &config);
        assert_eq!(m.paddle(Side::Right).y, 500.0);
        assert_eq!(m.paddle(Side::Right).last_displacement, -40.0);
    }

    #[test]
    fn floor_reflects_and_clamps() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        m.ball.position = Vec2::new(800.0, 890.0);
        m.ball.velocity = Vec2::new(12.0, 8.0);
        step(&mut m, &config);
        assert_eq!(m.ball.position.y, 895.0);
        assert_eq!(m.ball.velocity.y, -8.0);
    }

    #[test]
    fn block_reflects_and_never_scores() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        m.effect.switch(FieldEffect::Block {
            center: Vec2::new(800.0, 450.0),
            half_extent: Vec2::new(100.0, 100.0),
        });
        m.ball.position = Vec2::new(690.0, 450.0);
        m.ball.velocity = Vec2::new(10.0, 0.0);
        step(&mut m, &config);
        assert_eq!(m.ball.velocity, Vec2::new(-10.0, 0.0));
        assert!(m.ball.position.x <= 695.0);
        assert_eq!(m.score.as_array(), [0, 0]);
    }

    #[test]
    fn black_hole_absorption_bounces_without_scoring() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        let center = Vec2::new(800.0, 450.0);
        m.effect.switch(FieldEffect::BlackHole {
            center,
            radius: 300.0,
            pull_strength: 2000.0,
            horizon: 12.0,
        });
        m.ball.position = Vec2::new(790.0, 450.0);
        m.ball.velocity = Vec2::new(4.0, 0.0);
        step(&mut m, &config);
        assert!(m.ball.position.distance(center) >= 12.0);
        assert!(m.ball.velocity.is_finite());
        assert_eq!(m.score.as_array(), [0, 0]);
    }

    #[test]
    fn score_suspends_effects_for_grace_period() {
        let mut config = config();
        config.effects.grace_ticks = 3;
        let mut m = playing(MatchMode::Boring, &config);
        park_paddles(&mut m);
        m.effect.switch(FieldEffect::Gravity { magnitude: 1.0 });
        m.ball.position = Vec2::new(5.0, 450.0);
        m.ball.velocity = Vec2::new(-12.0, 0.0);

        let events = step(&mut m, &config);
        assert!(events.contains(&MatchEvent::EffectChanged(FieldEffect::Normal)));
        assert_eq!(m.effect.current(), FieldEffect::Normal);

        let mut resumed = false;
        for _ in 0..3 {
            let events = step(&mut m, &config);
            resumed |= events.contains(&MatchEvent::EffectChanged(FieldEffect::Gravity {
                magnitude: 1.0,
            }));
        }
        assert!(resumed);
        assert!(!m.effect.is_suspended());
    }

    #[test]
    fn standard_queue_rotates_effects() {
        let mut config = config();
        config.effects.interval_ticks = 5;
        let mut m = playing(MatchMode::Standard, &config);
        let mut switches = 0;
        for _ in 0..20 {
            let events = step(&mut m, &config);
            switches += events
                .iter()
                .filter(|e| matches!(e, MatchEvent::EffectChanged(_)))
                .count();
            if m.phase != MatchPhase::Playing {
                break;
            }
        }
        assert!(switches >= 1);
    }

    #[test]
    fn boring_queue_never_leaves_normal() {
        let config = config();
        let mut m = playing(MatchMode::Boring, &config);
        for _ in 0..1000 {
            step(&mut m, &config);
            assert_eq!(m.effect.installed(), FieldEffect::Normal);
        }
    }

    #[test]
    fn pause_freezes_state_and_resume_restores_it() {
        let config = config();
        let mut m = playing(MatchMode::Standard, &config);
        for _ in 0..10 {
            step(&mut m, &config);
        }
        m.disconnect(Side::Right, 123);
        let ball = m.ball.clone();
        let paddles = m.paddles.clone();
        let score = m.score;

        for _ in 0..5 {
            let events = step(&mut m, &config);
            assert_eq!(snapshots(&events), 1);
            assert_eq!(m.ball, ball);
            assert_eq!(m.paddles, paddles);
        }
        assert_eq!(
            m.reconnect(Side::Right, config.pause_grace_ticks()),
            ReconnectOutcome::Resumed
        );
        assert_eq!(m.ball, ball);
        assert_eq!(m.paddles, paddles);
        assert_eq!(m.score, score);
    }

    #[test]
    fn pause_times_out_into_abandon() {
        let config = MatchConfig {
            pause_grace_ms: 160,
            tick_interval_ms: 16,
            ..config()
        };
        let mut m = playing(MatchMode::Boring, &config);
        m.disconnect(Side::Left, 0);
        let mut ended = 0;
        for _ in 0..20 {
            ended += step(&mut m, &config)
                .iter()
                .filter(|e| matches!(e, MatchEvent::Ended(_)))
                .count();
        }
        assert_eq!(ended, 1);
        assert_eq!(
            m.phase,
            MatchPhase::Ended {
                reason: EndReason::Abandon,
                winner: Some(Side::Right)
            }
        );
        assert_eq!(m.tick, 10);
    }

    #[test]
    fn serves_are_reproducible_for_a_seed() {
        let config = config();
        let mut a = playing(MatchMode::Standard, &config);
        let mut b = playing(MatchMode::Standard, &config);
        serve(&mut a, &config, Side::Left);
        serve(&mut b, &config, Side::Left);
        assert_eq!(a.ball.velocity, b.ball.velocity);
        assert!((a.ball.speed() - config.serve.speed).abs() < 1e-3);
    }

    #[test]
    fn death_serves_faster() {
        let config = config();
        let mut m = playing(MatchMode::Death, &config);
        serve(&mut m, &config, Side::Right);
        let expected = config.serve.speed * config.serve.death_speed_multiplier;
        assert!((m.ball.speed() - expected).abs() < 1e-3);
        assert!(m.ball.velocity.x > 0.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ball_stays_inside_vertical_bounds(
                seed in 0u64..1000,
                vx in -30.0f32..30.0,
                vy in -30.0f32..30.0,
                ticks in 1usize..300,
            ) {
                let config = MatchConfig {
                    seed: Some(seed),
                    ..MatchConfig::default()
                };
                let mut m = playing(MatchMode::Death, &config);
                m.ball.velocity = Vec2::new(vx, vy);
                for _ in 0..ticks {
                    step(&mut m, &config);
                    if m.phase != MatchPhase::Playing {
                        break;
                    }
                    prop_assert!(m.ball.position.y >= m.ball.radius - 1e-3);
                    prop_assert!(m.ball.position.y <= config.field_height - m.ball.radius + 1e-3);
                    prop_assert!(m.ball.velocity.is_finite());
                }
            }

            #[test]
            fn paddles_stay_on_the_field(
                targets in proptest::collection::vec(-2000.0f32..3000.0, 1..40),
            ) {
                let config = MatchConfig {
                    seed: Some(5),
                    ..MatchConfig::default()
                };
                let mut m = playing(MatchMode::Boring, &config);
                for y in targets {
                    m.submit_move(Side::Left, y).unwrap();
                    m.submit_move(Side::Right, -y).unwrap();
                    step(&mut m, &config);
                    if m.phase != MatchPhase::Playing {
                        break;
                    }
                    for side in Side::BOTH {
                        let p = m.paddle(side);
                        prop_assert!((0.0..=config.field_height).contains(&p.y));
                        prop_assert!(p.last_displacement.abs() <= p.speed);
                    }
                }
            }

            #[test]
            fn score_never_decreases(seed in 0u64..500) {
                let config = MatchConfig {
                    seed: Some(seed),
                    win_score: 3,
                    ..MatchConfig::default()
                };
                let mut m = playing(MatchMode::Standard, &config);
                park_paddles(&mut m);
                let mut last = m.score;
                for _ in 0..2000 {
                    step(&mut m, &config);
                    prop_assert!(m.score.player1 >= last.player1);
                    prop_assert!(m.score.player2 >= last.player2);
                    last = m.score;
                    if m.phase.is_ended() {
                        break;
                    }
                }
            }
        }
    }
}
