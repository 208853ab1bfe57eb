pub mod config;
pub mod error;
pub mod field_effect;
pub mod fsm;
pub mod geometry;
pub mod matchmaker;
pub mod net;
pub mod player;
pub mod simulation;
pub mod state;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::config::{MatchConfig, MatchMode};
    use crate::player::Side;
    use crate::simulation;
    use crate::state::{Match, MatchEvent};

    /// Deterministic config with a fast clock and short grace window.
    pub fn fast_config() -> MatchConfig {
        MatchConfig {
            seed: Some(42),
            tick_interval_ms: 5,
            pause_grace_ms: 200,
            ..MatchConfig::default()
        }
    }

    /// A match in the lobby between players 1 (Left) and 2 (Right).
    pub fn lobby_match(mode: MatchMode, config: &MatchConfig) -> Match {
        Match::new(format!("test-{}", mode.as_str()), mode, 1, 2, config)
    }

    /// A match already in play with its start events drained.
    pub fn playing_match(mode: MatchMode, config: &MatchConfig) -> Match {
        let mut m = lobby_match(mode, config);
        for side in Side::BOTH {
            m.acknowledge_lobby(side)
                .expect("fresh lobby match accepts acknowledgements");
        }
        m.drain_events();
        m
    }

    /// Run N ticks, returning all accumulated events.
    pub fn run_ticks(m: &mut Match, config: &MatchConfig, n: usize) -> Vec<MatchEvent> {
        let mut all_events = Vec::new();
        for _ in 0..n {
            all_events.extend(simulation::step(m, config));
        }
        all_events
    }
}
