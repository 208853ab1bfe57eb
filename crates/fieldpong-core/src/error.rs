use crate::player::PlayerId;
use crate::state::{MatchId, MatchPhase};

/// Failure of a pure geometry operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// The vector has (near) zero magnitude and no direction.
    DegenerateVector,
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DegenerateVector => write!(f, "degenerate vector has no direction"),
        }
    }
}

impl std::error::Error for GeometryError {}

/// Errors reported by the match state machine and the matchmaker.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    /// Malformed or out-of-range command payload.
    InvalidCommand(String),
    /// The command is not legal in the match's current phase. State is unchanged.
    IllegalTransition {
        phase: MatchPhase,
        command: &'static str,
    },
    AlreadyQueued(PlayerId),
    NotQueued(PlayerId),
    /// A player was found bound to a second match.
    InvariantViolation {
        player_id: PlayerId,
        existing_match: MatchId,
    },
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCommand(msg) => write!(f, "invalid command: {msg}"),
            Self::IllegalTransition { phase, command } => {
                write!(f, "{command} is not allowed while {}", phase.name())
            },
            Self::AlreadyQueued(id) => write!(f, "player {id} is already queued or in a match"),
            Self::NotQueued(id) => write!(f, "player {id} is not queued"),
            Self::InvariantViolation {
                player_id,
                existing_match,
            } => write!(
                f,
                "player {player_id} is already bound to match {existing_match}"
            ),
        }
    }
}

impl std::error::Error for MatchError {}
