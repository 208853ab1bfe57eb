use serde::{Deserialize, Serialize};

/// Stable player identifier supplied by the identity collaborator.
pub type PlayerId = u64;

/// Which end of the field a player defends.
///
/// `Left` is player 1 and `Right` is player 2 in every score and snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Array index used for per-side storage (`0` = Left, `1` = Right).
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// A resolved player, as stamped onto lobby announcements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub id: PlayerId,
    pub display_name: String,
}
