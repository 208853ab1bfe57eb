use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::config::{MatchConfig, MatchMode};
use crate::error::MatchError;
use crate::player::PlayerId;
use crate::state::{Match, MatchId};

/// A player waiting to be paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub mode: MatchMode,
    /// Caller-supplied timestamp (epoch ms), used only for reporting.
    pub joined_at: u64,
}

/// Two players taken off a queue, about to become a [`Match`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub match_id: MatchId,
    pub mode: MatchMode,
    pub left: PlayerId,
    pub right: PlayerId,
}

impl Pairing {
    pub fn into_match(self, config: &MatchConfig) -> Match {
        Match::new(self.match_id, self.mode, self.left, self.right, config)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchmakerStats {
    pub queued: HashMap<String, usize>,
    pub active_matches: usize,
    pub players_in_matches: usize,
}

/// FIFO pairing per queue type.
///
/// A player is in at most one queue or one match at a time. The matchmaker
/// holds no locks; callers serialize access.
#[derive(Debug, Default)]
pub struct Matchmaker {
    queues: HashMap<MatchMode, VecDeque<QueueEntry>>,
    queued: HashMap<PlayerId, MatchMode>,
    active: HashMap<PlayerId, MatchId>,
    matches: HashMap<MatchId, [PlayerId; 2]>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(
        &mut self,
        player_id: PlayerId,
        queue_type: &str,
        joined_at: u64,
    ) -> Result<(), MatchError> {
        let mode = MatchMode::from_queue_type(queue_type).ok_or_else(|| {
            MatchError::InvalidCommand(format!("unknown queue type '{queue_type}'"))
        })?;
        if self.queued.contains_key(&player_id) || self.active.contains_key(&player_id) {
            return Err(MatchError::AlreadyQueued(player_id));
        }
        self.queued.insert(player_id, mode);
        self.queues.entry(mode).or_default().push_back(QueueEntry {
            player_id,
            mode,
            joined_at,
        });
        tracing::debug!(player_id, queue = mode.as_str(), "Player queued");
        Ok(())
    }

    /// Remove a waiting player. `NotQueued` if they were not waiting.
    pub fn dequeue(&mut self, player_id: PlayerId) -> Result<QueueEntry, MatchError> {
        let mode = self
            .queued
            .remove(&player_id)
            .ok_or(MatchError::NotQueued(player_id))?;
        let queue = self.queues.entry(mode).or_default();
        let pos = queue
            .iter()
            .position(|e| e.player_id == player_id)
            .ok_or(MatchError::NotQueued(player_id))?;
        queue.remove(pos).ok_or(MatchError::NotQueued(player_id))
    }

    /// Pair the two oldest entries of `mode`'s queue, if there are two.
    ///
    /// The earlier entry plays Left. On `InvariantViolation` both entries stay
    /// queued so pairing can be retried once the stale match is released.
    pub fn try_pair(&mut self, mode: MatchMode) -> Result<Option<Pairing>, MatchError> {
        let queue = self.queues.entry(mode).or_default();
        let (Some(first), Some(second)) = (queue.front(), queue.get(1)) else {
            return Ok(None);
        };
        let pairing = Pairing {
            match_id: uuid::Uuid::new_v4().to_string(),
            mode,
            left: first.player_id,
            right: second.player_id,
        };
        self.register(&pairing)?;

        let queue = self.queues.entry(mode).or_default();
        queue.drain(..2);
        self.queued.remove(&pairing.left);
        self.queued.remove(&pairing.right);
        Ok(Some(pairing))
    }

    /// Record both players of `pairing` as bound to its match.
    pub fn register(&mut self, pairing: &Pairing) -> Result<(), MatchError> {
        for player_id in [pairing.left, pairing.right] {
            if let Some(existing) = self.active.get(&player_id) {
                return Err(MatchError::InvariantViolation {
                    player_id,
                    existing_match: existing.clone(),
                });
            }
        }
        self.active.insert(pairing.left, pairing.match_id.clone());
        self.active.insert(pairing.right, pairing.match_id.clone());
        self.matches
            .insert(pairing.match_id.clone(), [pairing.left, pairing.right]);
        tracing::info!(
            match_id = %pairing.match_id,
            queue = pairing.mode.as_str(),
            left = pairing.left,
            right = pairing.right,
            "Players paired"
        );
        Ok(())
    }

    /// Free both players of an ended match. Returns them, if the match was known.
    pub fn release(&mut self, match_id: &str) -> Option<[PlayerId; 2]> {
        let players = self.matches.remove(match_id)?;
        for player_id in players {
            if self.active.get(&player_id).map(String::as_str) == Some(match_id) {
                self.active.remove(&player_id);
            }
        }
        Some(players)
    }

    pub fn match_of(&self, player_id: PlayerId) -> Option<&MatchId> {
        self.active.get(&player_id)
    }

    pub fn is_queued(&self, player_id: PlayerId) -> bool {
        self.queued.contains_key(&player_id)
    }

    pub fn queue_len(&self, mode: MatchMode) -> usize {
        self.queues.get(&mode).map_or(0, VecDeque::len)
    }

    pub fn stats(&self) -> MatchmakerStats {
        MatchmakerStats {
            queued: MatchMode::ALL
                .into_iter()
                .map(|mode| (mode.as_str().to_string(), self.queue_len(mode)))
                .collect(),
            active_matches: self.matches.len(),
            players_in_matches: self.active.len(),
        }
    }
}
