use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use fieldpong_core::state::MatchResult;

/// Receives the outcome of every finished match.
pub trait ResultSink: Send + Sync {
    fn record(&self, result: MatchResult);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultStats {
    /// Results recorded since startup, including evicted ones.
    pub total_recorded: u64,
    pub stored: usize,
}

#[derive(Debug, Default)]
struct Inner {
    results: VecDeque<MatchResult>,
    total_recorded: u64,
}

/// In-memory, bounded match history. Oldest results are evicted first.
#[derive(Debug)]
pub struct ResultStore {
    inner: Mutex<Inner>,
    max_stored: usize,
}

impl ResultStore {
    pub fn new(max_stored: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_stored: max_stored.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Up to `limit` results, newest first.
    pub fn recent(&self, limit: usize) -> Vec<MatchResult> {
        self.lock().results.iter().rev().take(limit).cloned().collect()
    }

    pub fn get(&self, match_id: &str) -> Option<MatchResult> {
        self.lock()
            .results
            .iter()
            .find(|r| r.match_id == match_id)
            .cloned()
    }

    pub fn stats(&self) -> ResultStats {
        let inner = self.lock();
        ResultStats {
            total_recorded: inner.total_recorded,
            stored: inner.results.len(),
        }
    }
}

impl ResultSink for ResultStore {
    fn record(&self, result: MatchResult) {
        tracing::info!(
            match_id = %result.match_id,
            reason = ?result.reason,
            winner = ?result.winner,
            score = ?result.final_score,
            "Match result recorded"
        );
        let mut inner = self.lock();
        if inner.results.len() >= self.max_stored {
            inner.results.pop_front();
        }
        inner.results.push_back(result);
        inner.total_recorded += 1;
    }
}
