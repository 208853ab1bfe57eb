use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::identity::{IdentityResolver, QueryIdentityResolver};
use crate::lobby::Lobby;
use crate::results::{ResultSink, ResultStore};

pub type SharedLobby = Arc<RwLock<Lobby>>;

#[derive(Clone)]
pub struct AppState {
    pub lobby: SharedLobby,
    pub results: Arc<ResultStore>,
    pub identity: Arc<dyn IdentityResolver>,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
    pub next_connection_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_identity(config, Arc::new(QueryIdentityResolver))
    }

    pub fn with_identity(config: ServerConfig, identity: Arc<dyn IdentityResolver>) -> Self {
        let results = Arc::new(ResultStore::new(config.limits.max_stored_results));
        let sink: Arc<dyn ResultSink> = Arc::clone(&results) as Arc<dyn ResultSink>;
        let lobby = Lobby::new(Arc::new(config.matches.clone()), sink);
        Self {
            lobby: Arc::new(RwLock::new(lobby)),
            results,
            identity,
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn allocate_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Holds one slot of a connection counter for as long as it lives.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
