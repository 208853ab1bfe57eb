//! Maps an incoming connection to the player it speaks for.
//!
//! Identity is settled before the WebSocket upgrade; nothing on the wire
//! carries credentials, and the engine only ever sees the resolved id.

use std::collections::HashMap;

use fieldpong_core::player::{PlayerId, PlayerIdentity};

const MAX_DISPLAY_NAME_LEN: usize = 32;

/// What the transport knows about a connection at upgrade time.
#[derive(Debug, Clone, Default)]
pub struct ConnectionHandle {
    /// Unique per connection, even for the same player.
    pub connection_id: u64,
    /// Query-string parameters of the upgrade request.
    pub params: HashMap<String, String>,
}

pub trait IdentityResolver: Send + Sync {
    /// `None` refuses the connection.
    fn resolve(&self, handle: &ConnectionHandle) -> Option<PlayerIdentity>;
}

/// Trusts `player_id` and `name` from the query string.
///
/// Meant to sit behind a gateway that has already authenticated the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryIdentityResolver;

impl IdentityResolver for QueryIdentityResolver {
    fn resolve(&self, handle: &ConnectionHandle) -> Option<PlayerIdentity> {
        let id: PlayerId = handle.params.get("player_id")?.trim().parse().ok()?;
        let display_name = handle
            .params
            .get("name")
            .map(|n| n.trim().to_string())
            .filter(|n| is_valid_display_name(n))
            .unwrap_or_else(|| format!("Player {id}"));
        Some(PlayerIdentity { id, display_name })
    }
}

fn is_valid_display_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_DISPLAY_NAME_LEN
        && !name.chars().any(char::is_control)
}
