use serde::{Deserialize, Serialize};

use crate::field_effect::FieldEffectKind;
use crate::player::{PlayerId, Side};
use crate::state::EndReason;

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    PlayerMove = 0x01,
    JoinQueue = 0x02,
    LeaveQueue = 0x03,
    LobbyReady = 0x04,
    Rejoin = 0x05,

    // Server -> Client
    GameState = 0x10,
    GameStart = 0x11,
    GameEnd = 0x12,
    GamePause = 0x13,
    FieldEffect = 0x14,
    LobbyStart = 0x15,
    GameResponse = 0x16,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::PlayerMove),
            0x02 => Some(Self::JoinQueue),
            0x03 => Some(Self::LeaveQueue),
            0x04 => Some(Self::LobbyReady),
            0x05 => Some(Self::Rejoin),
            0x10 => Some(Self::GameState),
            0x11 => Some(Self::GameStart),
            0x12 => Some(Self::GameEnd),
            0x13 => Some(Self::GamePause),
            0x14 => Some(Self::FieldEffect),
            0x15 => Some(Self::LobbyStart),
            0x16 => Some(Self::GameResponse),
            _ => None,
        }
    }

    /// Whether clients are allowed to send this type.
    pub fn is_client_message(self) -> bool {
        (self as u8) < 0x10
    }
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Desired paddle centre, clamped to the field. The paddle travels toward it
/// from the next tick on, at most the paddle speed per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMoveMsg {
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinQueueMsg {
    pub queue_type: String,
    /// `0` means the client did not say; any other value must match.
    #[serde(default)]
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveQueueMsg {}

/// Lobby handshake acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyReadyMsg {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejoinMsg {
    pub match_id: String,
    #[serde(default)]
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    PlayerMove(PlayerMoveMsg),
    JoinQueue(JoinQueueMsg),
    LeaveQueue(LeaveQueueMsg),
    LobbyReady(LobbyReadyMsg),
    Rejoin(RejoinMsg),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::PlayerMove(_) => MessageType::PlayerMove,
            ClientMessage::JoinQueue(_) => MessageType::JoinQueue,
            ClientMessage::LeaveQueue(_) => MessageType::LeaveQueue,
            ClientMessage::LobbyReady(_) => MessageType::LobbyReady,
            ClientMessage::Rejoin(_) => MessageType::Rejoin,
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Authoritative per-tick snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateMsg {
    pub tick: u64,
    pub ball_pos_x: f32,
    pub ball_pos_y: f32,
    pub ball_vel_x: f32,
    pub ball_vel_y: f32,
    pub left_paddle_y: f32,
    pub right_paddle_y: f32,
    pub player1_score: u32,
    pub player2_score: u32,
    /// Block centre, present only while a block is on the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_y: Option<f32>,
}

/// Sent to each player individually when play begins or after a rejoin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartMsg {
    pub side: Side,
    pub match_type: String,
    pub match_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndMsg {
    pub winner: Option<PlayerId>,
    pub reason: EndReason,
    /// `[player1, player2]`.
    pub final_score: [u32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePauseMsg {
    pub paused_at_epoch_millis: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEffectMsg {
    #[serde(rename = "type")]
    pub effect_type: FieldEffectKind,
    pub x_pos: f32,
    pub y_pos: f32,
    pub magnitude: f32,
}

/// Display names of both players, in side order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyStartMsg {
    pub player1: String,
    pub player2: String,
}

/// Outcome of a queue command or the reason a command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Queued,
    LeftQueue,
    AlreadyQueued,
    NotQueued,
    MatchPaused,
    Rejected,
    NoLongerActive,
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResponseMsg {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GameResponseMsg {
    pub fn new(status: ResponseStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    GameState(GameStateMsg),
    GameStart(GameStartMsg),
    GameEnd(GameEndMsg),
    GamePause(GamePauseMsg),
    FieldEffect(FieldEffectMsg),
    LobbyStart(LobbyStartMsg),
    GameResponse(GameResponseMsg),
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ServerMessage::GameState(_) => MessageType::GameState,
            ServerMessage::GameStart(_) => MessageType::GameStart,
            ServerMessage::GameEnd(_) => MessageType::GameEnd,
            ServerMessage::GamePause(_) => MessageType::GamePause,
            ServerMessage::FieldEffect(_) => MessageType::FieldEffect,
            ServerMessage::LobbyStart(_) => MessageType::LobbyStart,
            ServerMessage::GameResponse(_) => MessageType::GameResponse,
        }
    }
}
