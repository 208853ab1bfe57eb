use serde::{Deserialize, Serialize};

use super::messages::{
    ClientMessage, FieldEffectMsg, GameEndMsg, GamePauseMsg, GameResponseMsg, GameStartMsg,
    GameStateMsg, JoinQueueMsg, LeaveQueueMsg, LobbyReadyMsg, LobbyStartMsg, MessageType,
    PlayerMoveMsg, RejoinMsg, ServerMessage,
};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
    VersionMismatch { client: u8, server: u8 },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
            Self::VersionMismatch { client, server } => {
                write!(f, "protocol version mismatch: client={client}, server={server}")
            },
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Accept a client-declared protocol version. `0` is treated as unspecified.
pub fn check_protocol_version(client: u8) -> Result<(), ProtocolError> {
    if client != 0 && client != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            client,
            server: PROTOCOL_VERSION,
        });
    }
    Ok(())
}

/// Encode a serializable payload with a 1-byte type prefix.
///
/// Payloads are MessagePack maps keyed by field name so clients can ignore
/// fields they do not know.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes = rmp_serde::to_vec_named(payload)
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    let mt = msg.message_type();
    match msg {
        ClientMessage::PlayerMove(m) => encode_message(mt, m),
        ClientMessage::JoinQueue(m) => encode_message(mt, m),
        ClientMessage::LeaveQueue(m) => encode_message(mt, m),
        ClientMessage::LobbyReady(m) => encode_message(mt, m),
        ClientMessage::Rejoin(m) => encode_message(mt, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    let mt = msg.message_type();
    match msg {
        ServerMessage::GameState(m) => encode_message(mt, m),
        ServerMessage::GameStart(m) => encode_message(mt, m),
        ServerMessage::GameEnd(m) => encode_message(mt, m),
        ServerMessage::GamePause(m) => encode_message(mt, m),
        ServerMessage::FieldEffect(m) => encode_message(mt, m),
        ServerMessage::LobbyStart(m) => encode_message(mt, m),
        ServerMessage::GameResponse(m) => encode_message(mt, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(data.len()));
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::PlayerMove => Ok(ClientMessage::PlayerMove(decode_payload::<
            PlayerMoveMsg,
        >(data)?)),
        MessageType::JoinQueue => Ok(ClientMessage::JoinQueue(decode_payload::<JoinQueueMsg>(
            data,
        )?)),
        MessageType::LeaveQueue => Ok(ClientMessage::LeaveQueue(decode_payload::<
            LeaveQueueMsg,
        >(data)?)),
        MessageType::LobbyReady => Ok(ClientMessage::LobbyReady(decode_payload::<
            LobbyReadyMsg,
        >(data)?)),
        MessageType::Rejoin => Ok(ClientMessage::Rejoin(decode_payload::<RejoinMsg>(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::GameState => Ok(ServerMessage::GameState(decode_payload::<GameStateMsg>(
            data,
        )?)),
        MessageType::GameStart => Ok(ServerMessage::GameStart(decode_payload::<GameStartMsg>(
            data,
        )?)),
        MessageType::GameEnd => Ok(ServerMessage::GameEnd(decode_payload::<GameEndMsg>(data)?)),
        MessageType::GamePause => Ok(ServerMessage::GamePause(decode_payload::<GamePauseMsg>(
            data,
        )?)),
        MessageType::FieldEffect => Ok(ServerMessage::FieldEffect(decode_payload::<
            FieldEffectMsg,
        >(data)?)),
        MessageType::LobbyStart => Ok(ServerMessage::LobbyStart(decode_payload::<
            LobbyStartMsg,
        >(data)?)),
        MessageType::GameResponse => Ok(ServerMessage::GameResponse(decode_payload::<
            GameResponseMsg,
        >(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}
