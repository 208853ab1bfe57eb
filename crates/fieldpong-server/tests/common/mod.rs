use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use fieldpong_core::net::messages::{
    ClientMessage, GameResponseMsg, GameStartMsg, JoinQueueMsg, LobbyReadyMsg, LobbyStartMsg,
    ServerMessage,
};
use fieldpong_core::net::protocol::{
    PROTOCOL_VERSION, decode_server_message, encode_client_message,
};
use fieldpong_core::player::PlayerId;

use fieldpong_server::build_app;
use fieldpong_server::config::ServerConfig;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with a fast tick and a seeded match RNG.
    pub async fn new() -> Self {
        Self::from_config(Self::fast_config()).await
    }

    /// Start a test server with a short reconnection window.
    pub async fn with_grace_ms(pause_grace_ms: u64) -> Self {
        let mut config = Self::fast_config();
        config.matches.pause_grace_ms = pause_grace_ms;
        Self::from_config(config).await
    }

    pub fn fast_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.matches.tick_interval_ms = 10;
        config.matches.seed = Some(7);
        config
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, player_id: PlayerId, name: &str) -> String {
        format!("ws://{}/ws?player_id={player_id}&name={name}", self.addr)
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send a ClientMessage from a WS stream.
pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Read the next ServerMessage from a WebSocket stream (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Read until a message satisfies `pred`, skipping snapshots and anything else.
pub async fn ws_read_until<F>(stream: &mut WsStream, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            let msg = ws_read_server_msg(stream).await;
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("Timed out waiting for matching message")
}

/// Read until the next GameResponse.
pub async fn ws_read_response(stream: &mut WsStream) -> GameResponseMsg {
    match ws_read_until(stream, |m| matches!(m, ServerMessage::GameResponse(_))).await {
        ServerMessage::GameResponse(resp) => resp,
        other => panic!("Expected GameResponse, got: {other:?}"),
    }
}

pub async fn ws_join_queue(stream: &mut WsStream, queue_type: &str) {
    let msg = ClientMessage::JoinQueue(JoinQueueMsg {
        queue_type: queue_type.to_string(),
        protocol_version: PROTOCOL_VERSION,
    });
    ws_send_client_msg(stream, &msg).await;
}

pub async fn ws_read_lobby_start(stream: &mut WsStream) -> LobbyStartMsg {
    match ws_read_until(stream, |m| matches!(m, ServerMessage::LobbyStart(_))).await {
        ServerMessage::LobbyStart(lobby) => lobby,
        other => panic!("Expected LobbyStart, got: {other:?}"),
    }
}

pub async fn ws_read_game_start(stream: &mut WsStream) -> GameStartMsg {
    match ws_read_until(stream, |m| matches!(m, ServerMessage::GameStart(_))).await {
        ServerMessage::GameStart(start) => start,
        other => panic!("Expected GameStart, got: {other:?}"),
    }
}

/// Connect two players, queue them for `queue_type`, and play through the
/// lobby handshake. Returns both streams and the GameStart each received.
pub async fn start_match(
    server: &TestServer,
    queue_type: &str,
) -> (WsStream, WsStream, GameStartMsg, GameStartMsg) {
    let mut alice = ws_connect(&server.ws_url(1, "Alice")).await;
    let mut bob = ws_connect(&server.ws_url(2, "Bob")).await;

    ws_join_queue(&mut alice, queue_type).await;
    ws_read_response(&mut alice).await;
    ws_join_queue(&mut bob, queue_type).await;
    ws_read_response(&mut bob).await;

    ws_read_lobby_start(&mut alice).await;
    ws_read_lobby_start(&mut bob).await;

    ws_send_client_msg(&mut alice, &ClientMessage::LobbyReady(LobbyReadyMsg {})).await;
    ws_send_client_msg(&mut bob, &ClientMessage::LobbyReady(LobbyReadyMsg {})).await;

    let alice_start = ws_read_game_start(&mut alice).await;
    let bob_start = ws_read_game_start(&mut bob).await;
    (alice, bob, alice_start, bob_start)
}
