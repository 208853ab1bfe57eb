#[allow(dead_code)]
mod common;

use fieldpong_core::net::messages::{
    ClientMessage, GameStateMsg, JoinQueueMsg, LeaveQueueMsg, LobbyReadyMsg, PlayerMoveMsg,
    RejoinMsg, ResponseStatus, ServerMessage,
};
use fieldpong_core::net::protocol::{PROTOCOL_VERSION, encode_server_message};
use fieldpong_core::player::Side;
use fieldpong_core::state::EndReason;
use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use common::{
    TestServer, start_match, ws_connect, ws_join_queue, ws_read_lobby_start, ws_read_response,
    ws_read_until, ws_send_client_msg,
};

#[tokio::test]
async fn unidentified_connection_is_refused() {
    let server = TestServer::new().await;
    let url = format!("ws://{}/ws", server.addr);
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
}

#[tokio::test]
async fn join_queue_is_acknowledged() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url(1, "Alice")).await;

    ws_join_queue(&mut alice, "standard").await;
    assert_eq!(ws_read_response(&mut alice).await.status, ResponseStatus::Queued);

    ws_join_queue(&mut alice, "death").await;
    assert_eq!(
        ws_read_response(&mut alice).await.status,
        ResponseStatus::AlreadyQueued
    );
}

#[tokio::test]
async fn unknown_queue_type_is_rejected() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url(1, "Alice")).await;

    ws_join_queue(&mut alice, "ranked").await;
    let resp = ws_read_response(&mut alice).await;
    assert_eq!(resp.status, ResponseStatus::Rejected);
}

#[tokio::test]
async fn join_with_other_protocol_version_is_rejected() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url(1, "Alice")).await;

    let join = ClientMessage::JoinQueue(JoinQueueMsg {
        queue_type: "standard".to_string(),
        protocol_version: PROTOCOL_VERSION + 1,
    });
    ws_send_client_msg(&mut alice, &join).await;
    let resp = ws_read_response(&mut alice).await;
    assert_eq!(resp.status, ResponseStatus::Rejected);
    assert!(
        resp.message
            .as_deref()
            .is_some_and(|m| m.contains("protocol version mismatch"))
    );

    // The refused join left no queue entry behind.
    ws_join_queue(&mut alice, "standard").await;
    assert_eq!(ws_read_response(&mut alice).await.status, ResponseStatus::Queued);
}

#[tokio::test]
async fn leave_queue_twice_reports_not_queued() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url(1, "Alice")).await;

    ws_join_queue(&mut alice, "boring").await;
    ws_read_response(&mut alice).await;

    let leave = ClientMessage::LeaveQueue(LeaveQueueMsg {});
    ws_send_client_msg(&mut alice, &leave).await;
    assert_eq!(
        ws_read_response(&mut alice).await.status,
        ResponseStatus::LeftQueue
    );
    ws_send_client_msg(&mut alice, &leave).await;
    assert_eq!(
        ws_read_response(&mut alice).await.status,
        ResponseStatus::NotQueued
    );
}

#[tokio::test]
async fn paired_players_share_lobby_and_get_sides() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url(1, "Alice")).await;
    let mut bob = ws_connect(&server.ws_url(2, "Bob")).await;

    ws_join_queue(&mut alice, "standard").await;
    ws_read_response(&mut alice).await;
    ws_join_queue(&mut bob, "standard").await;
    ws_read_response(&mut bob).await;

    let lobby = ws_read_lobby_start(&mut alice).await;
    assert_eq!(lobby.player1, "Alice");
    assert_eq!(lobby.player2, "Bob");
    assert_eq!(ws_read_lobby_start(&mut bob).await, lobby);

    // A move before the handshake completes is refused.
    ws_send_client_msg(&mut bob, &ClientMessage::PlayerMove(PlayerMoveMsg { y: 100.0 })).await;
    assert_eq!(ws_read_response(&mut bob).await.status, ResponseStatus::Rejected);

    ws_send_client_msg(&mut alice, &ClientMessage::LobbyReady(LobbyReadyMsg {})).await;
    ws_send_client_msg(&mut bob, &ClientMessage::LobbyReady(LobbyReadyMsg {})).await;

    let alice_start = common::ws_read_game_start(&mut alice).await;
    let bob_start = common::ws_read_game_start(&mut bob).await;
    assert_eq!(alice_start.side, Side::Left);
    assert_eq!(bob_start.side, Side::Right);
    assert_eq!(alice_start.match_type, "standard");
    assert_eq!(alice_start.match_id, bob_start.match_id);
}

#[tokio::test]
async fn state_flows_and_moves_are_applied() {
    let server = TestServer::new().await;
    let (mut alice, _bob, _, _) = start_match(&server, "boring").await;

    let effect = ws_read_until(&mut alice, |m| matches!(m, ServerMessage::FieldEffect(_))).await;
    assert!(matches!(effect, ServerMessage::FieldEffect(_)));

    ws_send_client_msg(&mut alice, &ClientMessage::PlayerMove(PlayerMoveMsg { y: 200.0 })).await;
    let state = ws_read_until(&mut alice, |m| {
        matches!(m, ServerMessage::GameState(GameStateMsg { left_paddle_y, .. }) if *left_paddle_y == 200.0)
    })
    .await;
    match state {
        ServerMessage::GameState(gs) => {
            assert!(gs.tick > 0);
            assert!(gs.block_x.is_none());
        },
        other => panic!("Expected GameState, got: {other:?}"),
    }
}

#[tokio::test]
async fn server_only_messages_from_client_are_ignored() {
    let server = TestServer::new().await;
    let mut alice = ws_connect(&server.ws_url(1, "Alice")).await;

    let forged = encode_server_message(&ServerMessage::GameResponse(
        fieldpong_core::net::messages::GameResponseMsg::new(ResponseStatus::Resumed),
    ))
    .unwrap();
    alice.send(Message::Binary(forged.into())).await.unwrap();
    alice.send(Message::Binary(vec![0xEE, 0x00].into())).await.unwrap();

    ws_join_queue(&mut alice, "standard").await;
    // The first thing back answers the JoinQueue, not the forged frames.
    assert_eq!(
        ws_read_response(&mut alice).await.status,
        ResponseStatus::Queued
    );
}

#[tokio::test]
async fn disconnect_pauses_and_rejoin_resumes() {
    let server = TestServer::new().await;
    let (mut alice, bob, _, bob_start) = start_match(&server, "standard").await;

    drop(bob);
    let pause = ws_read_until(&mut alice, |m| matches!(m, ServerMessage::GamePause(_))).await;
    match pause {
        ServerMessage::GamePause(p) => assert!(p.paused_at_epoch_millis > 0),
        other => panic!("Expected GamePause, got: {other:?}"),
    }

    // Moves are refused while paused.
    ws_send_client_msg(&mut alice, &ClientMessage::PlayerMove(PlayerMoveMsg { y: 10.0 })).await;
    assert_eq!(
        ws_read_response(&mut alice).await.status,
        ResponseStatus::MatchPaused
    );

    let mut bob = ws_connect(&server.ws_url(2, "Bob")).await;
    ws_send_client_msg(
        &mut bob,
        &ClientMessage::Rejoin(RejoinMsg {
            match_id: bob_start.match_id.clone(),
            protocol_version: PROTOCOL_VERSION,
        }),
    )
    .await;

    assert_eq!(ws_read_response(&mut bob).await.status, ResponseStatus::Resumed);
    let resync = common::ws_read_game_start(&mut bob).await;
    assert_eq!(resync.side, Side::Right);
    assert_eq!(resync.match_id, bob_start.match_id);
    assert_eq!(
        ws_read_response(&mut alice).await.status,
        ResponseStatus::Resumed
    );
}

#[tokio::test]
async fn grace_expiry_awards_match_to_remaining_player() {
    let server = TestServer::with_grace_ms(100).await;
    let (mut alice, bob, _, _) = start_match(&server, "standard").await;

    drop(bob);
    let end = ws_read_until(&mut alice, |m| matches!(m, ServerMessage::GameEnd(_))).await;
    let ServerMessage::GameEnd(end) = end else {
        panic!("Expected GameEnd");
    };
    assert_eq!(end.reason, EndReason::Abandon);
    assert_eq!(end.winner, Some(1));
}

#[tokio::test]
async fn rejoin_after_end_is_no_longer_active() {
    let server = TestServer::with_grace_ms(50).await;
    let (mut alice, bob, _, bob_start) = start_match(&server, "standard").await;

    drop(bob);
    ws_read_until(&mut alice, |m| matches!(m, ServerMessage::GameEnd(_))).await;

    let mut bob = ws_connect(&server.ws_url(2, "Bob")).await;
    let rejoin = ClientMessage::Rejoin(RejoinMsg {
        match_id: bob_start.match_id,
        protocol_version: PROTOCOL_VERSION,
    });
    for _ in 0..2 {
        ws_send_client_msg(&mut bob, &rejoin).await;
        assert_eq!(
            ws_read_response(&mut bob).await.status,
            ResponseStatus::NoLongerActive
        );
    }
}

#[tokio::test]
async fn players_can_requeue_after_a_match() {
    let server = TestServer::with_grace_ms(50).await;
    let (mut alice, bob, _, _) = start_match(&server, "death").await;

    drop(bob);
    ws_read_until(&mut alice, |m| matches!(m, ServerMessage::GameEnd(_))).await;

    // Release happens right after the end is forwarded; retry briefly.
    let mut status = ResponseStatus::AlreadyQueued;
    for _ in 0..20 {
        ws_join_queue(&mut alice, "death").await;
        status = ws_read_response(&mut alice).await.status;
        if status == ResponseStatus::Queued {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(status, ResponseStatus::Queued);
}
