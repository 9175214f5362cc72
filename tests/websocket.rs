//! Integration tests for the realtime fabric.
//!
//! Spins up a real HTTP server and drives it with websocket clients:
//! connect → create/join a game → receive room broadcasts → disconnect
//! cleanup.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chess_arena::api::router::create_router;
use chess_arena::api::state::AppState;
use chess_arena::config::AppConfig;

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Start the server on an OS-assigned port, return its base URL.
async fn start_server() -> String {
    let state = AppState::new(AppConfig::default());
    let app = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", addr.port())
}

/// Connect a websocket client, return (write, read) streams.
async fn ws_connect(base: &str) -> (WsWrite, WsRead) {
    let url = format!("{}/ws", base.replace("http://", "ws://"));
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    stream.split()
}

/// Send one `{event, payload}` frame.
async fn send_event(write: &mut WsWrite, event: &str, payload: Value) {
    let frame = json!({"event": event, "payload": payload}).to_string();
    write.send(Message::Text(frame.into())).await.unwrap();
}

/// Read the next text frame as JSON, with a timeout.
async fn next_event(read: &mut WsRead) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("timed out waiting for WS message")
            .expect("stream ended")
            .expect("WS error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("invalid JSON"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected Text message, got {other:?}"),
        }
    }
}

/// Create a game and seat both players; returns the game id. Consumes the
/// `game_started` broadcast on both clients.
async fn setup_game(
    white: &mut (WsWrite, WsRead),
    black: &mut (WsWrite, WsRead),
) -> String {
    send_event(&mut white.0, "create_game", json!({"mode": "rd_10m_0s"})).await;
    let created = next_event(&mut white.1).await;
    assert_eq!(created["event"], "game_created");
    let game_id = created["payload"]["gameId"].as_str().unwrap().to_string();

    send_event(
        &mut white.0,
        "join_game",
        json!({"gameId": game_id, "color": "white"}),
    )
    .await;
    assert_eq!(next_event(&mut white.1).await["event"], "joined");

    send_event(
        &mut black.0,
        "join_game",
        json!({"gameId": game_id, "color": "black"}),
    )
    .await;
    assert_eq!(next_event(&mut black.1).await["event"], "joined");

    assert_eq!(next_event(&mut white.1).await["event"], "game_started");
    assert_eq!(next_event(&mut black.1).await["event"], "game_started");

    game_id
}

// ---------------------------------------------------------------------------
// Room fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn moves_broadcast_to_the_room_but_not_outside() {
    let base = start_server().await;
    let mut white = ws_connect(&base).await;
    let mut black = ws_connect(&base).await;
    let mut outsider = ws_connect(&base).await;

    let game_id = setup_game(&mut white, &mut black).await;

    // Two moves from the seated players.
    send_event(
        &mut white.0,
        "make_move",
        json!({"gameId": game_id, "from": "e2", "to": "e4"}),
    )
    .await;
    let m1_white = next_event(&mut white.1).await;
    let m1_black = next_event(&mut black.1).await;
    assert_eq!(m1_white["event"], "move_made");
    assert_eq!(m1_black["event"], "move_made");
    assert_eq!(m1_black["payload"]["from"], "e2");
    assert_eq!(m1_black["payload"]["player"], "white");

    send_event(
        &mut black.0,
        "make_move",
        json!({"gameId": game_id, "from": "e7", "to": "e5"}),
    )
    .await;
    assert_eq!(next_event(&mut white.1).await["event"], "move_made");
    assert_eq!(next_event(&mut black.1).await["event"], "move_made");

    // The client that never joined the room hears nothing.
    let silence = tokio::time::timeout(Duration::from_millis(300), outsider.1.next()).await;
    assert!(silence.is_err(), "outsider must not receive room events");
}

#[tokio::test]
async fn games_are_isolated_from_each_other() {
    let base = start_server().await;
    let mut w1 = ws_connect(&base).await;
    let mut b1 = ws_connect(&base).await;
    let mut w2 = ws_connect(&base).await;
    let mut b2 = ws_connect(&base).await;

    let game1 = setup_game(&mut w1, &mut b1).await;
    let _game2 = setup_game(&mut w2, &mut b2).await;

    send_event(
        &mut w1.0,
        "make_move",
        json!({"gameId": game1, "from": "d2", "to": "d4"}),
    )
    .await;
    assert_eq!(next_event(&mut w1.1).await["event"], "move_made");
    assert_eq!(next_event(&mut b1.1).await["event"], "move_made");

    let cross = tokio::time::timeout(Duration::from_millis(300), w2.1.next()).await;
    assert!(cross.is_err(), "game2 players must not see game1 moves");
}

// ---------------------------------------------------------------------------
// Full game over the wire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fools_mate_produces_game_over_broadcast() {
    let base = start_server().await;
    let mut white = ws_connect(&base).await;
    let mut black = ws_connect(&base).await;

    let game_id = setup_game(&mut white, &mut black).await;

    let script = [
        (true, "f2", "f3"),
        (false, "e7", "e5"),
        (true, "g2", "g4"),
        (false, "d8", "h4"),
    ];
    for (is_white, from, to) in script {
        let writer = if is_white { &mut white.0 } else { &mut black.0 };
        send_event(
            writer,
            "make_move",
            json!({"gameId": game_id, "from": from, "to": to}),
        )
        .await;
        let w = next_event(&mut white.1).await;
        let b = next_event(&mut black.1).await;
        assert_eq!(w["event"], "move_made");
        assert_eq!(b["event"], "move_made");
    }

    // Terminal move triggers the end callback's room broadcast.
    let over_w = next_event(&mut white.1).await;
    let over_b = next_event(&mut black.1).await;
    assert_eq!(over_w["event"], "game_over");
    assert_eq!(over_b["event"], "game_over");
    assert_eq!(over_w["payload"]["result"], "checkmate");
    assert_eq!(over_w["payload"]["winner"], "black");
    assert_eq!(over_w["payload"]["moves"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn wrong_turn_move_gets_error_event() {
    let base = start_server().await;
    let mut white = ws_connect(&base).await;
    let mut black = ws_connect(&base).await;

    let game_id = setup_game(&mut white, &mut black).await;

    send_event(
        &mut black.0,
        "make_move",
        json!({"gameId": game_id, "from": "e7", "to": "e5"}),
    )
    .await;
    let err = next_event(&mut black.1).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["payload"]["message"], "invalid move: move out of turn");
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn limiter_drops_frames_beyond_burst() {
    let base = start_server().await;
    let (mut write, mut read) = ws_connect(&base).await;

    // Fire 15 create_game frames back to back; the bucket (burst 10,
    // 5 tokens/s) admits at most a few beyond ten even with refill.
    for _ in 0..15 {
        send_event(&mut write, "create_game", json!({"mode": "bt_1m_0s"})).await;
    }

    let mut created = 0;
    while let Ok(Some(Ok(Message::Text(text)))) =
        tokio::time::timeout(Duration::from_millis(500), read.next()).await
    {
        let frame: Value = serde_json::from_str(&text).unwrap();
        if frame["event"] == "game_created" {
            created += 1;
        }
    }

    assert!(created >= 10, "the burst itself passes, got {created}");
    assert!(created < 15, "frames beyond the burst are dropped");
}

// ---------------------------------------------------------------------------
// Protocol edges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_events_are_ignored() {
    let base = start_server().await;
    let (mut write, mut read) = ws_connect(&base).await;

    send_event(&mut write, "warp_drive", json!({})).await;
    // Still alive and serving afterwards.
    send_event(&mut write, "create_game", json!({})).await;
    assert_eq!(next_event(&mut read).await["event"], "game_created");
}

#[tokio::test]
async fn malformed_frame_closes_the_socket() {
    let base = start_server().await;
    let (mut write, mut read) = ws_connect(&base).await;

    write
        .send(Message::Text("this is not json".into()))
        .await
        .unwrap();

    // The server closes; the stream yields Close and then ends.
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => return true,
                _ => continue,
            }
        }
        true // stream ended
    })
    .await
    .expect("socket should close promptly");
    assert!(outcome);
}

// ---------------------------------------------------------------------------
// Disconnect cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disconnect_forfeits_and_leaves_rooms() {
    let base = start_server().await;
    let mut white = ws_connect(&base).await;
    let mut black = ws_connect(&base).await;

    let game_id = setup_game(&mut white, &mut black).await;
    let _ = game_id;

    // Black drops the connection; the disconnect hook forfeits their seat
    // and the room broadcast still reaches White.
    drop(black);

    let over = next_event(&mut white.1).await;
    assert_eq!(over["event"], "game_over");
    assert_eq!(over["payload"]["result"], "forfeit");
    assert_eq!(over["payload"]["winner"], "white");

    // The hub dropped the dead connection entirely.
    let client = reqwest::Client::new();
    let mut connections = usize::MAX;
    for _ in 0..50 {
        let body: Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        connections = body["connections"].as_u64().unwrap() as usize;
        if connections == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(connections, 1, "only white should remain connected");
}

#[tokio::test]
async fn health_endpoint_reports_counts() {
    let base = start_server().await;
    let _client_a = ws_connect(&base).await;
    let _client_b = ws_connect(&base).await;

    // Connections register asynchronously after the upgrade.
    let client = reqwest::Client::new();
    let mut connections = 0;
    for _ in 0..50 {
        let body: Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        connections = body["connections"].as_u64().unwrap() as usize;
        if connections == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(connections, 2);
}
