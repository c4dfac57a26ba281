use super::*;
use crate::state::test_helpers;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// One simulated websocket connection.
struct Conn {
    id: Uuid,
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
    room: Option<String>,
}

impl Conn {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(32);
        Self { id: Uuid::new_v4(), tx, rx, room: None }
    }

    async fn send(&mut self, state: &AppState, syscall: &str, data: Value) -> Vec<Frame> {
        let Value::Object(data) = data else {
            panic!("frame data must be an object");
        };
        let mut req = Frame::request(syscall, data);
        req.room_id.clone_from(&self.room);
        let text = frames::encode_json(&req).expect("request should encode");
        process_inbound_text(state, &mut self.room, self.id, &self.tx, &text).await
    }

    /// Send and expect exactly one reply.
    async fn call(&mut self, state: &AppState, syscall: &str, data: Value) -> Frame {
        let mut replies = self.send(state, syscall, data).await;
        assert_eq!(replies.len(), 1, "expected one reply to {syscall}");
        replies.remove(0)
    }
}

async fn recv_room_broadcast(rx: &mut mpsc::Receiver<Frame>) -> Frame {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("broadcast receive timed out")
        .expect("broadcast channel closed unexpectedly")
}

async fn assert_no_room_broadcast(rx: &mut mpsc::Receiver<Frame>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no broadcast frame"
    );
}

fn error_code(frame: &Frame) -> &str {
    assert_eq!(frame.status, Status::Error, "expected error frame, got {frame:?}");
    frame.str_field(frames::FRAME_CODE).unwrap_or("-")
}

/// Create a room over the socket and join two connections to it.
async fn joined_pair(state: &AppState) -> (String, Conn, Conn) {
    let mut a = Conn::new();
    let mut b = Conn::new();
    let created = a
        .call(state, "room:create", json!({"image_url": "https://images.test/p.png", "settings": {"rows": 5, "cols": 5}}))
        .await;
    let code = created.data["room"]["id"].as_str().expect("room id").to_owned();

    a.call(state, "room:join", json!({"room_id": code})).await;
    b.call(state, "room:join", json!({"room_id": code})).await;
    // A sees B's join.
    let notice = recv_room_broadcast(&mut a.rx).await;
    assert_eq!(notice.syscall, "room:join");
    (code, a, b)
}

// =============================================================================
// ROOM LIFECYCLE
// =============================================================================

#[tokio::test]
async fn room_create_replies_with_room() {
    let state = test_helpers::test_app_state();
    let mut conn = Conn::new();
    let reply = conn
        .call(&state, "room:create", json!({"image_url": "https://images.test/p.png", "settings": {"rows": 3, "cols": 4}}))
        .await;
    assert_eq!(reply.status, Status::Done);
    assert!(reply.parent_id.is_some());
    let room = &reply.data["room"];
    assert_eq!(room["settings"]["rows"], 3);
    assert_eq!(room["grid"].as_array().map(Vec::len), Some(3));
    let code = room["id"].as_str().unwrap();
    assert!(state.rooms.read().await.contains_key(code));
    assert!(conn.room.is_none(), "create does not join");
}

#[tokio::test]
async fn room_create_defaults_settings_and_requires_image() {
    let state = test_helpers::test_app_state();
    let mut conn = Conn::new();
    let reply = conn.call(&state, "room:create", json!({"image_url": "img"})).await;
    assert_eq!(reply.data["room"]["settings"]["rows"], 15);

    let reply = conn.call(&state, "room:create", json!({})).await;
    assert_eq!(error_code(&reply), "E_MISSING_FIELD");

    let reply = conn.call(&state, "room:create", json!({"image_url": "img", "settings": {"rows": "x"}})).await;
    assert_eq!(error_code(&reply), "E_INVALID_FIELD");
}

#[tokio::test]
async fn join_normalizes_code_and_notifies_peers() {
    let state = test_helpers::test_app_state();
    test_helpers::seed_room(&state, "ABC123").await;
    let mut a = Conn::new();
    let mut b = Conn::new();

    let reply = a.call(&state, "room:join", json!({"room_id": " abc123 "})).await;
    assert_eq!(reply.status, Status::Done);
    assert_eq!(reply.data["room"]["participant_count"], 1);
    assert_eq!(a.room.as_deref(), Some("ABC123"));

    b.call(&state, "room:join", json!({"room_id": "ABC123"})).await;
    let notice = recv_room_broadcast(&mut a.rx).await;
    assert_eq!(notice.syscall, "room:join");
    assert_eq!(notice.status, Status::Request);
    assert_eq!(notice.room_id.as_deref(), Some("ABC123"));
    assert_eq!(notice.data["participant_count"], 2);
    assert_eq!(notice.data["client_id"], json!(b.id));
    assert_no_room_broadcast(&mut b.rx).await;
}

#[tokio::test]
async fn join_rejects_bad_codes() {
    let state = test_helpers::test_app_state();
    let mut conn = Conn::new();
    let reply = conn.call(&state, "room:join", json!({})).await;
    assert_eq!(error_code(&reply), "E_MISSING_FIELD");
    let reply = conn.call(&state, "room:join", json!({"room_id": "AB-12"})).await;
    assert_eq!(error_code(&reply), "E_INVALID_ROOM_CODE");
    assert!(conn.room.is_none());
}

#[tokio::test]
async fn part_notifies_remaining_peers() {
    let state = test_helpers::test_app_state();
    let (code, mut a, mut b) = joined_pair(&state).await;

    let reply = b.call(&state, "room:part", json!({})).await;
    assert_eq!(reply.status, Status::Done);
    assert!(b.room.is_none());

    let notice = recv_room_broadcast(&mut a.rx).await;
    assert_eq!(notice.syscall, "room:part");
    assert_eq!(notice.data["participant_count"], 1);
    assert_eq!(state.rooms.read().await[&code].room.participant_count, 1);
}

#[tokio::test]
async fn switching_rooms_parts_the_old_one() {
    let state = test_helpers::test_app_state();
    let (_code, mut a, mut b) = joined_pair(&state).await;
    test_helpers::seed_room(&state, "ZZZ999").await;

    b.call(&state, "room:join", json!({"room_id": "ZZZ999"})).await;
    let notice = recv_room_broadcast(&mut a.rx).await;
    assert_eq!(notice.syscall, "room:part");
    assert_eq!(b.room.as_deref(), Some("ZZZ999"));
}

// =============================================================================
// PUZZLE WRITES
// =============================================================================

#[tokio::test]
async fn writes_require_a_joined_room() {
    let state = test_helpers::test_app_state();
    let mut conn = Conn::new();
    for syscall in ["cell:set", "strokes:set", "clue:set", "drawing:set", "room:settings"] {
        let reply = conn.call(&state, syscall, json!({})).await;
        assert_eq!(error_code(&reply), "E_NOT_JOINED", "{syscall}");
    }
}

#[tokio::test]
async fn cell_set_replies_and_broadcasts_without_parent() {
    let state = test_helpers::test_app_state();
    let (code, mut a, mut b) = joined_pair(&state).await;

    let reply = a
        .call(&state, "cell:set", json!({"cell": "1_2", "value": {"letter": "k", "is_black": false, "timestamp": 1}}))
        .await;
    assert_eq!(reply.status, Status::Done);
    assert!(reply.parent_id.is_some());
    assert_eq!(reply.data["value"]["letter"], "K");
    assert!(reply.data["value"]["timestamp"].as_i64().unwrap() > 1);

    let peer = recv_room_broadcast(&mut b.rx).await;
    assert_eq!(peer.syscall, "cell:set");
    assert_eq!(peer.status, Status::Done);
    assert!(peer.parent_id.is_none());
    assert_ne!(peer.id, reply.id);
    assert_eq!(peer.room_id.as_deref(), Some(code.as_str()));
    assert_eq!(peer.data["cell"], "1_2");
    assert_eq!(peer.data["value"], reply.data["value"]);
    assert_no_room_broadcast(&mut a.rx).await;
}

#[tokio::test]
async fn rejected_writes_do_not_broadcast() {
    let state = test_helpers::test_app_state();
    let (_code, mut a, mut b) = joined_pair(&state).await;

    let reply = a.call(&state, "cell:set", json!({"cell": "nope", "value": {}})).await;
    assert_eq!(error_code(&reply), "E_INVALID_CELL_KEY");
    let reply = a.call(&state, "cell:set", json!({"cell": "0_0"})).await;
    assert_eq!(error_code(&reply), "E_MISSING_FIELD");
    let reply = a
        .call(&state, "strokes:set", json!({"strokes": {"0_0": [{"points": [{"x": 1.0, "y": 1.0, "t": 1}]}]}}))
        .await;
    assert_eq!(error_code(&reply), "E_INVALID_STROKE");
    let reply = a.call(&state, "clue:set", json!({"marked": ["nope"]})).await;
    assert_eq!(error_code(&reply), "E_INVALID_CLUE");
    let reply = a.call(&state, "cell:get", json!({})).await;
    assert_eq!(error_code(&reply), "E_UNKNOWN_SYSCALL");

    assert_no_room_broadcast(&mut b.rx).await;
}

#[tokio::test]
async fn strokes_clues_and_drawing_broadcast_canonical_values() {
    let state = test_helpers::test_app_state();
    let (code, mut a, mut b) = joined_pair(&state).await;
    let stroke = json!({"points": [{"x": 1.0, "y": 2.0, "t": 1}, {"x": 9.0, "y": 8.0, "t": 2}]});

    a.call(&state, "strokes:set", json!({"strokes": {"2_3": [stroke]}})).await;
    let peer = recv_room_broadcast(&mut b.rx).await;
    assert_eq!(peer.syscall, "strokes:set");
    assert_eq!(peer.data["strokes"]["2_3"][0], stroke);

    a.call(&state, "clue:set", json!({"marked": ["3d", "1A"]})).await;
    let peer = recv_room_broadcast(&mut b.rx).await;
    assert_eq!(peer.data["marked"], json!(["1A", "3D"]));

    b.call(&state, "drawing:set", json!({"strokes": [stroke]})).await;
    let peer = recv_room_broadcast(&mut a.rx).await;
    assert_eq!(peer.syscall, "drawing:set");

    let rooms = state.rooms.read().await;
    let live = &rooms[&code];
    assert_eq!(live.room.cell_strokes.len(), 1);
    assert_eq!(live.room.shared_strokes.len(), 1);
    assert!(live.dirty);
}

#[tokio::test]
async fn settings_broadcast_and_resize() {
    let state = test_helpers::test_app_state();
    let (code, mut a, mut b) = joined_pair(&state).await;

    let reply = a
        .call(&state, "room:settings", json!({"settings": {"rows": 7, "cols": 9, "overlay": {"left": 5.0, "top": 5.0, "width": 90.0, "height": 90.0}}}))
        .await;
    assert_eq!(reply.data["settings"]["cols"], 9);
    let peer = recv_room_broadcast(&mut b.rx).await;
    assert_eq!(peer.syscall, "room:settings");
    assert_eq!(peer.data["settings"]["overlay"]["left"], 5.0);
    assert_eq!(state.rooms.read().await[&code].room.grid.len(), 7);
}

// =============================================================================
// WIRE
// =============================================================================

#[tokio::test]
async fn invalid_json_yields_gateway_error() {
    let state = test_helpers::test_app_state();
    let conn = Conn::new();
    let mut room = None;
    let replies = process_inbound_text(&state, &mut room, conn.id, &conn.tx, "{not json").await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].syscall, "gateway:error");
    assert_eq!(error_code(&replies[0]), "E_FRAME_DECODE");
}

#[tokio::test]
async fn binary_frames_are_accepted() {
    let state = test_helpers::test_app_state();
    test_helpers::seed_room(&state, "ABC123").await;
    let conn = Conn::new();
    let mut room = None;

    let req = Frame::request("room:join", Data::new()).with_room_id("ABC123");
    let bytes = frames::encode_frame(&req);
    let replies = process_inbound_bytes(&state, &mut room, conn.id, &conn.tx, &bytes).await;
    assert_eq!(replies[0].status, Status::Done);
    assert_eq!(replies[0].parent_id.as_deref(), Some(req.id.as_str()));
    assert_eq!(room.as_deref(), Some("ABC123"));

    let replies = process_inbound_bytes(&state, &mut room, conn.id, &conn.tx, &[0xff, 0xff, 0xff]).await;
    assert_eq!(replies[0].syscall, "gateway:error");
}

#[tokio::test]
async fn unknown_prefix_is_rejected() {
    let state = test_helpers::test_app_state();
    let mut conn = Conn::new();
    let reply = conn.call(&state, "cursor:move", json!({"x": 1})).await;
    assert_eq!(error_code(&reply), "E_UNKNOWN_SYSCALL");
}

// =============================================================================
// SOCKET
// =============================================================================

async fn next_frame<S>(socket: &mut S) -> Frame
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("socket receive timed out")
            .expect("socket closed")
            .expect("socket error");
        if let WsMessage::Text(text) = msg {
            return frames::decode_json(text.as_str()).expect("frame should decode");
        }
    }
}

#[tokio::test]
async fn socket_session_greets_and_creates_room() {
    let state = test_helpers::test_app_state();
    let app = crate::routes::app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws")).await.unwrap();

    let welcome = next_frame(&mut socket).await;
    assert_eq!(welcome.syscall, "session:connected");
    assert!(welcome.str_field("client_id").is_some());

    let req = Frame::request("room:create", Data::new()).with_data("image_url", "https://images.test/s.png");
    socket
        .send(WsMessage::Text(frames::encode_json(&req).unwrap().into()))
        .await
        .unwrap();
    let reply = next_frame(&mut socket).await;
    assert_eq!(reply.parent_id.as_deref(), Some(req.id.as_str()));
    let code = reply.data["room"]["id"].as_str().unwrap().to_owned();
    assert!(state.rooms.read().await.contains_key(&code));

    socket.close(None).await.unwrap();
}
