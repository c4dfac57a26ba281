use super::*;

fn sample_frame() -> Frame {
    let mut data = Data::new();
    data.insert("row".into(), serde_json::json!(3.0));
    data.insert("letter".into(), serde_json::json!("Q"));
    data.insert("is_black".into(), serde_json::json!(false));
    data.insert("tags".into(), serde_json::json!(["a", "b"]));
    data.insert("nested".into(), serde_json::json!({"k": "v"}));
    data.insert("nil".into(), Value::Null);
    Frame {
        id: "id-1".to_owned(),
        parent_id: Some("parent-1".to_owned()),
        ts: 42,
        room_id: Some("QX7K2M".to_owned()),
        from: Some("client-1".to_owned()),
        syscall: "cell:set".to_owned(),
        status: Status::Done,
        data,
    }
}

fn empty_wire(status: i32, data: Option<prost_types::Value>) -> Vec<u8> {
    let wire = WireFrame {
        id: "id-1".to_owned(),
        parent_id: None,
        ts: 1,
        room_id: None,
        from: None,
        syscall: "room:join".to_owned(),
        status,
        data,
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");
    bytes
}

// =============================================================
// Status
// =============================================================

#[test]
fn status_numeric_mapping_matches_wire_enum() {
    assert_eq!(Status::Request.as_i32(), 0);
    assert_eq!(Status::Done.as_i32(), 1);
    assert_eq!(Status::Error.as_i32(), 2);
    assert_eq!(Status::Cancel.as_i32(), 3);
    assert_eq!(Status::Item.as_i32(), 4);
    assert_eq!(Status::Bulk.as_i32(), 5);
}

#[test]
fn status_from_wire_rejects_out_of_range_value() {
    let err = Status::from_i32(99).expect_err("status should be invalid");
    assert!(matches!(err, CodecError::InvalidStatus(99)));
}

#[test]
fn terminal_statuses() {
    assert!(Status::Done.is_terminal());
    assert!(Status::Error.is_terminal());
    assert!(Status::Cancel.is_terminal());
    assert!(!Status::Request.is_terminal());
    assert!(!Status::Item.is_terminal());
    assert!(!Status::Bulk.is_terminal());
}

#[test]
fn status_serializes_as_lowercase_json() {
    assert_eq!(serde_json::to_string(&Status::Request).expect("serialize"), "\"request\"");
    assert_eq!(serde_json::to_string(&Status::Cancel).expect("serialize"), "\"cancel\"");
}

#[test]
fn status_rejects_non_lowercase_json() {
    assert!(serde_json::from_str::<Status>("\"Error\"").is_err());
}

// =============================================================
// Constructors
// =============================================================

#[test]
fn request_sets_fields() {
    let frame = Frame::request("room:create", Data::new());
    assert_eq!(frame.syscall, "room:create");
    assert_eq!(frame.status, Status::Request);
    assert!(frame.parent_id.is_none());
    assert!(frame.room_id.is_none());
    assert!(frame.ts > 0);
}

#[test]
fn request_at_uses_given_timestamp() {
    let frame = Frame::request_at("strokes:set", Data::new(), 1234);
    assert_eq!(frame.ts, 1234);
}

#[test]
fn reply_inherits_context() {
    let req = Frame::request("cell:set", Data::new()).with_room_id("ABC123");
    let item = req.item(Data::new());

    assert_eq!(item.parent_id.as_deref(), Some(req.id.as_str()));
    assert_eq!(item.room_id.as_deref(), Some("ABC123"));
    assert_eq!(item.syscall, "cell:set");
    assert_eq!(item.status, Status::Item);
}

#[test]
fn done_with_carries_payload() {
    let req = Frame::request("room:join", Data::new());
    let mut data = Data::new();
    data.insert("participant_count".into(), serde_json::json!(2));
    let done = req.done_with(data);
    assert_eq!(done.status, Status::Done);
    assert_eq!(done.i64_field("participant_count"), Some(2));
}

#[test]
fn error_from_typed() {
    #[derive(Debug, thiserror::Error)]
    #[error("not found")]
    struct NotFound;

    impl ErrorCode for NotFound {
        fn error_code(&self) -> &'static str {
            "E_NOT_FOUND"
        }
    }

    let req = Frame::request("room:join", Data::new());
    let err = req.error_from(&NotFound);

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.str_field("code"), Some("E_NOT_FOUND"));
    assert_eq!(err.str_field("message"), Some("not found"));
    assert_eq!(err.data.get("retryable").and_then(Value::as_bool), Some(false));
}

#[test]
fn cancel_references_target() {
    let req = Frame::request("room:join", Data::new());
    let cancel = Frame::cancel(&req.id);
    assert_eq!(cancel.parent_id.as_deref(), Some(req.id.as_str()));
    assert!(cancel.status.is_terminal());
}

// =============================================================
// Routing helpers
// =============================================================

#[test]
fn prefix_and_op_extraction() {
    let frame = Frame::request("strokes:set", Data::new());
    assert_eq!(frame.prefix(), "strokes");
    assert_eq!(frame.op(), "set");

    let frame = Frame::request("noseparator", Data::new());
    assert_eq!(frame.prefix(), "noseparator");
    assert_eq!(frame.op(), "");
}

#[test]
fn i64_field_accepts_integral_floats_only() {
    let frame = Frame::request("cell:set", Data::new())
        .with_data("row", 4.0)
        .with_data("col", 2.5)
        .with_data("n", 7);
    assert_eq!(frame.i64_field("row"), Some(4));
    assert_eq!(frame.i64_field("col"), None);
    assert_eq!(frame.i64_field("n"), Some(7));
    assert_eq!(frame.i64_field("missing"), None);
}

// =============================================================
// Codecs
// =============================================================

#[test]
fn protobuf_round_trip_preserves_frame() {
    let frame = sample_frame();
    let decoded = decode_frame(&encode_frame(&frame)).expect("decode should succeed");
    assert_eq!(decoded, frame);
}

#[test]
fn json_round_trip_preserves_frame() {
    let frame = sample_frame();
    let text = encode_json(&frame).expect("encode");
    let decoded = decode_json(&text).expect("decode");
    assert_eq!(decoded, frame);
}

#[test]
fn json_frame_without_data_defaults_to_empty() {
    let text = r#"{"id":"x","parent_id":null,"ts":1,"from":null,"syscall":"room:part","status":"request"}"#;
    let frame = decode_json(text).expect("decode");
    assert!(frame.data.is_empty());
    assert!(frame.room_id.is_none());
}

#[test]
fn decode_frame_rejects_malformed_bytes() {
    let err = decode_frame(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_frame_rejects_invalid_wire_status() {
    let bytes = empty_wire(77, None);
    let err = decode_frame(&bytes).expect_err("status should fail");
    assert!(matches!(err, CodecError::InvalidStatus(77)));
}

#[test]
fn decode_frame_defaults_missing_data_to_empty_map() {
    let frame = decode_frame(&empty_wire(Status::Request.as_i32(), None)).expect("decode");
    assert!(frame.data.is_empty());
}

#[test]
fn decode_frame_rejects_scalar_payload() {
    let bytes = empty_wire(
        Status::Request.as_i32(),
        Some(prost_types::Value { kind: Some(prost_types::value::Kind::NumberValue(1.0)) }),
    );
    let err = decode_frame(&bytes).expect_err("scalar payload should fail");
    assert!(matches!(err, CodecError::InvalidPayload));
    assert_eq!(err.error_code(), "E_FRAME_PAYLOAD");
}

#[test]
fn integer_json_numbers_are_normalized_to_float_numbers() {
    let frame = Frame::request("cell:set", Data::new()).with_data("row", 2);
    let decoded = decode_frame(&encode_frame(&frame)).expect("decode");
    assert_eq!(decoded.data.get("row"), Some(&serde_json::json!(2.0)));
    assert_eq!(decoded.i64_field("row"), Some(2));
}
