use super::*;

fn sample_frame() -> Frame {
    Frame {
        id: "id-1".to_owned(),
        parent_id: Some("parent-1".to_owned()),
        ts: 42,
        from: Some("client-1".to_owned()),
        event: "contractUpdated".to_owned(),
        status: Status::Event,
        data: serde_json::json!({
            "salary": 1.25,
            "active": true,
            "tags": ["a", "b"],
            "nested": {"k": "v"},
            "nil": null
        }),
    }
}

#[test]
fn status_numeric_mapping_matches_wire_enum() {
    assert_eq!(Status::Event.as_i32(), 0);
    assert_eq!(Status::Ack.as_i32(), 1);
    assert_eq!(Status::Error.as_i32(), 2);
}

#[test]
fn status_from_wire_rejects_out_of_range_value() {
    let err = Status::from_i32(99).expect_err("status should be invalid");
    assert!(matches!(err, CodecError::InvalidStatus(99)));
}

#[test]
fn encode_decode_preserves_frame() {
    let frame = sample_frame();
    let decoded = decode_frame(&encode_frame(&frame)).expect("decode should succeed");
    assert_eq!(decoded, frame);
}

#[test]
fn decode_frame_rejects_malformed_bytes() {
    let err = decode_frame(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_frame_rejects_invalid_wire_status() {
    let wire = WireFrame {
        id: "id-1".to_owned(),
        parent_id: None,
        ts: 1,
        from: None,
        event: "jobCreated".to_owned(),
        status: 77,
        data: Some(json_to_proto_value(&serde_json::json!({}))),
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let err = decode_frame(&bytes).expect_err("status should fail");
    assert!(matches!(err, CodecError::InvalidStatus(77)));
}

#[test]
fn decode_frame_defaults_missing_data_to_empty_object() {
    let wire = WireFrame {
        id: "id-1".to_owned(),
        parent_id: None,
        ts: 1,
        from: None,
        event: "jobDeleted".to_owned(),
        status: Status::Event.as_i32(),
        data: None,
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let frame = decode_frame(&bytes).expect("decode");
    assert_eq!(frame.data, serde_json::json!({}));
}

#[test]
fn decode_frame_converts_nan_number_to_json_null() {
    let wire = WireFrame {
        id: "id-1".to_owned(),
        parent_id: None,
        ts: 1,
        from: None,
        event: "jobUpdated".to_owned(),
        status: Status::Event.as_i32(),
        data: Some(prost_types::Value {
            kind: Some(prost_types::value::Kind::NumberValue(f64::NAN)),
        }),
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let frame = decode_frame(&bytes).expect("decode");
    assert_eq!(frame.data, Value::Null);
}

#[test]
fn integral_numbers_decode_as_json_integers() {
    let frame = Frame::event("departmentUpdated", serde_json::json!({"employeeCount": 12, "budget": 2.5}));
    let decoded = decode_frame(&encode_frame(&frame)).expect("decode");

    assert_eq!(decoded.data["employeeCount"], serde_json::json!(12));
    assert_eq!(decoded.data["employeeCount"].as_u64(), Some(12));
    assert_eq!(decoded.data["budget"], serde_json::json!(2.5));
}

#[test]
fn event_constructor_sets_fields() {
    let frame = Frame::event("applicantCreated", serde_json::json!({"id": "a1"}));
    assert_eq!(frame.event, "applicantCreated");
    assert_eq!(frame.status, Status::Event);
    assert!(frame.parent_id.is_none());
    assert!(frame.ts > 0);
    assert!(!frame.id.is_empty());
}

#[test]
fn ack_references_event_and_keeps_name() {
    let event = Frame::event("contractDeleted", serde_json::json!({"id": "c1"}));
    let ack = event.ack(serde_json::json!({"delivered": 2}));

    assert_eq!(ack.parent_id.as_deref(), Some(event.id.as_str()));
    assert_eq!(ack.event, "contractDeleted");
    assert_eq!(ack.status, Status::Ack);
    assert_ne!(ack.id, event.id);
}

#[test]
fn error_reply_carries_message() {
    let event = Frame::event("bogus", Value::Null);
    let err = event.error("unknown event");

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.data[FRAME_MESSAGE], "unknown event");
}

#[test]
fn with_from_stamps_origin() {
    let frame = Frame::event("jobCreated", Value::Null).with_from("client-9");
    assert_eq!(frame.from.as_deref(), Some("client-9"));
}

#[test]
fn status_serializes_as_lowercase_json() {
    assert_eq!(serde_json::to_string(&Status::Event).expect("serialize"), "\"event\"");
    assert_eq!(serde_json::to_string(&Status::Ack).expect("serialize"), "\"ack\"");
}
