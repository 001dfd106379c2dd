// Intermediate-message framing: [tag][payload] for user and control messages.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use task_state::control::{BytesSerde, JsonSerde, StringSerde};
use task_state::{
    ControlMessage, DrainMessage, EndOfStreamMessage, Error, IntermediateMessageCodec,
    MessageType, WatermarkMessage,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u64,
    sku: String,
}

fn arb_task() -> impl Strategy<Value = (String, u32)> {
    ("[a-z][a-z0-9-]{0,15}", 1u32..512)
}

fn arb_control() -> impl Strategy<Value = ControlMessage<Vec<u8>>> {
    prop_oneof![
        (arb_task(), any::<i64>()).prop_map(|((name, count), ts)| {
            ControlMessage::Watermark(WatermarkMessage::new(ts, name, count))
        }),
        arb_task().prop_map(|(name, count)| {
            ControlMessage::EndOfStream(EndOfStreamMessage::new(name, count))
        }),
        (arb_task(), prop::option::of("[0-9a-f]{8}")).prop_map(|((name, count), run)| {
            let drain = DrainMessage::new(name, count);
            ControlMessage::Drain(match run {
                Some(run) => drain.with_run_id(run),
                None => drain,
            })
        }),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(ControlMessage::User),
    ]
}

proptest! {
    #[test]
    fn prop_decode_inverts_encode(message in arb_control()) {
        let codec = IntermediateMessageCodec::new(BytesSerde);
        let bytes = codec.encode(&message).unwrap();
        prop_assert_eq!(bytes[0], message.message_type().tag());
        prop_assert_eq!(codec.decode::<Vec<u8>>(&bytes).unwrap(), message);
    }

    #[test]
    fn prop_unmapped_tags_are_unsupported(tag in 4u8..=u8::MAX, payload in prop::collection::vec(any::<u8>(), 0..16)) {
        let codec = IntermediateMessageCodec::new(BytesSerde);
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&payload);
        let err = codec.decode::<Vec<u8>>(&bytes).unwrap_err();
        prop_assert!(matches!(err, Error::UnsupportedMessageType(t) if t == tag));
    }
}

// =============================================================================
// Test 1: The concrete watermark, end-of-stream and drain messages round-trip
// =============================================================================
#[test]
fn control_messages_round_trip() {
    let codec = IntermediateMessageCodec::new(StringSerde);
    let messages: Vec<ControlMessage<String>> = vec![
        ControlMessage::Watermark(WatermarkMessage::new(100, "t1", 4)),
        ControlMessage::EndOfStream(EndOfStreamMessage::new("t1", 4)),
        ControlMessage::Drain(DrainMessage::new("t1", 4)),
    ];
    for message in messages {
        let decoded = codec.decode::<String>(&codec.encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert!(decoded.is_control());
        assert_eq!(decoded.task_name(), Some("t1"));
    }
}

// =============================================================================
// Test 2: User payloads use tag 0 and the injected serde
// =============================================================================
#[test]
fn user_message_round_trips_through_user_serde() {
    let codec = IntermediateMessageCodec::new(JsonSerde::<Order>::new());
    let order = Order {
        id: 7,
        sku: "A-1".into(),
    };

    let bytes = codec.encode(&ControlMessage::User(order.clone())).unwrap();
    assert_eq!(bytes[0], 0);
    assert_eq!(&bytes[1..], br#"{"id":7,"sku":"A-1"}"#);

    let decoded = codec.decode::<Order>(&bytes).unwrap();
    assert!(!decoded.is_control());
    assert_eq!(decoded, ControlMessage::User(order));
}

// =============================================================================
// Test 3: Wire bytes for a watermark
// =============================================================================
#[test]
fn watermark_wire_format() {
    let codec = IntermediateMessageCodec::new(BytesSerde);
    let message: ControlMessage<Vec<u8>> =
        ControlMessage::Watermark(WatermarkMessage::new(100, "t1", 4));
    let bytes = codec.encode(&message).unwrap();

    assert_eq!(bytes[0], 1);
    let json: serde_json::Value = serde_json::from_slice(&bytes[1..]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"version": 1, "taskName": "t1", "taskCount": 4, "timestamp": 100})
    );
}

// =============================================================================
// Test 4: Empty input is a legacy stream; tag 7 is unsupported
// =============================================================================
#[test]
fn decode_errors() {
    let codec = IntermediateMessageCodec::new(BytesSerde);

    let legacy = codec.decode::<Vec<u8>>(&[]).unwrap_err();
    assert!(matches!(legacy, Error::LegacyFormat));
    assert!(legacy.to_string().contains("payload is empty"));

    assert!(matches!(
        codec.decode::<Vec<u8>>(&[7]),
        Err(Error::UnsupportedMessageType(7))
    ));

    // A known tag with a payload that is not the right JSON.
    assert!(matches!(
        codec.decode::<Vec<u8>>(&[2, b'[', b']']),
        Err(Error::Serialization(_))
    ));
}

// =============================================================================
// Test 5: Older senders without a version field still decode
// =============================================================================
#[test]
fn missing_version_defaults_to_current() {
    let codec = IntermediateMessageCodec::new(BytesSerde);
    let mut bytes = vec![MessageType::Drain.tag()];
    bytes.extend_from_slice(br#"{"taskName":"t3","taskCount":2,"runId":"r-9"}"#);

    let decoded = codec.decode::<Vec<u8>>(&bytes).unwrap();
    assert_eq!(
        decoded,
        ControlMessage::Drain(DrainMessage::new("t3", 2).with_run_id("r-9"))
    );
}

// =============================================================================
// Test 6: Message-type names parse; unknown names are rejected
// =============================================================================
#[test]
fn message_type_names() {
    assert_eq!("WATERMARK".parse::<MessageType>().unwrap(), MessageType::Watermark);
    assert_eq!("drain".parse::<MessageType>().unwrap(), MessageType::Drain);
    assert_eq!(MessageType::UserMessage.to_string(), "USER_MESSAGE");
    assert!(matches!(
        "checkpoint".parse::<MessageType>(),
        Err(Error::UnknownMessageType(_))
    ));
}

// =============================================================================
// Test 7: Non-UTF-8 user payload fails the string serde
// =============================================================================
#[test]
fn string_serde_rejects_invalid_utf8() {
    let codec = IntermediateMessageCodec::new(StringSerde);
    assert!(matches!(
        codec.decode::<String>(&[0, 0xFF, 0xFE]),
        Err(Error::Serialization(_))
    ));
}
