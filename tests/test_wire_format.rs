/// Wire compatibility checks against hand-written datagrams, as other
/// chirp implementations put them on the network.

use chirp::protocol::{DecodeError, ValidationError};
use chirp::{Message, MessageType};
use serde_json::{Value, json};

const SENDER: &str = "0123456789abcdef0123456789abcdef";

#[test]
fn test_decode_foreign_publish() {
    let datagram = json!({
        "type": "publish",
        "sender_id": SENDER,
        "service_name": "printer",
        "ttl": 60,
        "payload": {"port": 631, "tags": ["color", "duplex"]},
        "extra": "ignored"
    });
    let source = "192.168.1.20:6464".parse().unwrap();
    let message = Message::decode(datagram.to_string().as_bytes(), Some(source)).unwrap();

    assert_eq!(message.kind, MessageType::Publish);
    assert_eq!(message.sender_id, SENDER);
    assert_eq!(message.ttl, 60);
    assert_eq!(message.payload.as_ref().unwrap()["port"], 631);
    assert_eq!(message.source_address, Some("192.168.1.20".parse().unwrap()));
}

#[test]
fn test_encoded_fields_per_type() {
    let hello: Value = serde_json::from_slice(&Message::new_listener(SENDER, "*").to_bytes().unwrap()).unwrap();
    assert_eq!(hello, json!({"type": "new_listener", "sender_id": SENDER, "service_name": "*"}));

    let goodbye: Value =
        serde_json::from_slice(&Message::remove_service(SENDER, "printer").to_bytes().unwrap()).unwrap();
    assert_eq!(goodbye, json!({"type": "remove_service", "sender_id": SENDER, "service_name": "printer"}));

    let announce: Value =
        serde_json::from_slice(&Message::publish(SENDER, "printer", 30, None).to_bytes().unwrap()).unwrap();
    assert_eq!(
        announce,
        json!({"type": "publish", "sender_id": SENDER, "service_name": "printer", "ttl": 30})
    );
}

#[test]
fn test_rejections_surface_first_failing_rule() {
    let decode = |value: Value| Message::decode(value.to_string().as_bytes(), None);

    let err = decode(json!({"type": "bogus", "service_name": "x"})).unwrap_err();
    assert!(matches!(err, DecodeError::Invalid(ValidationError::InvalidSenderId)));

    let err = decode(json!({"type": "bogus", "sender_id": SENDER})).unwrap_err();
    assert!(matches!(err, DecodeError::Invalid(ValidationError::MissingServiceName)));

    let err = decode(json!({"type": "publish", "sender_id": SENDER, "service_name": "x"})).unwrap_err();
    assert!(matches!(err, DecodeError::Invalid(ValidationError::InvalidTtl(0))));

    assert!(matches!(
        Message::decode(br#""just a string""#, None),
        Err(DecodeError::Malformed(_))
    ));
}
