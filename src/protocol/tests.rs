#[cfg(test)]
mod tests {
    use crate::error::ChirpError;
    use crate::protocol::{
        DecodeError, MAX_PAYLOAD_BYTES, Message, MessageType, Payload, ValidationError,
        is_valid_sender_id, is_valid_service_name,
    };
    use serde_json::{Value, json};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

    const SENDER: &str = "0123456789abcdef0123456789abcdef";

    fn decode_json(value: Value) -> Result<Message, DecodeError> {
        let bytes = serde_json::to_vec(&value).unwrap();
        Message::decode(&bytes, Some("192.168.1.20:6464".parse().unwrap()))
    }

    fn invalid_cause(value: Value) -> ValidationError {
        match decode_json(value) {
            Err(DecodeError::Invalid(cause)) => cause,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_service_name_rules() {
        for name in ["a", "demo", "com.example.printer", "A-b.C-9", &"x".repeat(64)] {
            assert!(is_valid_service_name(name), "{name:?} should be valid");
        }
        for name in ["", "has space", "under_score", "slash/", "é", "*", &"x".repeat(65)] {
            assert!(!is_valid_service_name(name), "{name:?} should be invalid");
        }
    }

    #[test]
    fn test_sender_id_rules() {
        assert!(is_valid_sender_id(SENDER));
        assert!(is_valid_sender_id("0123456789ABCDEF0123456789ABCDEF"));
        assert!(!is_valid_sender_id(&SENDER[..31]));
        assert!(!is_valid_sender_id(&format!("{SENDER}0")));
        assert!(!is_valid_sender_id("0123456789abcdef0123456789abcdeg"));
        assert!(!is_valid_sender_id(""));
    }

    #[test]
    fn test_publish_round_trip() {
        let mut payload = Payload::new();
        payload.insert("port".into(), json!(1337));
        payload.insert("name".into(), json!("kitchen"));
        let sent = Message::publish(SENDER, "demo", 30, Some(payload.clone()));

        let bytes = sent.to_bytes().unwrap();
        let received = Message::decode(&bytes, None).unwrap();

        assert_eq!(received.kind, MessageType::Publish);
        assert_eq!(received.sender_id, SENDER);
        assert_eq!(received.service_name, "demo");
        assert_eq!(received.ttl, 30);
        assert_eq!(received.payload, Some(payload));
    }

    #[test]
    fn test_payload_keeps_key_order() {
        let mut payload = Payload::new();
        payload.insert("zeta".into(), json!(1));
        payload.insert("alpha".into(), json!(2));
        let bytes = Message::publish(SENDER, "demo", 10, Some(payload)).to_bytes().unwrap();
        let received = Message::decode(&bytes, None).unwrap();
        let keys: Vec<_> = received.payload.unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_sparse_serialization() {
        let hello: Value =
            serde_json::from_slice(&Message::new_listener(SENDER, "*").to_bytes().unwrap()).unwrap();
        assert_eq!(hello, json!({"type": "new_listener", "sender_id": SENDER, "service_name": "*"}));

        let bye: Value = serde_json::from_slice(
            &Message::remove_service(SENDER, "demo").to_bytes().unwrap(),
        )
        .unwrap();
        assert_eq!(bye, json!({"type": "remove_service", "sender_id": SENDER, "service_name": "demo"}));

        let publish: Value =
            serde_json::from_slice(&Message::publish(SENDER, "demo", 60, None).to_bytes().unwrap())
                .unwrap();
        assert_eq!(
            publish,
            json!({"type": "publish", "sender_id": SENDER, "service_name": "demo", "ttl": 60})
        );
    }

    #[test]
    fn test_oversized_payload_rejected_before_send() {
        let mut payload = Payload::new();
        payload.insert("blob".into(), json!("x".repeat(MAX_PAYLOAD_BYTES)));
        let message = Message::publish(SENDER, "demo", 60, Some(payload));
        assert!(matches!(message.to_bytes(), Err(ChirpError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_validation_order() {
        // A bad sender id wins over every other fault.
        assert_eq!(
            invalid_cause(json!({"type": "bogus", "sender_id": "nope"})),
            ValidationError::InvalidSenderId
        );
        assert_eq!(
            invalid_cause(json!({"type": "bogus", "sender_id": SENDER})),
            ValidationError::MissingServiceName
        );
        assert_eq!(
            invalid_cause(json!({"type": "bogus", "sender_id": SENDER, "service_name": "demo"})),
            ValidationError::UnknownMessageType("bogus".into())
        );
    }

    #[test]
    fn test_per_type_rules() {
        assert_eq!(
            invalid_cause(json!({"type": "publish", "sender_id": SENDER, "service_name": "demo", "ttl": 9})),
            ValidationError::InvalidTtl(9)
        );
        assert_eq!(
            invalid_cause(json!({"type": "publish", "sender_id": SENDER, "service_name": "demo"})),
            ValidationError::InvalidTtl(0)
        );
        assert_eq!(
            invalid_cause(json!({"type": "publish", "sender_id": SENDER, "service_name": "*", "ttl": 60})),
            ValidationError::InvalidServiceName
        );
        assert_eq!(
            invalid_cause(json!({"type": "remove_service", "sender_id": SENDER, "service_name": "a b"})),
            ValidationError::InvalidServiceName
        );
        assert!(decode_json(json!({"type": "new_listener", "sender_id": SENDER, "service_name": "*"})).is_ok());
        assert_eq!(
            invalid_cause(json!({"type": "new_listener", "sender_id": SENDER, "service_name": "a b"})),
            ValidationError::InvalidServiceName
        );
    }

    #[test]
    fn test_extra_fields_dropped_for_non_publish() {
        let message = decode_json(json!({
            "type": "remove_service",
            "sender_id": SENDER,
            "service_name": "demo",
            "ttl": 60,
            "payload": {"a": 1}
        }))
        .unwrap();
        assert_eq!(message.ttl, 0);
        assert!(message.payload.is_none());
    }

    #[test]
    fn test_malformed_datagrams() {
        assert!(matches!(Message::decode(b"", None), Err(DecodeError::Empty)));
        assert!(matches!(Message::decode(b"{not json", None), Err(DecodeError::Malformed(_))));
        assert!(matches!(Message::decode(b"[1,2,3]", None), Err(DecodeError::Malformed(_))));
        let wrong_type = json!({"type": "publish", "sender_id": SENDER, "service_name": "demo", "ttl": "sixty"});
        assert!(matches!(decode_json(wrong_type), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_source_address_attached() {
        let bytes = Message::remove_service(SENDER, "demo").to_bytes().unwrap();

        let v4 = Message::decode(&bytes, Some("10.0.0.7:6464".parse().unwrap())).unwrap();
        assert_eq!(v4.source_address, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));
        assert!(!v4.is_ipv6());

        let scoped: Ipv6Addr = "fe80::1".parse().unwrap();
        let source = SocketAddr::V6(SocketAddrV6::new(scoped, 6464, 0, 3));
        let v6 = Message::decode(&bytes, Some(source)).unwrap();
        assert_eq!(v6.source_address, Some(IpAddr::V6(scoped)));
        assert!(v6.is_ipv6());
        assert_eq!(v6.source_address.unwrap().to_string(), "fe80::1");

        let mapped = Message::decode(&bytes, Some("[::ffff:10.0.0.7]:6464".parse().unwrap())).unwrap();
        assert_eq!(mapped.source_address, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));
    }

    #[test]
    fn test_outgoing_validate() {
        assert!(Message::publish(SENDER, "demo", 10, None).validate().is_ok());
        assert_eq!(
            Message::publish(SENDER, "demo", 9, None).validate(),
            Err(ValidationError::InvalidTtl(9))
        );
        assert_eq!(
            Message::new_listener("short", "*").validate(),
            Err(ValidationError::InvalidSenderId)
        );
    }
}
