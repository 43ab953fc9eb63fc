use super::identity::{WILDCARD, is_valid_sender_id, is_valid_service_name};
use crate::error::{ChirpError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Arbitrary ordered key/value data attached to a published service.
pub type Payload = Map<String, Value>;

/// Largest serialized payload a publisher may attach.
pub const MAX_PAYLOAD_BYTES: usize = 32 * 1024;

/// Largest datagram a transport will read.
pub const MAX_DATAGRAM_BYTES: usize = 64 * 1024;

/// Smallest TTL a publish message may carry, in seconds.
pub const MIN_TTL: u32 = 10;

/// TTL used by publishers unless configured otherwise.
pub const DEFAULT_TTL: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A browser asking publishers to announce themselves now.
    NewListener,
    /// A publisher announcing (or re-announcing) its service.
    Publish,
    /// A publisher withdrawing its service.
    RemoveService,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NewListener => "new_listener",
            MessageType::Publish => "publish",
            MessageType::RemoveService => "remove_service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new_listener" => Some(MessageType::NewListener),
            "publish" => Some(MessageType::Publish),
            "remove_service" => Some(MessageType::RemoveService),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a candidate message was rejected. The variant is the kind, the
/// `Display` text is the human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid sender id")]
    InvalidSenderId,
    #[error("missing service name")]
    MissingServiceName,
    #[error("invalid service name")]
    InvalidServiceName,
    #[error("invalid ttl {0}")]
    InvalidTtl(i64),
    #[error("unknown message type {0:?}")]
    UnknownMessageType(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),
}

/// Datagram body as received. Every field is optional so that validation,
/// not the JSON parser, decides what is missing.
#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default)]
    ttl: Option<i64>,
    #[serde(default)]
    payload: Option<Payload>,
}

/// Sparse outgoing form: `ttl` and `payload` only appear on `publish`.
#[derive(Serialize)]
struct OutgoingMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    sender_id: &'a str,
    service_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a Payload>,
}

/// A validated chirp message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageType,
    pub sender_id: String,
    pub service_name: String,
    /// Seconds; only meaningful for `publish`, zero otherwise.
    pub ttl: u32,
    pub payload: Option<Payload>,
    /// Set by the receiving transport, never serialized. `IpAddr` has no
    /// zone index, so an IPv6 scope suffix never survives into it.
    pub source_address: Option<IpAddr>,
}

impl Message {
    pub fn new_listener(sender_id: impl Into<String>, filter: impl Into<String>) -> Self {
        Message {
            kind: MessageType::NewListener,
            sender_id: sender_id.into(),
            service_name: filter.into(),
            ttl: 0,
            payload: None,
            source_address: None,
        }
    }

    pub fn publish(
        sender_id: impl Into<String>,
        service_name: impl Into<String>,
        ttl: u32,
        payload: Option<Payload>,
    ) -> Self {
        Message {
            kind: MessageType::Publish,
            sender_id: sender_id.into(),
            service_name: service_name.into(),
            ttl,
            payload,
            source_address: None,
        }
    }

    pub fn remove_service(sender_id: impl Into<String>, service_name: impl Into<String>) -> Self {
        Message {
            kind: MessageType::RemoveService,
            sender_id: sender_id.into(),
            service_name: service_name.into(),
            ttl: 0,
            payload: None,
            source_address: None,
        }
    }

    /// Decode one datagram, attach the sender's address and validate it.
    pub fn decode(bytes: &[u8], source: Option<SocketAddr>) -> std::result::Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let wire: WireMessage = serde_json::from_slice(bytes)?;
        let mut message = validate(wire)?;
        message.source_address = source.map(|addr| addr.ip().to_canonical());
        Ok(message)
    }

    /// Serialize for transmission. Fails locally on an oversized payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let is_publish = self.kind == MessageType::Publish;
        if is_publish {
            if let Some(payload) = &self.payload {
                check_payload_size(payload)?;
            }
        }
        let outgoing = OutgoingMessage {
            kind: self.kind.as_str(),
            sender_id: &self.sender_id,
            service_name: &self.service_name,
            ttl: is_publish.then_some(self.ttl),
            payload: if is_publish { self.payload.as_ref() } else { None },
        };
        Ok(serde_json::to_vec(&outgoing)?)
    }

    /// Run the same checks a receiver would.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        check_fields(
            self.kind.as_str(),
            &self.sender_id,
            &self.service_name,
            i64::from(self.ttl),
        )
        .map(|_| ())
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.source_address, Some(IpAddr::V6(_)))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} for {:?}", self.kind, self.sender_id, self.service_name)?;
        if let Some(addr) = self.source_address {
            write!(f, " via {}", addr)?;
        }
        Ok(())
    }
}

/// Serialized size of a payload, or an error if it exceeds the limit.
pub fn check_payload_size(payload: &Payload) -> Result<usize> {
    let size = serde_json::to_vec(payload)?.len();
    if size > MAX_PAYLOAD_BYTES {
        return Err(ChirpError::PayloadTooLarge {
            size,
            max: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(size)
}

fn validate(wire: WireMessage) -> std::result::Result<Message, ValidationError> {
    let kind = wire.kind.unwrap_or_default();
    let sender_id = wire.sender_id.unwrap_or_default();
    let service_name = wire.service_name.unwrap_or_default();
    let ttl = wire.ttl.unwrap_or(0);

    let kind = check_fields(&kind, &sender_id, &service_name, ttl)?;
    let (ttl, payload) = match kind {
        // checked against MIN_TTL and u32::MAX above
        MessageType::Publish => (ttl as u32, wire.payload),
        _ => (0, None),
    };

    Ok(Message {
        kind,
        sender_id,
        service_name,
        ttl,
        payload,
        source_address: None,
    })
}

fn check_fields(
    kind: &str,
    sender_id: &str,
    service_name: &str,
    ttl: i64,
) -> std::result::Result<MessageType, ValidationError> {
    if !is_valid_sender_id(sender_id) {
        return Err(ValidationError::InvalidSenderId);
    }
    if service_name.is_empty() {
        return Err(ValidationError::MissingServiceName);
    }

    let kind = MessageType::parse(kind)
        .ok_or_else(|| ValidationError::UnknownMessageType(kind.to_string()))?;
    match kind {
        MessageType::NewListener => {
            if service_name != WILDCARD && !is_valid_service_name(service_name) {
                return Err(ValidationError::InvalidServiceName);
            }
        }
        MessageType::Publish => {
            if !is_valid_service_name(service_name) {
                return Err(ValidationError::InvalidServiceName);
            }
            if ttl < i64::from(MIN_TTL) || ttl > i64::from(u32::MAX) {
                return Err(ValidationError::InvalidTtl(ttl));
            }
        }
        MessageType::RemoveService => {
            if !is_valid_service_name(service_name) {
                return Err(ValidationError::InvalidServiceName);
            }
        }
    }
    Ok(kind)
}
