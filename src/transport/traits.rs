use crate::error::Result;
use crate::protocol::{DecodeError, Message};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

    /// Short tag used in thread names.
    pub fn tag(&self) -> &'static str {
        match self {
            IpFamily::V4 => "v4",
            IpFamily::V6 => "v6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => f.write_str("IPv4"),
            IpFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// One discovery channel for a single IP family.
/// Object-safe so browsers and publishers can run over real multicast or
/// over an in-process bus.
pub trait DiscoveryTransport: Send + Sync {
    fn family(&self) -> IpFamily;

    /// Transmit raw bytes to the group.
    fn send_datagram(&self, data: &[u8]) -> io::Result<()>;

    /// Serialize and transmit one message.
    fn send(&self, message: &Message) -> Result<()> {
        let bytes = message.to_bytes()?;
        self.send_datagram(&bytes)?;
        Ok(())
    }

    /// Block until a valid message arrives. Invalid datagrams are logged and
    /// skipped. Returns `None` once the transport is closed.
    fn receive(&self) -> Option<Message>;

    /// Idempotent; wakes a thread blocked in `receive`.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens one transport per family on `start`.
pub trait TransportFactory: Send + Sync {
    fn open(&self, family: IpFamily) -> Result<Arc<dyn DiscoveryTransport>>;
}

/// Decode one received datagram, logging and discarding anything invalid.
pub(crate) fn accept_datagram(data: &[u8], source: SocketAddr, family: IpFamily) -> Option<Message> {
    match Message::decode(data, Some(source)) {
        Ok(message) => {
            log::trace!("[{}] received {}", family, message);
            Some(message)
        }
        Err(DecodeError::Invalid(cause)) => {
            log::info!("[{}] dropping invalid message from {}: {}", family, source, cause);
            None
        }
        Err(e) => {
            log::debug!("[{}] dropping datagram from {}: {}", family, source, e);
            None
        }
    }
}
