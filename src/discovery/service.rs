use crate::protocol::Payload;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Instant;

/// A service discovered on the network.
///
/// Identity is the publisher's instance id alone; two snapshots of the same
/// publisher compare equal whatever their addresses or payload.
#[derive(Debug, Clone)]
pub struct Service {
    pub(crate) publisher_id: String,
    pub(crate) name: String,
    pub(crate) payload: Option<Payload>,
    pub(crate) v4: Option<Ipv4Addr>,
    pub(crate) v4_expiry: Option<Instant>,
    pub(crate) v6: Option<Ipv6Addr>,
    pub(crate) v6_expiry: Option<Instant>,
    pub(crate) expiry: Instant,
}

impl Service {
    pub(crate) fn new(publisher_id: String, name: String, payload: Option<Payload>, expiry: Instant) -> Self {
        Service {
            publisher_id,
            name,
            payload,
            v4: None,
            v4_expiry: None,
            v6: None,
            v6_expiry: None,
            expiry,
        }
    }

    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// `None` until an announcement arrives over IPv4.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.v4
    }

    /// `None` until an announcement arrives over IPv6.
    pub fn ipv6(&self) -> Option<Ipv6Addr> {
        self.v6
    }

    /// Every known address, IPv4 first.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.v4
            .map(IpAddr::V4)
            .into_iter()
            .chain(self.v6.map(IpAddr::V6))
            .collect()
    }

    pub fn expiry(&self) -> Instant {
        self.expiry
    }

    pub fn v4_expiry(&self) -> Option<Instant> {
        self.v4_expiry
    }

    pub fn v6_expiry(&self) -> Option<Instant> {
        self.v6_expiry
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expiry
    }
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.publisher_id == other.publisher_id
    }
}

impl Eq for Service {}

impl Hash for Service {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.publisher_id.hash(state);
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.publisher_id)?;
        if let Some(v4) = self.v4 {
            write!(f, " {}", v4)?;
        }
        if let Some(v6) = self.v6 {
            write!(f, " {}", v6)?;
        }
        Ok(())
    }
}
