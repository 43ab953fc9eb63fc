use rand::RngCore;
use rand::rngs::OsRng;

/// Number of random bytes in an instance id.
pub const INSTANCE_ID_BYTES: usize = 16;

/// Longest service name accepted, in UTF-8 bytes.
pub const MAX_SERVICE_NAME_BYTES: usize = 64;

/// Browse filter matching every service.
pub const WILDCARD: &str = "*";

/// Generate a fresh instance id: 16 bytes from the OS CSPRNG, lowercase hex.
pub fn new_instance_id() -> String {
    let mut bytes = [0u8; INSTANCE_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A service name is 1..=64 bytes of `[a-zA-Z0-9.-]`.
pub fn is_valid_service_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_SERVICE_NAME_BYTES {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// A sender id is exactly 32 hex characters, either case.
pub fn is_valid_sender_id(id: &str) -> bool {
    id.len() == INSTANCE_ID_BYTES * 2 && id.chars().all(|c| c.is_ascii_hexdigit())
}

/// True for `*` or any valid service name.
pub fn is_valid_filter(filter: &str) -> bool {
    filter == WILDCARD || is_valid_service_name(filter)
}

/// Which services a browser is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceFilter {
    All,
    Named(String),
}

impl ServiceFilter {
    /// Parse `*` or a service name; `None` for anything else.
    pub fn parse(filter: &str) -> Option<Self> {
        if filter == WILDCARD {
            Some(ServiceFilter::All)
        } else if is_valid_service_name(filter) {
            Some(ServiceFilter::Named(filter.to_string()))
        } else {
            None
        }
    }

    pub fn matches(&self, service_name: &str) -> bool {
        match self {
            ServiceFilter::All => true,
            ServiceFilter::Named(name) => name == service_name,
        }
    }

    /// The value carried in a `new_listener` hello.
    pub fn as_str(&self) -> &str {
        match self {
            ServiceFilter::All => WILDCARD,
            ServiceFilter::Named(name) => name,
        }
    }
}

impl std::fmt::Display for ServiceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
