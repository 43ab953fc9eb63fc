//! Error types shared across the crate.

use crate::transport::IpFamily;
use thiserror::Error;

/// Errors surfaced to the local caller.
///
/// Network-side problems (malformed datagrams, invalid messages, a failed
/// send) are logged and contained; only construction and lifecycle errors
/// reach the consumer.
#[derive(Debug, Error)]
pub enum ChirpError {
    #[error("invalid service name {0:?}")]
    InvalidServiceName(String),

    #[error("invalid browse filter {0:?} (expected a service name or \"*\")")]
    InvalidFilter(String),

    #[error("ttl must be at least {min} seconds, got {ttl}")]
    InvalidTtl { ttl: u32, min: u32 },

    #[error("payload is too large: {size} bytes serialized, max {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no multicast interface could be joined for {0}")]
    NoMulticastInterface(IpFamily),

    #[error("no transport could be opened on any IP family")]
    NoTransport,

    #[error("instance was stopped and cannot be restarted")]
    AlreadyStopped,

    #[error("multicast permit was not granted: {0}")]
    PermitDenied(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChirpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ttl_display() {
        let error = ChirpError::InvalidTtl { ttl: 5, min: 10 };
        assert_eq!(error.to_string(), "ttl must be at least 10 seconds, got 5");
    }

    #[test]
    fn test_payload_too_large_display() {
        let error = ChirpError::PayloadTooLarge { size: 40000, max: 32768 };
        assert_eq!(
            error.to_string(),
            "payload is too large: 40000 bytes serialized, max 32768"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let error: ChirpError = io.into();
        assert!(matches!(error, ChirpError::Io(_)));
        assert!(error.to_string().contains("port taken"));
    }

    #[test]
    fn test_no_interface_names_family() {
        let error = ChirpError::NoMulticastInterface(IpFamily::V6);
        assert_eq!(error.to_string(), "no multicast interface could be joined for IPv6");
    }
}
