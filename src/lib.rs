//! Zero-configuration service discovery over IPv4 and IPv6 UDP multicast.
//!
//! ```ignore
//! let publisher = chirp::publish("printer").ttl(30).start()?;
//!
//! let (listener, events) = chirp::ChannelListener::new();
//! let browser = chirp::browse("printer").listener(listener).start()?;
//! ```

pub mod discovery;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod runtime;
pub mod transport;

pub use discovery::{
    Browser, BrowserBuilder, ChannelListener, Publisher, PublisherBuilder, Service, ServiceEvent,
    ServiceListener, ServiceRegistry,
};
pub use error::{ChirpError, Result};
pub use protocol::{Message, MessageType, Payload, ServiceFilter};
pub use runtime::{
    BrowserConfig, CallbackThread, ChirpConfig, ExecutionContext, Inline, MulticastPermit,
    NetworkConfig, NoPermit, PublisherConfig,
};
pub use transport::{IpFamily, MemoryNetwork};

/// Browse for `filter`, a service name or `"*"` for everything.
pub fn browse(filter: impl Into<String>) -> BrowserBuilder {
    BrowserBuilder::new(filter)
}

/// Publish a service under `service_name`.
pub fn publish(service_name: impl Into<String>) -> PublisherBuilder {
    PublisherBuilder::new(service_name)
}
