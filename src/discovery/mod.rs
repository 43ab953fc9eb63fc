//! # Chirp Discovery Module
//!
//! Browsing for and publishing services.
//!
//! ## Key Types
//!
//! - [`Browser`] - Listens for announcements and tracks live services
//! - [`Publisher`] - Announces one service until stopped
//! - [`ServiceRegistry`] - TTL-indexed table behind every browser
//! - [`ServiceListener`] - Callbacks for registry transitions
//!
//! ## Threads
//!
//! A started browser runs one receive loop per open transport, an
//! expiration ticker and a dispatch loop that owns the registry. A started
//! publisher runs, per open transport, a serve loop with its own announce
//! timer and reader. All of them exit when the owner is stopped.

pub mod browser;
pub mod listener;
pub mod publisher;
pub mod registry;
pub mod service;

pub use browser::{Browser, BrowserBuilder};
pub use listener::{ChannelListener, ServiceListener};
pub use publisher::{Publisher, PublisherBuilder};
pub use registry::{ServiceEvent, ServiceRegistry};
pub use service::Service;

use crate::error::{ChirpError, Result};
use crate::transport::{DiscoveryTransport, IpFamily, TransportFactory};
use std::sync::Arc;

/// Start/stop state shared by browsers and publishers. `Stopped` is final.
pub(crate) enum Lifecycle<R> {
    Idle,
    Running(R),
    Stopped,
}

impl<R> Lifecycle<R> {
    pub(crate) fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Running(_))
    }

    /// Move to `Stopped`, handing back the running state if there was one.
    /// An idle instance stays idle.
    pub(crate) fn take_running(&mut self) -> Option<R> {
        match self {
            Lifecycle::Running(_) => match std::mem::replace(self, Lifecycle::Stopped) {
                Lifecycle::Running(running) => Some(running),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Open a transport for every family, tolerating one failure.
pub(crate) fn open_transports(
    factory: &dyn TransportFactory,
    role: &str,
) -> Result<Vec<Arc<dyn DiscoveryTransport>>> {
    let mut transports = Vec::new();
    for family in IpFamily::ALL {
        match factory.open(family) {
            Ok(transport) => transports.push(transport),
            Err(e) => log::warn!("[{}] {} unavailable, continuing without it: {}", role, family, e),
        }
    }
    if transports.is_empty() {
        return Err(ChirpError::NoTransport);
    }
    Ok(transports)
}

fn close_all(transports: &[Arc<dyn DiscoveryTransport>]) {
    for transport in transports {
        transport.close();
    }
}
