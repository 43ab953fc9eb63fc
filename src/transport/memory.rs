//! In-process stand-in for a multicast segment.
//!
//! Every transport opened on a [`MemoryNetwork`] receives every datagram sent
//! on the same family, including its own, exactly as with multicast
//! loopback enabled. Used to exercise browsers and publishers without
//! touching the host network.

use super::traits::{DiscoveryTransport, IpFamily, TransportFactory, accept_datagram};
use crate::error::{ChirpError, Result};
use crate::protocol::Message;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

const MEMORY_PORT: u16 = 6464;

type Datagram = (Vec<u8>, SocketAddr);

struct Endpoint {
    id: u64,
    family: IpFamily,
    inbox: Sender<Datagram>,
}

#[derive(Default)]
struct Segment {
    endpoints: Vec<Endpoint>,
    next_id: u64,
}

impl Segment {
    fn deliver(&self, family: IpFamily, data: &[u8], source: SocketAddr) {
        for endpoint in self.endpoints.iter().filter(|e| e.family == family) {
            let _ = endpoint.inbox.send((data.to_vec(), source));
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryNetwork {
    segment: Arc<Mutex<Segment>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dual-stack host on this network.
    pub fn host(&self, v4: Ipv4Addr, v6: Ipv6Addr) -> MemoryHost {
        MemoryHost {
            network: self.clone(),
            v4: Some(v4),
            v6: Some(v6),
        }
    }

    /// A host with only an IPv4 address; opening IPv6 fails.
    pub fn host_v4_only(&self, v4: Ipv4Addr) -> MemoryHost {
        MemoryHost {
            network: self.clone(),
            v4: Some(v4),
            v6: None,
        }
    }

    /// Deliver raw bytes to every open transport of `family`.
    pub fn inject(&self, family: IpFamily, data: &[u8], source: SocketAddr) {
        self.segment.lock().deliver(family, data, source);
    }

    pub fn endpoint_count(&self, family: IpFamily) -> usize {
        self.segment
            .lock()
            .endpoints
            .iter()
            .filter(|e| e.family == family)
            .count()
    }

    fn attach(&self, family: IpFamily, address: IpAddr) -> MemoryTransport {
        let (inbox_tx, inbox_rx) = channel::unbounded();
        let (close_tx, close_rx) = channel::bounded(0);
        let mut segment = self.segment.lock();
        let id = segment.next_id;
        segment.next_id += 1;
        segment.endpoints.push(Endpoint {
            id,
            family,
            inbox: inbox_tx,
        });
        MemoryTransport {
            id,
            family,
            source: SocketAddr::new(address, MEMORY_PORT),
            segment: self.segment.clone(),
            inbox: inbox_rx,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
        }
    }
}

/// Opens [`MemoryTransport`]s that send from this host's addresses.
#[derive(Clone)]
pub struct MemoryHost {
    network: MemoryNetwork,
    v4: Option<Ipv4Addr>,
    v6: Option<Ipv6Addr>,
}

impl MemoryHost {
    /// Open a transport directly, e.g. to observe traffic from a test.
    pub fn open_transport(&self, family: IpFamily) -> Result<MemoryTransport> {
        let address = match family {
            IpFamily::V4 => self.v4.map(IpAddr::V4),
            IpFamily::V6 => self.v6.map(IpAddr::V6),
        };
        match address {
            Some(address) => Ok(self.network.attach(family, address)),
            None => Err(ChirpError::Io(io::Error::new(
                ErrorKind::Unsupported,
                format!("host has no {} address", family),
            ))),
        }
    }
}

impl TransportFactory for MemoryHost {
    fn open(&self, family: IpFamily) -> Result<Arc<dyn DiscoveryTransport>> {
        Ok(Arc::new(self.open_transport(family)?))
    }
}

pub struct MemoryTransport {
    id: u64,
    family: IpFamily,
    source: SocketAddr,
    segment: Arc<Mutex<Segment>>,
    inbox: Receiver<Datagram>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
}

impl MemoryTransport {
    pub fn source(&self) -> SocketAddr {
        self.source
    }
}

impl DiscoveryTransport for MemoryTransport {
    fn family(&self) -> IpFamily {
        self.family
    }

    fn send_datagram(&self, data: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(ErrorKind::NotConnected, "transport is closed"));
        }
        self.segment.lock().deliver(self.family, data, self.source);
        Ok(())
    }

    fn receive(&self) -> Option<Message> {
        loop {
            if self.is_closed() {
                return None;
            }
            crossbeam::select! {
                recv(self.inbox) -> datagram => match datagram {
                    Ok((data, source)) => {
                        if let Some(message) = accept_datagram(&data, source, self.family) {
                            return Some(message);
                        }
                    }
                    Err(_) => return None,
                },
                recv(self.close_rx) -> _ => return None,
            }
        }
    }

    fn close(&self) {
        if self.close_tx.lock().take().is_none() {
            return;
        }
        self.segment.lock().endpoints.retain(|e| e.id != self.id);
    }

    fn is_closed(&self) -> bool {
        self.close_tx.lock().is_none()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}
