use super::interfaces::{multicast_interfaces_v4, multicast_interfaces_v6};
use super::traits::{DiscoveryTransport, IpFamily, TransportFactory, accept_datagram};
use crate::error::{ChirpError, Result};
use crate::protocol::{MAX_DATAGRAM_BYTES, Message};
use crate::runtime::config::NetworkConfig;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// UDP socket bound to the discovery port and joined to one family's group.
pub struct MulticastTransport {
    family: IpFamily,
    socket: UdpSocket,
    group: SocketAddr,
    redundant_gap: Option<Duration>,
    joined: usize,
    closed: AtomicBool,
    buffer: Mutex<Vec<u8>>,
}

impl MulticastTransport {
    pub fn open(family: IpFamily, config: &NetworkConfig) -> Result<Self> {
        let (domain, group_ip, unspecified) = match family {
            IpFamily::V4 => (
                Domain::IPV4,
                IpAddr::V4(config.group_v4),
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ),
            IpFamily::V6 => (
                Domain::IPV6,
                IpAddr::V6(config.group_v6),
                IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            ),
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        // Every browser and publisher on the host shares the port.
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true)?;
        if family == IpFamily::V6 {
            socket.set_only_v6(true)?;
        }
        socket.bind(&SocketAddr::new(unspecified, config.port).into())?;

        let joined = match family {
            IpFamily::V4 => join_v4(&socket, &config.group_v4, config)?,
            IpFamily::V6 => join_v6(&socket, &config.group_v6, config)?,
        };
        socket.set_read_timeout(Some(config.read_timeout()))?;

        log::info!(
            "[{}] multicast transport on {}:{} ({} interface(s))",
            family,
            group_ip,
            config.port,
            joined
        );

        Ok(MulticastTransport {
            family,
            socket: socket.into(),
            group: SocketAddr::new(group_ip, config.port),
            redundant_gap: config.redundant_gap(),
            joined,
            closed: AtomicBool::new(false),
            buffer: Mutex::new(vec![0u8; MAX_DATAGRAM_BYTES]),
        })
    }

    /// Interfaces the group was joined on; zero means the OS default was used.
    pub fn joined_interfaces(&self) -> usize {
        self.joined
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DiscoveryTransport for MulticastTransport {
    fn family(&self) -> IpFamily {
        self.family
    }

    fn send_datagram(&self, data: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(ErrorKind::NotConnected, "transport is closed"));
        }
        self.socket.send_to(data, self.group)?;
        // Redundant copy.
        if let Some(gap) = self.redundant_gap {
            thread::sleep(gap);
            self.socket.send_to(data, self.group)?;
        }
        Ok(())
    }

    fn receive(&self) -> Option<Message> {
        // One reader per transport; the lock only guards buffer reuse.
        let mut buf = self.buffer.lock();
        read_message(&mut buf, self.family, || self.is_closed(), |buf| self.socket.recv_from(buf))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Wakes a blocked recv on Linux; the read timeout covers other platforms.
        let _ = SockRef::from(&self.socket).shutdown(Shutdown::Read);
        log::debug!("[{}] multicast transport closed", self.family);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MulticastTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens [`MulticastTransport`]s with a fixed network configuration.
#[derive(Debug, Clone, Default)]
pub struct MulticastFactory {
    config: NetworkConfig,
}

impl MulticastFactory {
    pub fn new(config: NetworkConfig) -> Self {
        MulticastFactory { config }
    }
}

impl TransportFactory for MulticastFactory {
    fn open(&self, family: IpFamily) -> Result<Arc<dyn DiscoveryTransport>> {
        Ok(Arc::new(MulticastTransport::open(family, &self.config)?))
    }
}

/// Read into `buf` until a valid message arrives, the transport closes or
/// the socket fails. Timeouts and interrupts just retry.
fn read_message<C, R>(buf: &mut [u8], family: IpFamily, is_closed: C, mut recv: R) -> Option<Message>
where
    C: Fn() -> bool,
    R: FnMut(&mut [u8]) -> io::Result<(usize, SocketAddr)>,
{
    loop {
        if is_closed() {
            return None;
        }
        match recv(buf) {
            Ok((len, source)) => {
                if is_closed() {
                    return None;
                }
                if let Some(message) = accept_datagram(&buf[..len], source, family) {
                    return Some(message);
                }
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                if !is_closed() {
                    log::warn!("[{}] receive failed, stopping: {}", family, e);
                }
                return None;
            }
        }
    }
}

fn join_v4(socket: &Socket, group: &Ipv4Addr, config: &NetworkConfig) -> Result<usize> {
    let interfaces = multicast_interfaces_v4(&config.interfaces);
    let mut joined = Vec::new();
    for iface in &interfaces {
        match socket.join_multicast_v4(group, iface) {
            Ok(()) => {
                log::debug!("[IPv4] joined {} on {}", group, iface);
                joined.push(*iface);
            }
            Err(e) if e.raw_os_error() == Some(libc::EADDRINUSE) => {
                log::debug!("[IPv4] {} already joined on {}", group, iface);
                joined.push(*iface);
            }
            Err(e) => log::debug!("[IPv4] join {} on {} failed (non-fatal): {}", group, iface, e),
        }
    }

    if joined.is_empty() {
        log::warn!("[IPv4] no suitable interface joined {}, falling back to the default", group);
        socket
            .join_multicast_v4(group, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| {
                log::warn!("[IPv4] default interface join failed: {}", e);
                ChirpError::NoMulticastInterface(IpFamily::V4)
            })?;
    } else if let Err(e) = socket.set_multicast_if_v4(&joined[0]) {
        log::debug!("[IPv4] set_multicast_if_v4({}) failed: {}", joined[0], e);
    }

    socket.set_multicast_loop_v4(config.multicast_loop)?;
    socket.set_multicast_ttl_v4(config.multicast_hops)?;
    Ok(joined.len())
}

fn join_v6(socket: &Socket, group: &Ipv6Addr, config: &NetworkConfig) -> Result<usize> {
    let interfaces = multicast_interfaces_v6(&config.interfaces);
    let mut joined = Vec::new();
    for iface in &interfaces {
        match socket.join_multicast_v6(group, iface.index) {
            Ok(()) => {
                log::debug!("[IPv6] joined {} on {} (#{})", group, iface.name, iface.index);
                joined.push(iface.index);
            }
            Err(e) if e.raw_os_error() == Some(libc::EADDRINUSE) => {
                log::debug!("[IPv6] {} already joined on {}", group, iface.name);
                joined.push(iface.index);
            }
            Err(e) => log::debug!("[IPv6] join {} on {} failed (non-fatal): {}", group, iface.name, e),
        }
    }

    if joined.is_empty() {
        log::warn!("[IPv6] no suitable interface joined {}, falling back to the default", group);
        socket.join_multicast_v6(group, 0).map_err(|e| {
            log::warn!("[IPv6] default interface join failed: {}", e);
            ChirpError::NoMulticastInterface(IpFamily::V6)
        })?;
    } else if let Err(e) = socket.set_multicast_if_v6(joined[0]) {
        log::debug!("[IPv6] set_multicast_if_v6({}) failed: {}", joined[0], e);
    }

    socket.set_multicast_loop_v6(config.multicast_loop)?;
    socket.set_multicast_hops_v6(config.multicast_hops)?;
    Ok(joined.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageType, Payload, new_instance_id};
    use serde_json::json;
    use std::collections::VecDeque;

    type Reads = VecDeque<io::Result<(Vec<u8>, SocketAddr)>>;

    fn feed(reads: &mut Reads, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (data, source) = reads
            .pop_front()
            .unwrap_or_else(|| Err(io::Error::new(ErrorKind::ConnectionReset, "drained")))?;
        buf[..data.len()].copy_from_slice(&data);
        Ok((data.len(), source))
    }

    #[test]
    fn test_buffer_reused_across_datagrams() {
        let source: SocketAddr = "10.0.0.7:6464".parse().unwrap();
        let sender = new_instance_id();
        let mut payload = Payload::new();
        payload.insert("blob".into(), json!("x".repeat(4096)));
        let long = Message::publish(&sender, "printer", 30, Some(payload)).to_bytes().unwrap();
        let short = Message::remove_service(&sender, "printer").to_bytes().unwrap();
        assert!(short.len() < long.len());

        let mut reads: Reads = VecDeque::from(vec![
            Err(io::Error::new(ErrorKind::WouldBlock, "timeout")),
            Ok((long, source)),
            Ok((b"not json".to_vec(), source)),
            Ok((short, source)),
        ]);
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        let capacity = buf.capacity();

        let first = read_message(&mut buf, IpFamily::V4, || false, |b| feed(&mut reads, b)).unwrap();
        assert_eq!(first.kind, MessageType::Publish);

        // stale bytes from the longer datagram must not leak into the next one
        let second = read_message(&mut buf, IpFamily::V4, || false, |b| feed(&mut reads, b)).unwrap();
        assert_eq!(second.kind, MessageType::RemoveService);
        assert_eq!(second.source_address, Some(source.ip()));
        assert_eq!(buf.capacity(), capacity);

        assert!(read_message(&mut buf, IpFamily::V4, || false, |b| feed(&mut reads, b)).is_none());
    }

    #[test]
    fn test_closed_transport_reads_nothing() {
        let mut buf = vec![0u8; 64];
        let result = read_message(&mut buf, IpFamily::V6, || true, |_| -> io::Result<(usize, SocketAddr)> {
            panic!("closed transport must not touch the socket")
        });
        assert!(result.is_none());
    }
}
