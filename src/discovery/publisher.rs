use super::{Lifecycle, close_all, open_transports};
use crate::error::{ChirpError, Result};
use crate::protocol::{Message, MessageType, Payload, new_instance_id};
use crate::runtime::{
    MulticastPermit, NetworkConfig, NoPermit, PublisherConfig, Shutdown, ShutdownSignal,
    join_workers, shutdown_pair, spawn_worker,
};
use crate::transport::{DiscoveryTransport, MulticastFactory, TransportFactory};
use crossbeam::channel::{self, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configures a [`Publisher`]. Obtained from [`crate::publish`].
pub struct PublisherBuilder {
    config: PublisherConfig,
    factory: Option<Arc<dyn TransportFactory>>,
    permit: Arc<dyn MulticastPermit>,
}

impl PublisherBuilder {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::from_config(PublisherConfig::new(service_name))
    }

    pub fn from_config(config: PublisherConfig) -> Self {
        PublisherBuilder {
            config,
            factory: None,
            permit: Arc::new(NoPermit),
        }
    }

    /// Seconds browsers keep the service without hearing from us. At least 10.
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.config.ttl = ttl;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.config.payload = Some(payload);
        self
    }

    pub fn goodbye_grace(mut self, grace: Duration) -> Self {
        self.config.goodbye_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.config.network = network;
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn permit(mut self, permit: Arc<dyn MulticastPermit>) -> Self {
        self.permit = permit;
        self
    }

    /// Validate name, TTL and payload size.
    pub fn build(self) -> Result<Publisher> {
        self.config.validate()?;
        let factory: Arc<dyn TransportFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(MulticastFactory::new(self.config.network.clone())),
        };

        Ok(Publisher {
            id: new_instance_id(),
            config: self.config,
            factory,
            permit: self.permit,
            state: Mutex::new(Lifecycle::Idle),
        })
    }

    pub fn start(self) -> Result<Publisher> {
        let publisher = self.build()?;
        publisher.start()?;
        Ok(publisher)
    }
}

/// Announces one service on every open family until stopped.
///
/// Announcements go out on start, every `ttl - 4` seconds after that, and
/// whenever a browser says hello. Stopping sends a `remove_service` goodbye.
pub struct Publisher {
    id: String,
    config: PublisherConfig,
    factory: Arc<dyn TransportFactory>,
    permit: Arc<dyn MulticastPermit>,
    state: Mutex<Lifecycle<Running>>,
}

struct Running {
    shutdown: Shutdown,
    transports: Vec<Arc<dyn DiscoveryTransport>>,
    workers: Vec<JoinHandle<()>>,
}

impl Running {
    fn stop(self) {
        // Serve loops send the goodbye and close their own transport.
        drop(self.shutdown);
        join_workers(self.workers);
        close_all(&self.transports);
    }
}

/// Everything a serve loop needs, shared by both families.
struct Announcement {
    publisher_id: String,
    datagram: Vec<u8>,
    goodbye: Message,
    interval: Duration,
    grace: Duration,
}

enum Command {
    Announce,
    Incoming(Message),
}

impl Publisher {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    pub fn ttl(&self) -> u32 {
        self.config.ttl
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.config.payload.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().is_running()
    }

    /// Open sockets and start announcing. Starting a running publisher is a
    /// no-op; a stopped one cannot be restarted.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            Lifecycle::Running(_) => return Ok(()),
            Lifecycle::Stopped => return Err(ChirpError::AlreadyStopped),
            Lifecycle::Idle => {}
        }

        self.permit.acquire()?;
        match self.launch() {
            Ok(running) => {
                log::info!(
                    "[publisher {}] announcing {} every {:?}",
                    self.id,
                    self.config.service_name,
                    self.config.announce_interval()
                );
                *state = Lifecycle::Running(running);
                Ok(())
            }
            Err(e) => {
                self.permit.release();
                Err(e)
            }
        }
    }

    /// Send the goodbye on every family, then close. Blocks for the goodbye
    /// grace period. Idempotent.
    pub fn stop(&self) {
        let running = self.state.lock().take_running();
        if let Some(running) = running {
            running.stop();
            self.permit.release();
            log::info!("[publisher {}] stopped", self.id);
        }
    }

    fn launch(&self) -> Result<Running> {
        let announcement = Arc::new(Announcement {
            publisher_id: self.id.clone(),
            datagram: Message::publish(
                self.id.as_str(),
                self.config.service_name.as_str(),
                self.config.ttl,
                self.config.payload.clone(),
            )
            .to_bytes()?,
            goodbye: Message::remove_service(self.id.as_str(), self.config.service_name.as_str()),
            interval: self.config.announce_interval(),
            grace: self.config.goodbye_grace(),
        });

        let transports = open_transports(self.factory.as_ref(), "publisher")?;
        let (shutdown, signal) = shutdown_pair();
        let mut running = Running {
            shutdown,
            transports,
            workers: Vec::new(),
        };

        for transport in running.transports.clone() {
            let name = format!("chirp-publisher-{}", transport.family().tag());
            let announcement = Arc::clone(&announcement);
            let signal = signal.clone();
            match spawn_worker(name, move || serve(transport, announcement, signal)) {
                Ok(worker) => running.workers.push(worker),
                Err(e) => {
                    running.stop();
                    return Err(e.into());
                }
            }
        }
        Ok(running)
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One family's publisher: announce, answer hellos, say goodbye.
fn serve(transport: Arc<dyn DiscoveryTransport>, announcement: Arc<Announcement>, signal: ShutdownSignal) {
    let family = transport.family();
    announce(transport.as_ref(), &announcement.datagram);

    let (commands_tx, commands_rx) = channel::unbounded();
    let mut helpers = Vec::new();

    let timer = {
        let commands = commands_tx.clone();
        let signal = signal.clone();
        let interval = announcement.interval;
        spawn_worker(format!("chirp-publisher-{}-timer", family.tag()), move || {
            announce_timer(interval, commands, signal)
        })
    };
    let reader = {
        let transport = Arc::clone(&transport);
        let own_id = announcement.publisher_id.clone();
        spawn_worker(format!("chirp-publisher-{}-reader", family.tag()), move || {
            read_loop(transport, own_id, commands_tx)
        })
    };
    for helper in [timer, reader] {
        match helper {
            Ok(handle) => helpers.push(handle),
            Err(e) => log::error!("[publisher {}] {} helper thread failed: {}", announcement.publisher_id, family, e),
        }
    }

    loop {
        let command = select! {
            recv(commands_rx) -> command => command.ok(),
            recv(signal.receiver()) -> _ => None,
        };
        match command {
            Some(Command::Announce) => announce(transport.as_ref(), &announcement.datagram),
            Some(Command::Incoming(message)) if message.kind == MessageType::NewListener => {
                log::debug!("[publisher {}] answering hello from {}", announcement.publisher_id, message.sender_id);
                announce(transport.as_ref(), &announcement.datagram);
            }
            Some(Command::Incoming(_)) => {}
            None => break,
        }
    }

    match transport.send(&announcement.goodbye) {
        Ok(()) => thread::sleep(announcement.grace),
        Err(e) => log::warn!("[publisher {}] goodbye on {} failed: {}", announcement.publisher_id, family, e),
    }
    transport.close();
    join_workers(helpers);
}

fn announce(transport: &dyn DiscoveryTransport, datagram: &[u8]) {
    if let Err(e) = transport.send_datagram(datagram) {
        log::warn!("announce on {} failed: {}", transport.family(), e);
    }
}

fn announce_timer(interval: Duration, commands: Sender<Command>, signal: ShutdownSignal) {
    loop {
        let due = select! {
            recv(signal.receiver()) -> _ => false,
            default(interval) => true,
        };
        if !due || commands.send(Command::Announce).is_err() {
            break;
        }
    }
}

fn read_loop(transport: Arc<dyn DiscoveryTransport>, own_id: String, commands: Sender<Command>) {
    while let Some(message) = transport.receive() {
        if message.sender_id == own_id {
            continue;
        }
        if commands.send(Command::Incoming(message)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_build_validates() {
        assert!(matches!(
            PublisherBuilder::new("has space").build(),
            Err(ChirpError::InvalidServiceName(_))
        ));
        assert!(matches!(
            PublisherBuilder::new("demo").ttl(5).build(),
            Err(ChirpError::InvalidTtl { ttl: 5, .. })
        ));

        let mut payload = Payload::new();
        payload.insert("blob".into(), Value::String("x".repeat(40 * 1024)));
        assert!(matches!(
            PublisherBuilder::new("demo").payload(payload).build(),
            Err(ChirpError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_build_does_not_start() {
        let mut payload = Payload::new();
        payload.insert("port".into(), json!(8080));
        let publisher = PublisherBuilder::new("demo").ttl(30).payload(payload).build().unwrap();
        assert!(!publisher.is_started());
        assert_eq!(publisher.service_name(), "demo");
        assert_eq!(publisher.ttl(), 30);
        assert_eq!(publisher.payload().unwrap()["port"], 8080);
        assert_eq!(publisher.id().len(), 32);
        // stop before start is a no-op and leaves the publisher startable
        publisher.stop();
        assert!(!publisher.is_started());
    }

    #[test]
    fn test_timer_stops_on_shutdown() {
        let (shutdown, signal) = shutdown_pair();
        let (tx, rx) = channel::unbounded();
        let timer = thread::spawn(move || announce_timer(Duration::from_millis(10), tx, signal));

        assert!(matches!(rx.recv_timeout(Duration::from_secs(2)), Ok(Command::Announce)));
        drop(shutdown);
        timer.join().unwrap();
    }
}
