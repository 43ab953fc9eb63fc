use super::listener::{ServiceListener, deliver};
use super::registry::{ServiceEvent, ServiceRegistry};
use super::{Lifecycle, close_all, open_transports};
use crate::error::{ChirpError, Result};
use crate::protocol::{Message, MessageType, ServiceFilter, new_instance_id};
use crate::runtime::{
    BrowserConfig, CallbackThread, ExecutionContext, MulticastPermit, NetworkConfig, NoPermit,
    Shutdown, ShutdownSignal, join_workers, shutdown_pair, spawn_worker,
};
use crate::transport::{DiscoveryTransport, MulticastFactory, TransportFactory};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Configures a [`Browser`]. Obtained from [`crate::browse`].
pub struct BrowserBuilder {
    config: BrowserConfig,
    listener: Option<Arc<dyn ServiceListener>>,
    context: Option<Arc<dyn ExecutionContext>>,
    factory: Option<Arc<dyn TransportFactory>>,
    permit: Arc<dyn MulticastPermit>,
}

impl BrowserBuilder {
    pub fn new(filter: impl Into<String>) -> Self {
        Self::from_config(BrowserConfig::new(filter))
    }

    pub fn from_config(config: BrowserConfig) -> Self {
        BrowserBuilder {
            config,
            listener: None,
            context: None,
            factory: None,
            permit: Arc::new(NoPermit),
        }
    }

    pub fn listener(self, listener: impl ServiceListener) -> Self {
        self.shared_listener(Arc::new(listener))
    }

    pub fn shared_listener(mut self, listener: Arc<dyn ServiceListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Where callbacks run. Defaults to a dedicated thread per browser.
    pub fn execution_context(mut self, context: Arc<dyn ExecutionContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn expiration_interval(mut self, interval: Duration) -> Self {
        self.config.expiration_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.config.network = network;
        self
    }

    /// Replace real multicast sockets, e.g. with a [`crate::transport::MemoryHost`].
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn permit(mut self, permit: Arc<dyn MulticastPermit>) -> Self {
        self.permit = permit;
        self
    }

    /// Validate the configuration. Nothing touches the network until
    /// [`Browser::start`].
    pub fn build(self) -> Result<Browser> {
        let filter = self.config.validate()?;
        let factory: Arc<dyn TransportFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(MulticastFactory::new(self.config.network.clone())),
        };

        Ok(Browser {
            id: new_instance_id(),
            filter,
            expiration_interval: self.config.expiration_interval(),
            listener: self.listener,
            context: self.context,
            factory,
            permit: self.permit,
            state: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Build and start in one step.
    pub fn start(self) -> Result<Browser> {
        let browser = self.build()?;
        browser.start()?;
        Ok(browser)
    }
}

/// Tracks services matching a filter and reports changes to its listener.
///
/// A browser can be started once. After [`Browser::stop`] it stays stopped;
/// build a new one to browse again.
pub struct Browser {
    id: String,
    filter: ServiceFilter,
    expiration_interval: Duration,
    listener: Option<Arc<dyn ServiceListener>>,
    context: Option<Arc<dyn ExecutionContext>>,
    factory: Arc<dyn TransportFactory>,
    permit: Arc<dyn MulticastPermit>,
    state: Mutex<Lifecycle<Running>>,
}

struct Running {
    shutdown: Shutdown,
    transports: Vec<Arc<dyn DiscoveryTransport>>,
    workers: Vec<JoinHandle<()>>,
    // Released after the workers so the callback thread is joined by the
    // stopping thread, never by the dispatch loop.
    context: Option<Arc<dyn ExecutionContext>>,
}

impl Running {
    fn stop(self) {
        let Running {
            shutdown,
            transports,
            workers,
            context,
        } = self;
        drop(shutdown);
        close_all(&transports);
        join_workers(workers);
        drop(context);
    }
}

impl Browser {
    /// This browser's instance id, sent in its `new_listener` hello.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filter(&self) -> &ServiceFilter {
        &self.filter
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().is_running()
    }

    /// Open sockets, spawn the worker threads and announce ourselves with a
    /// `new_listener` hello so publishers answer right away.
    ///
    /// Starting a running browser is a no-op. Fails with
    /// [`ChirpError::NoTransport`] if neither family could be opened.
    pub fn start(&self) -> Result<()> {
        let transports = {
            let mut state = self.state.lock();
            match *state {
                Lifecycle::Running(_) => return Ok(()),
                Lifecycle::Stopped => return Err(ChirpError::AlreadyStopped),
                Lifecycle::Idle => {}
            }

            self.permit.acquire()?;
            match self.launch() {
                Ok(running) => {
                    let transports = running.transports.clone();
                    *state = Lifecycle::Running(running);
                    transports
                }
                Err(e) => {
                    self.permit.release();
                    return Err(e);
                }
            }
        };
        log::info!("[browser {}] started, filter {}", self.id, self.filter);

        // Outside the state lock.
        let hello = Message::new_listener(self.id.as_str(), self.filter.as_str());
        for transport in &transports {
            match transport.send(&hello) {
                Ok(()) => log::debug!("[browser {}] sent hello on {}", self.id, transport.family()),
                Err(e) => log::warn!("[browser {}] hello on {} failed: {}", self.id, transport.family(), e),
            }
        }
        Ok(())
    }

    /// Cancel every worker and close the sockets. Idempotent; safe to call
    /// from a listener callback.
    pub fn stop(&self) {
        let running = self.state.lock().take_running();
        if let Some(running) = running {
            running.stop();
            self.permit.release();
            log::info!("[browser {}] stopped", self.id);
        }
    }

    fn launch(&self) -> Result<Running> {
        let transports = open_transports(self.factory.as_ref(), "browser")?;
        let (shutdown, signal) = shutdown_pair();
        let mut running = Running {
            shutdown,
            transports,
            workers: Vec::new(),
            context: None,
        };

        if let Err(e) = self.spawn_workers(&mut running, signal) {
            running.stop();
            return Err(e);
        }
        Ok(running)
    }

    fn spawn_workers(&self, running: &mut Running, signal: ShutdownSignal) -> Result<()> {
        let context: Arc<dyn ExecutionContext> = match &self.context {
            Some(context) => Arc::clone(context),
            None => Arc::new(CallbackThread::spawn("chirp-browser-callbacks")?),
        };
        running.context = Some(Arc::clone(&context));

        let (intake_tx, intake_rx) = channel::unbounded();

        let dispatcher = Dispatcher::new(self.filter.clone());
        let listener = self.listener.clone();
        let dispatch_signal = signal.clone();
        running.workers.push(spawn_worker("chirp-browser-dispatch".to_string(), move || {
            dispatch_loop(dispatcher, intake_rx, dispatch_signal, listener, context)
        })?);

        let interval = self.expiration_interval;
        let ticker_intake = intake_tx.clone();
        running.workers.push(spawn_worker("chirp-browser-expiry".to_string(), move || {
            expiry_ticker(interval, ticker_intake, signal)
        })?);

        for transport in &running.transports {
            let name = format!("chirp-browser-{}", transport.family().tag());
            let transport = Arc::clone(transport);
            let intake = intake_tx.clone();
            running
                .workers
                .push(spawn_worker(name, move || receive_loop(transport, intake))?);
        }
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Intake {
    Message(Message),
    Sweep,
}

/// Applies the filter and feeds the registry. Owned by the dispatch loop.
struct Dispatcher {
    filter: ServiceFilter,
    registry: ServiceRegistry,
}

impl Dispatcher {
    fn new(filter: ServiceFilter) -> Self {
        Dispatcher {
            filter,
            registry: ServiceRegistry::new(),
        }
    }

    fn handle(&mut self, intake: Intake, now: Instant) -> Vec<ServiceEvent> {
        match intake {
            Intake::Message(message) => self.handle_message(&message, now).into_iter().collect(),
            Intake::Sweep => self.registry.expire(now),
        }
    }

    fn handle_message(&mut self, message: &Message, now: Instant) -> Option<ServiceEvent> {
        if message.kind == MessageType::NewListener {
            return None;
        }
        if !self.filter.matches(&message.service_name) {
            log::trace!("filtered out {}", message);
            return None;
        }
        self.registry.apply(message, now)
    }
}

fn dispatch_loop(
    mut dispatcher: Dispatcher,
    intake: Receiver<Intake>,
    signal: ShutdownSignal,
    listener: Option<Arc<dyn ServiceListener>>,
    context: Arc<dyn ExecutionContext>,
) {
    loop {
        let item = select! {
            recv(intake) -> item => item.ok(),
            recv(signal.receiver()) -> _ => None,
        };
        let Some(item) = item else {
            break;
        };

        for event in dispatcher.handle(item, Instant::now()) {
            if let Some(listener) = &listener {
                let listener = Arc::clone(listener);
                context.run(Box::new(move || deliver(listener.as_ref(), &event)));
            }
        }
    }
    log::debug!("browser dispatch loop finished");
}

fn expiry_ticker(interval: Duration, intake: Sender<Intake>, signal: ShutdownSignal) {
    let ticker = channel::tick(interval);
    loop {
        let fired = select! {
            recv(ticker) -> _ => true,
            recv(signal.receiver()) -> _ => false,
        };
        if !fired || intake.send(Intake::Sweep).is_err() {
            break;
        }
    }
}

fn receive_loop(transport: Arc<dyn DiscoveryTransport>, intake: Sender<Intake>) {
    while let Some(message) = transport.receive() {
        if intake.send(Intake::Message(message)).is_err() {
            break;
        }
    }
    log::debug!("browser {} receive loop finished", transport.family());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from(message: Message, address: &str) -> Intake {
        let mut message = message;
        message.source_address = Some(address.parse().unwrap());
        Intake::Message(message)
    }

    #[test]
    fn test_dispatcher_applies_filter() {
        let mut dispatcher = Dispatcher::new(ServiceFilter::Named("printer".into()));
        let now = Instant::now();

        let other = Message::publish(new_instance_id(), "scanner", 30, None);
        assert!(dispatcher.handle(from(other, "10.0.0.2"), now).is_empty());

        let wanted = Message::publish(new_instance_id(), "printer", 30, None);
        let events = dispatcher.handle(from(wanted, "10.0.0.3"), now);
        assert!(matches!(events.as_slice(), [ServiceEvent::Discovered(_)]));
    }

    #[test]
    fn test_dispatcher_ignores_hellos() {
        let mut dispatcher = Dispatcher::new(ServiceFilter::All);
        let hello = Message::new_listener(new_instance_id(), "*");
        assert!(dispatcher.handle(from(hello, "10.0.0.2"), Instant::now()).is_empty());
        assert!(dispatcher.registry.is_empty());
    }

    #[test]
    fn test_dispatcher_sweep() {
        let mut dispatcher = Dispatcher::new(ServiceFilter::All);
        let t0 = Instant::now();
        let message = Message::publish(new_instance_id(), "demo", 10, None);
        dispatcher.handle(from(message, "10.0.0.2"), t0);

        assert!(dispatcher.handle(Intake::Sweep, t0).is_empty());
        let events = dispatcher.handle(Intake::Sweep, t0 + Duration::from_secs(11));
        assert!(matches!(events.as_slice(), [ServiceEvent::Removed(_)]));
    }

    #[test]
    fn test_build_rejects_bad_filter() {
        assert!(matches!(
            BrowserBuilder::new("two words").build(),
            Err(ChirpError::InvalidFilter(_))
        ));
        assert!(matches!(
            BrowserBuilder::new("*").expiration_interval(Duration::ZERO).build(),
            Err(ChirpError::Config(_))
        ));
    }
}
