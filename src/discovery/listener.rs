use super::registry::ServiceEvent;
use super::service::Service;
use crossbeam::channel::{self, Receiver, Sender};

/// Receives registry transitions from a browser.
///
/// Callbacks run on the browser's execution context; the default context
/// delivers them one at a time in registry order.
pub trait ServiceListener: Send + Sync + 'static {
    fn on_service_discovered(&self, _service: &Service) {}

    fn on_service_updated(&self, _service: &Service) {}

    fn on_service_removed(&self, _service: &Service) {}
}

impl<F> ServiceListener for F
where
    F: Fn(&ServiceEvent) + Send + Sync + 'static,
{
    fn on_service_discovered(&self, service: &Service) {
        self(&ServiceEvent::Discovered(service.clone()))
    }

    fn on_service_updated(&self, service: &Service) {
        self(&ServiceEvent::Updated(service.clone()))
    }

    fn on_service_removed(&self, service: &Service) {
        self(&ServiceEvent::Removed(service.clone()))
    }
}

pub(crate) fn deliver(listener: &dyn ServiceListener, event: &ServiceEvent) {
    match event {
        ServiceEvent::Discovered(service) => listener.on_service_discovered(service),
        ServiceEvent::Updated(service) => listener.on_service_updated(service),
        ServiceEvent::Removed(service) => listener.on_service_removed(service),
    }
}

/// Forwards every event into a channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: Sender<ServiceEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, Receiver<ServiceEvent>) {
        let (sender, receiver) = channel::unbounded();
        (ChannelListener { sender }, receiver)
    }

    fn forward(&self, event: ServiceEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("event receiver dropped");
        }
    }
}

impl ServiceListener for ChannelListener {
    fn on_service_discovered(&self, service: &Service) {
        self.forward(ServiceEvent::Discovered(service.clone()));
    }

    fn on_service_updated(&self, service: &Service) {
        self.forward(ServiceEvent::Updated(service.clone()));
    }

    fn on_service_removed(&self, service: &Service) {
        self.forward(ServiceEvent::Removed(service.clone()));
    }
}
