use super::service::Service;
use crate::protocol::{Message, MessageType};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// A registry transition the browser reports to its listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Discovered(Service),
    Updated(Service),
    Removed(Service),
}

impl ServiceEvent {
    pub fn service(&self) -> &Service {
        match self {
            ServiceEvent::Discovered(s) | ServiceEvent::Updated(s) | ServiceEvent::Removed(s) => s,
        }
    }
}

/// TTL-indexed table of known services, keyed by publisher id.
///
/// Not synchronized: the browser's dispatch thread is its only owner.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Service>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `publish` or `remove_service`; other messages are ignored.
    pub fn apply(&mut self, message: &Message, now: Instant) -> Option<ServiceEvent> {
        match message.kind {
            MessageType::Publish => self.publish(message, now),
            MessageType::RemoveService => self.remove(message),
            MessageType::NewListener => None,
        }
    }

    /// Create or refresh the sender's entry.
    ///
    /// Emits `Discovered` for a new publisher, `Updated` when the address for
    /// the arriving family is new or changed, nothing for a plain refresh.
    pub fn publish(&mut self, message: &Message, now: Instant) -> Option<ServiceEvent> {
        let Some(address) = message.source_address else {
            log::debug!("ignoring publish without a source address: {}", message);
            return None;
        };
        let deadline = now + Duration::from_secs(u64::from(message.ttl));

        match self.services.get_mut(&message.sender_id) {
            None => {
                let mut service = Service::new(
                    message.sender_id.clone(),
                    message.service_name.clone(),
                    message.payload.clone(),
                    deadline,
                );
                set_address(&mut service, address, deadline);
                log::info!("discovered {}", service);
                self.services.insert(message.sender_id.clone(), service.clone());
                Some(ServiceEvent::Discovered(service))
            }
            Some(service) => {
                service.expiry = service.expiry.max(deadline);
                service.name.clone_from(&message.service_name);
                service.payload.clone_from(&message.payload);
                if set_address(service, address, deadline) {
                    log::info!("updated {}", service);
                    Some(ServiceEvent::Updated(service.clone()))
                } else {
                    None
                }
            }
        }
    }

    /// Drop the sender's entry; unknown senders are a no-op.
    pub fn remove(&mut self, message: &Message) -> Option<ServiceEvent> {
        let service = self.services.remove(&message.sender_id)?;
        log::info!("removed {}", service);
        Some(ServiceEvent::Removed(service))
    }

    /// Evict every entry whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<ServiceEvent> {
        let expired: Vec<String> = self
            .services
            .values()
            .filter(|service| service.is_expired(now))
            .map(|service| service.publisher_id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.services.remove(&id))
            .map(|service| {
                log::info!("expired {}", service);
                ServiceEvent::Removed(service)
            })
            .collect()
    }

    pub fn get(&self, publisher_id: &str) -> Option<&Service> {
        self.services.get(publisher_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Record `address` for its family. Returns true if the address changed.
fn set_address(service: &mut Service, address: IpAddr, deadline: Instant) -> bool {
    match address {
        IpAddr::V4(v4) => {
            service.v4_expiry = Some(service.v4_expiry.map_or(deadline, |e| e.max(deadline)));
            service.v4.replace(v4) != Some(v4)
        }
        IpAddr::V6(v6) => {
            service.v6_expiry = Some(service.v6_expiry.map_or(deadline, |e| e.max(deadline)));
            service.v6.replace(v6) != Some(v6)
        }
    }
}
