use crate::error::{ChirpError, Result};
use crate::protocol::{
    DEFAULT_TTL, MIN_TTL, Payload, ServiceFilter, WILDCARD, check_payload_size,
    is_valid_service_name,
};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

/// Multicast socket settings shared by browsers and publishers.
/// All timing values are in milliseconds.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct NetworkConfig {
    /// Discovery port (default: 6464)
    #[serde(default = "default_port")]
    pub port: u16,
    /// IPv4 group (default: 224.0.0.224)
    #[serde(default = "default_group_v4")]
    pub group_v4: Ipv4Addr,
    /// IPv6 group (default: ff06::224)
    #[serde(default = "default_group_v6")]
    pub group_v6: Ipv6Addr,
    /// Transmit every datagram twice (default: true)
    #[serde(default = "default_true")]
    pub redundant_send: bool,
    /// Gap between the two copies (default: 20)
    #[serde(default = "default_redundant_gap")]
    pub redundant_gap_ms: u64,
    /// Socket read timeout, bounds how long a closed socket can stay blocked (default: 250)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Multicast TTL / hop limit (default: 1)
    #[serde(default = "default_hops")]
    pub multicast_hops: u32,
    /// Deliver our own datagrams to other sockets on this host (default: true)
    #[serde(default = "default_true")]
    pub multicast_loop: bool,
    /// Interface names to join on; empty means every suitable interface
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            port: default_port(),
            group_v4: default_group_v4(),
            group_v6: default_group_v6(),
            redundant_send: default_true(),
            redundant_gap_ms: default_redundant_gap(),
            read_timeout_ms: default_read_timeout(),
            multicast_hops: default_hops(),
            multicast_loop: default_true(),
            interfaces: Vec::new(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ChirpError::Config("port must be non-zero".into()));
        }
        if !self.group_v4.is_multicast() {
            return Err(ChirpError::Config(format!("{} is not a multicast address", self.group_v4)));
        }
        if !self.group_v6.is_multicast() {
            return Err(ChirpError::Config(format!("{} is not a multicast address", self.group_v6)));
        }
        if self.read_timeout_ms == 0 {
            return Err(ChirpError::Config("read_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Gap before the second copy, or `None` when redundancy is off.
    pub fn redundant_gap(&self) -> Option<Duration> {
        self.redundant_send.then(|| Duration::from_millis(self.redundant_gap_ms))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrowserConfig {
    /// Service name to browse for, or "*" (default: "*")
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Expiration sweep period (default: 10000)
    #[serde(default = "default_expiration_interval")]
    pub expiration_interval_ms: u64,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            filter: default_filter(),
            expiration_interval_ms: default_expiration_interval(),
            network: NetworkConfig::default(),
        }
    }
}

impl BrowserConfig {
    pub fn new(filter: impl Into<String>) -> Self {
        BrowserConfig {
            filter: filter.into(),
            ..Default::default()
        }
    }

    /// Check every field, returning the parsed filter.
    pub fn validate(&self) -> Result<ServiceFilter> {
        let filter = ServiceFilter::parse(&self.filter)
            .ok_or_else(|| ChirpError::InvalidFilter(self.filter.clone()))?;
        if self.expiration_interval_ms == 0 {
            return Err(ChirpError::Config("expiration_interval_ms must be non-zero".into()));
        }
        self.network.validate()?;
        Ok(filter)
    }

    pub fn expiration_interval(&self) -> Duration {
        Duration::from_millis(self.expiration_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PublisherConfig {
    pub service_name: String,
    /// Seconds an announcement stays valid (default: 60, minimum: 10)
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub payload: Option<Payload>,
    /// Wait after the goodbye before closing sockets (default: 50)
    #[serde(default = "default_goodbye_grace")]
    pub goodbye_grace_ms: u64,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl PublisherConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        PublisherConfig {
            service_name: service_name.into(),
            ttl: default_ttl(),
            payload: None,
            goodbye_grace_ms: default_goodbye_grace(),
            network: NetworkConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_service_name(&self.service_name) {
            return Err(ChirpError::InvalidServiceName(self.service_name.clone()));
        }
        if self.ttl < MIN_TTL {
            return Err(ChirpError::InvalidTtl {
                ttl: self.ttl,
                min: MIN_TTL,
            });
        }
        if let Some(payload) = &self.payload {
            check_payload_size(payload)?;
        }
        self.network.validate()
    }

    /// Re-announce a few seconds before browsers would expire us.
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl.saturating_sub(4)))
    }

    pub fn goodbye_grace(&self) -> Duration {
        Duration::from_millis(self.goodbye_grace_ms)
    }
}

/// File form used by the demo binaries.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChirpConfig {
    #[serde(default)]
    pub browser: Option<BrowserConfig>,
    #[serde(default)]
    pub publisher: Option<PublisherConfig>,
}

impl ChirpConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading config from {}", path.display());
        let file = File::open(path)?;
        let config: ChirpConfig = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }
}

fn default_port() -> u16 { 6464 }
fn default_group_v4() -> Ipv4Addr { Ipv4Addr::new(224, 0, 0, 224) }
fn default_group_v6() -> Ipv6Addr { Ipv6Addr::new(0xff06, 0, 0, 0, 0, 0, 0, 0x224) }
fn default_true() -> bool { true }
fn default_redundant_gap() -> u64 { 20 }
fn default_read_timeout() -> u64 { 250 }
fn default_hops() -> u32 { 1 }
fn default_filter() -> String { WILDCARD.to_string() }
fn default_expiration_interval() -> u64 { 10_000 }
fn default_ttl() -> u32 { DEFAULT_TTL }
fn default_goodbye_grace() -> u64 { 50 }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_network_defaults() {
        let config: NetworkConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, NetworkConfig::default());
        assert_eq!(config.port, 6464);
        assert_eq!(config.group_v4.to_string(), "224.0.0.224");
        assert_eq!(config.group_v6.to_string(), "ff06::224");
        assert_eq!(config.redundant_gap(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_network_overrides() {
        let config: NetworkConfig = serde_json::from_value(json!({
            "port": 7000,
            "group_v4": "239.1.2.3",
            "redundant_send": false,
            "interfaces": ["eth0"]
        }))
        .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.group_v4, Ipv4Addr::new(239, 1, 2, 3));
        assert_eq!(config.redundant_gap(), None);
        assert_eq!(config.interfaces, vec!["eth0"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_network_rejects_unicast_group() {
        let config = NetworkConfig {
            group_v4: Ipv4Addr::new(192, 168, 0, 1),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ChirpError::Config(_))));
    }

    #[test]
    fn test_browser_config() {
        let config: BrowserConfig = serde_json::from_value(json!({"filter": "demo"})).unwrap();
        assert_eq!(config.validate().unwrap(), ServiceFilter::Named("demo".into()));
        assert_eq!(config.expiration_interval(), Duration::from_secs(10));

        let bad = BrowserConfig::new("not valid");
        assert!(matches!(bad.validate(), Err(ChirpError::InvalidFilter(_))));
    }

    #[test]
    fn test_publisher_config() {
        let config: PublisherConfig = serde_json::from_value(json!({
            "service_name": "demo",
            "payload": {"port": 1337}
        }))
        .unwrap();
        assert_eq!(config.ttl, 60);
        assert_eq!(config.announce_interval(), Duration::from_secs(56));
        assert!(config.validate().is_ok());

        let mut short = PublisherConfig::new("demo");
        short.ttl = 9;
        assert!(matches!(short.validate(), Err(ChirpError::InvalidTtl { ttl: 9, min: 10 })));

        assert!(matches!(
            PublisherConfig::new("bad name").validate(),
            Err(ChirpError::InvalidServiceName(_))
        ));
    }

    #[test]
    fn test_chirp_config_sections() {
        let config: ChirpConfig = serde_json::from_value(json!({
            "publisher": {"service_name": "demo", "ttl": 10}
        }))
        .unwrap();
        assert!(config.browser.is_none());
        assert_eq!(config.publisher.unwrap().announce_interval(), Duration::from_secs(6));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ChirpConfig::load("/nonexistent/chirp.json"),
            Err(ChirpError::Io(_))
        ));
    }
}
