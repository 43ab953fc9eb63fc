//! Network interface discovery for multicast group membership.
//!
//! Joins happen on every interface that carries an address of the right
//! family and is neither loopback nor a known virtual/tunnel device.

use super::traits::IpFamily;
use std::net::{IpAddr, Ipv4Addr};

/// Comma-separated interface names overriding automatic selection.
pub const INTERFACE_ENV: &str = "CHIRP_MULTICAST_IF";

const VIRTUAL_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "virbr", "br-", "vmnet", "vboxnet", "tun", "tap", "utun", "awdl",
    "llw", "zt",
];

/// An interface usable for IPv6 membership: its name and OS index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceIndex {
    pub name: String,
    pub index: u32,
}

/// IPv4 addresses of the interfaces to join on.
pub fn multicast_interfaces_v4(allow: &[String]) -> Vec<Ipv4Addr> {
    select_interfaces(list_interfaces(), IpFamily::V4, &allow_list(allow))
        .into_iter()
        .filter_map(|(_, addr)| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect()
}

/// Names and indices of the interfaces to join on. An interface with several
/// IPv6 addresses appears once.
pub fn multicast_interfaces_v6(allow: &[String]) -> Vec<InterfaceIndex> {
    let mut result: Vec<InterfaceIndex> = Vec::new();
    for (name, _) in select_interfaces(list_interfaces(), IpFamily::V6, &allow_list(allow)) {
        if result.iter().any(|known| known.name == name) {
            continue;
        }
        match interface_index(&name) {
            Some(index) => result.push(InterfaceIndex { name, index }),
            None => log::debug!("[IPv6] no interface index for {}, skipping", name),
        }
    }
    result
}

/// Filter `(name, address)` pairs down to those worth joining on.
/// A non-empty `allow` list bypasses the virtual-device heuristic.
pub fn select_interfaces(
    interfaces: Vec<(String, IpAddr)>,
    family: IpFamily,
    allow: &[String],
) -> Vec<(String, IpAddr)> {
    interfaces
        .into_iter()
        .filter(|(_, addr)| match family {
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
        })
        .filter(|(_, addr)| !addr.is_loopback() && !addr.is_unspecified())
        .filter(|(name, _)| {
            if allow.is_empty() {
                !is_virtual(name)
            } else {
                allow.iter().any(|allowed| allowed == name)
            }
        })
        .collect()
}

pub fn is_virtual(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn allow_list(configured: &[String]) -> Vec<String> {
    if !configured.is_empty() {
        return configured.to_vec();
    }
    match std::env::var(INTERFACE_ENV) {
        Ok(value) => {
            let names: Vec<String> = value
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
            log::debug!("Using {} override: {:?}", INTERFACE_ENV, names);
            names
        }
        Err(_) => Vec::new(),
    }
}

fn list_interfaces() -> Vec<(String, IpAddr)> {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            log::warn!("Failed to list network interfaces: {}", e);
            Vec::new()
        }
    }
}

#[cfg(unix)]
fn interface_index(name: &str) -> Option<u32> {
    let c_name = std::ffi::CString::new(name).ok()?;
    // SAFETY: c_name is a valid NUL-terminated string for the duration of the call.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    (index != 0).then_some(index)
}

#[cfg(not(unix))]
fn interface_index(_name: &str) -> Option<u32> {
    // Let the OS pick the interface.
    Some(0)
}
