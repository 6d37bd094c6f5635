//! Default in-memory address manager (C4): satisfies
//! [`glyphchain_common::peer::Store`] with a flat table plus a coarse
//! "group" counter the connection manager consults for outbound diversity.
//! Grounded on the teacher's `fsm::addrmgr` module shape (same contract,
//! simplified storage since bucket/new-vs-tried bookkeeping isn't named by
//! this spec).
use std::collections::HashMap;
use std::net::IpAddr;

use glyphchain_common::peer::Store;
use glyphchain_wire::{NetAddress, ServiceFlags};

#[derive(Debug, Clone)]
struct Entry {
    addr: NetAddress,
    services: ServiceFlags,
    last_success: Option<u64>,
    last_attempt: Option<u64>,
    attempts: u32,
}

/// In-memory, process-local address cache. Not persisted across restarts;
/// `node`'s daemon entry point is free to swap this for a file-backed one
/// without touching the connection manager, since everything goes through
/// the `Store` trait.
#[derive(Default)]
pub struct AddressManager {
    entries: HashMap<std::net::SocketAddr, Entry>,
    local: Vec<(NetAddress, u32)>,
}

impl AddressManager {
    pub fn new() -> Self {
        AddressManager::default()
    }
}

impl Store for AddressManager {
    fn add_addresses(&mut self, addrs: Vec<NetAddress>, _source: IpAddr) {
        for addr in addrs {
            self.entries.entry(addr.addr).or_insert(Entry {
                addr,
                services: ServiceFlags::NONE,
                last_success: None,
                last_attempt: None,
                attempts: 0,
            });
        }
    }

    fn good(&mut self, addr: &NetAddress) {
        if let Some(entry) = self.entries.get_mut(&addr.addr) {
            entry.last_success = Some(now());
            entry.attempts = 0;
        }
    }

    fn attempt(&mut self, addr: &NetAddress) {
        if let Some(entry) = self.entries.get_mut(&addr.addr) {
            entry.last_attempt = Some(now());
            entry.attempts += 1;
        }
    }

    fn get_address(&self) -> Option<NetAddress> {
        self.entries.values().min_by_key(|e| e.last_attempt.unwrap_or(0)).map(|e| e.addr)
    }

    fn get_best_local_address(&self, _remote: &NetAddress) -> Option<NetAddress> {
        self.local.iter().max_by_key(|(_, priority)| *priority).map(|(addr, _)| *addr)
    }

    fn host_to_net_address(&self, host: &str, port: u16, services: ServiceFlags) -> Option<NetAddress> {
        use std::net::ToSocketAddrs;
        (host, port).to_socket_addrs().ok()?.next().map(|sock| NetAddress::new(sock, services))
    }

    fn need_more_addresses(&self) -> bool {
        self.entries.len() < 1_000
    }

    fn address_cache(&self) -> Vec<NetAddress> {
        self.entries.values().map(|e| e.addr).collect()
    }

    fn group_key(&self, addr: &NetAddress) -> String {
        match addr.addr.ip() {
            IpAddr::V4(v4) => {
                let octets = v4.octets();
                format!("v4:{}.{}", octets[0], octets[1])
            }
            IpAddr::V6(v6) => {
                let segments = v6.segments();
                format!("v6:{:x}:{:x}", segments[0], segments[1])
            }
        }
    }

    fn set_services(&mut self, addr: &NetAddress, services: ServiceFlags) {
        if let Some(entry) = self.entries.get_mut(&addr.addr) {
            entry.services = services;
        }
    }

    fn add_local_address(&mut self, addr: NetAddress, priority: u32) {
        self.local.push((addr, priority));
    }
}

fn now() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    fn addr(a: u8, b: u8, c: u8, d: u8) -> NetAddress {
        NetAddress::new(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), 8333), ServiceFlags::NETWORK)
    }

    #[test]
    fn addresses_in_the_same_slash16_share_a_group() {
        let mgr = AddressManager::new();
        assert_eq!(mgr.group_key(&addr(10, 0, 1, 5)), mgr.group_key(&addr(10, 0, 2, 9)));
        assert_ne!(mgr.group_key(&addr(10, 0, 1, 5)), mgr.group_key(&addr(10, 1, 1, 5)));
    }

    #[test]
    fn newly_added_address_is_retrievable() {
        let mut mgr = AddressManager::new();
        mgr.add_addresses(vec![addr(1, 2, 3, 4)], IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(mgr.get_address().is_some());
    }
}
