//! Peer-adjacent shared types: the address manager contract (C4), the
//! communication-domain / whitelist supplement carried from the teacher's
//! `nakamoto_common::p2p` module, and per-peer ban scoring (spec §4.2).
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use glyphchain_wire::{NetAddress, ServiceFlags};

/// Address family a connection may be dialed over, mirroring the teacher's
/// `p2p::Domain` (spec §2: connection manager backed by an address manager
/// "with DNS-seeded bootstrap and SOCKS5/Tor egress").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    IPV4,
    IPV6,
    Onion,
}

impl Domain {
    pub fn all() -> Vec<Domain> {
        vec![Domain::IPV4, Domain::IPV6]
    }

    pub fn for_address(addr: &IpAddr) -> Domain {
        match addr {
            IpAddr::V4(_) => Domain::IPV4,
            IpAddr::V6(_) => Domain::IPV6,
        }
    }
}

/// A SOCKS5 proxy used to dial `Onion` addresses (or all addresses, in
/// Tor-only mode), carried from the teacher's optional `socks` feature.
#[derive(Debug, Clone)]
pub struct Socks5Proxy {
    pub addr: std::net::SocketAddr,
}

/// Peers trusted by default: bypass ban scoring entirely (spec §4.2:
/// "Whitelisted peers bypass banning").
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    addr: HashSet<IpAddr>,
    user_agent: HashSet<String>,
}

impl Whitelist {
    pub fn add_addr(&mut self, addr: IpAddr) {
        self.addr.insert(addr);
    }

    pub fn add_user_agent(&mut self, user_agent: impl Into<String>) {
        self.user_agent.insert(user_agent.into());
    }

    pub fn contains(&self, addr: &IpAddr, user_agent: &str) -> bool {
        self.addr.contains(addr) || self.user_agent.contains(user_agent)
    }
}

/// The address manager contract (C4): known-peer cache with group-diversity
/// sampling. The implementation is external per spec §4.4; this trait is the
/// only thing the connection manager and hub depend on.
pub trait Store: Send + Sync {
    fn add_addresses(&mut self, addrs: Vec<NetAddress>, source: IpAddr);
    fn good(&mut self, addr: &NetAddress);
    fn attempt(&mut self, addr: &NetAddress);
    fn get_address(&self) -> Option<NetAddress>;
    fn get_best_local_address(&self, remote: &NetAddress) -> Option<NetAddress>;
    fn host_to_net_address(&self, host: &str, port: u16, services: ServiceFlags) -> Option<NetAddress>;
    fn need_more_addresses(&self) -> bool;
    fn address_cache(&self) -> Vec<NetAddress>;
    /// A coarse network-locality key, used by the connection manager to
    /// avoid over-concentrating outbound peers in one group (spec §3,
    /// "Outbound group counter").
    fn group_key(&self, addr: &NetAddress) -> String;
    fn set_services(&mut self, addr: &NetAddress, services: ServiceFlags);
    fn add_local_address(&mut self, addr: NetAddress, priority: u32);
}

/// Dual-counter ban score: a persistent integer plus a transient one that
/// decays with a one-minute half-life (spec §4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct BanScore {
    persistent: u32,
    transient: f64,
    last_decay: u64,
}

/// Half of the ban threshold; crossing it only logs a warning.
pub const WARNING_FRACTION: u32 = 2;

const TRANSIENT_HALFLIFE_SECS: f64 = 60.0;

impl BanScore {
    pub fn add_persistent(&mut self, amount: u32) {
        self.persistent = self.persistent.saturating_add(amount);
    }

    /// Decays the transient score to `now`, then adds `amount`.
    pub fn add_transient(&mut self, amount: u32, now: u64) {
        self.decay(now);
        self.transient += amount as f64;
    }

    fn decay(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.last_decay) as f64;
        if elapsed > 0.0 {
            self.transient *= 0.5f64.powf(elapsed / TRANSIENT_HALFLIFE_SECS);
            self.last_decay = now;
        }
    }

    pub fn total(&self, now: u64) -> u32 {
        let mut copy = *self;
        copy.decay(now);
        copy.persistent.saturating_add(copy.transient as u32)
    }

    pub fn exceeds(&self, threshold: u32, now: u64) -> bool {
        self.total(now) >= threshold
    }

    pub fn exceeds_warning(&self, threshold: u32, now: u64) -> bool {
        self.total(now) >= threshold / WARNING_FRACTION
    }
}

/// A ban entry: host plus expiry, per spec §3.
#[derive(Debug, Clone, Copy)]
pub struct BanEntry {
    pub expiry: u64,
}

impl BanEntry {
    pub fn new(now: u64, duration: Duration) -> Self {
        BanEntry { expiry: now + duration.as_secs() }
    }

    pub fn expired(&self, now: u64) -> bool {
        now >= self.expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_score_decays_by_half_each_minute() {
        let mut score = BanScore::default();
        score.add_transient(100, 0);
        assert_eq!(score.total(0), 100);
        assert_eq!(score.total(60), 50);
        assert_eq!(score.total(120), 25);
    }

    #[test]
    fn persistent_score_never_decays() {
        let mut score = BanScore::default();
        score.add_persistent(100);
        assert_eq!(score.total(1_000_000), 100);
    }

    #[test]
    fn ban_entry_expires_after_duration() {
        let entry = BanEntry::new(0, Duration::from_secs(86_400));
        assert!(!entry.expired(86_399));
        assert!(entry.expired(86_400));
    }
}
