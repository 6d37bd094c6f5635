//! Connection manager (C3): dials outbound peers, accepts inbound ones,
//! retries persistent peers with linear backoff, and enforces outbound
//! group diversity. Grounded on the teacher's `fsm::peermgr` module
//! (same retry/backoff shape), generalized to run as its own thread talking
//! to the hub over [`HubMessage`] rather than being driven by a shared
//! reactor tick.
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel as chan;
use glyphchain_common::peer::Store;
use log::{info, warn};

use crate::hub::{HubListener, HubMessage};
use crate::peer::{Link, PeerConfig, PeerHandle};

/// First retry delay for a persistent peer; each subsequent attempt adds
/// another multiple of this base (spec §4.3: "linear per-retry backoff
/// starting at 9s").
const RETRY_BASE: Duration = Duration::from_secs(9);
/// After this many failed samples against a candidate address, the
/// "last-attempt must be older than 10 minutes" filter is lifted.
const RELAX_RECENCY_AFTER: u32 = 30;
/// After this many failed samples, non-default ports are allowed too.
const RELAX_PORT_AFTER: u32 = 50;
const RECENCY_FLOOR: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    pub target_outbound: usize,
    pub max_inbound: usize,
    pub default_port: u16,
    pub peer: PeerConfig,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        ConnectionManagerConfig {
            target_outbound: 9,
            max_inbound: 125,
            default_port: 8333,
            peer: PeerConfig::default(),
        }
    }
}

struct RetryState {
    attempts: u32,
    last_attempt_at: std::time::Instant,
    next_attempt_at: std::time::Instant,
}

/// Runs the outbound-dial loop and the inbound accept loop, each on its own
/// thread, sharing the same address [`Store`] and hub mailbox.
pub struct ConnectionManager<S> {
    store: Arc<Mutex<S>>,
    config: ConnectionManagerConfig,
    hub: chan::Sender<HubMessage>,
    next_id: Arc<AtomicU64>,
    persistent: Mutex<Vec<SocketAddr>>,
    retries: Mutex<HashMap<SocketAddr, RetryState>>,
    outbound_groups: Mutex<HashMap<String, usize>>,
    failed_samples: AtomicU64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("{0} is already a persistent peer")]
    AlreadyPersistent(SocketAddr),
}

impl<S: Store + 'static> ConnectionManager<S> {
    pub fn new(
        store: Arc<Mutex<S>>,
        config: ConnectionManagerConfig,
        hub: chan::Sender<HubMessage>,
        next_id: Arc<AtomicU64>,
        persistent: Vec<SocketAddr>,
    ) -> Arc<Self> {
        Arc::new(ConnectionManager {
            store,
            config,
            hub,
            next_id,
            persistent: Mutex::new(persistent),
            retries: Mutex::new(HashMap::new()),
            outbound_groups: Mutex::new(HashMap::new()),
            failed_samples: AtomicU64::new(0),
        })
    }

    /// Spawns the accept loop. Call once per configured listen address.
    pub fn listen(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr)?;
        let this = self.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                this.accept(stream);
            }
        });
        Ok(())
    }

    fn accept(self: &Arc<Self>, stream: TcpStream) {
        let Ok(addr) = stream.peer_addr() else { return };
        let Ok(local_addr) = stream.local_addr() else { return };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener = HubListener::new(self.hub.clone());
        let handle = PeerHandle::associate(
            id,
            addr,
            local_addr,
            Link::Inbound,
            false,
            stream,
            Arc::new(listener),
            self.config.peer.clone(),
        );
        let _ = self.hub.send(HubMessage::Connect(addr, handle));
    }

    /// Spawns the outbound-dial loop: keeps persistent peers connected with
    /// linear backoff and tops up ad-hoc outbound slots from the address
    /// store, respecting group diversity (spec §4.3).
    pub fn run_outbound(self: &Arc<Self>) {
        let this = self.clone();
        std::thread::spawn(move || loop {
            this.redial_persistent();
            this.fill_outbound_slots();
            std::thread::sleep(Duration::from_secs(1));
        });
    }

    fn redial_persistent(self: &Arc<Self>) {
        let now = std::time::Instant::now();
        let due: Vec<SocketAddr> = {
            let retries = self.retries.lock().unwrap();
            self.persistent
                .lock()
                .unwrap()
                .iter()
                .filter(|addr| retries.get(*addr).map(|r| r.next_attempt_at <= now).unwrap_or(true))
                .copied()
                .collect()
        };
        for addr in due {
            self.dial(addr, true);
        }
    }

    /// Adds a runtime-requested peer (RPC `addnode`/`node`, spec §4.3).
    /// `permanent` peers join the reconnect-forever set; `connect` on an
    /// address already persistent fails rather than duplicating it.
    pub fn connect(self: &Arc<Self>, addr: SocketAddr, permanent: bool) -> Result<(), ConnectError> {
        if permanent {
            let mut persistent = self.persistent.lock().unwrap();
            if persistent.contains(&addr) {
                return Err(ConnectError::AlreadyPersistent(addr));
            }
            persistent.push(addr);
        }
        self.dial(addr, permanent);
        Ok(())
    }

    /// Removes `addr` from the persistent set, if present, and disconnects
    /// it (spec §4.3 `remove(conn_id)`).
    pub fn remove(self: &Arc<Self>, addr: SocketAddr) {
        self.persistent.lock().unwrap().retain(|a| *a != addr);
        let _ = self.hub.send(HubMessage::Disconnect(addr, crate::peer::DisconnectReason::Command));
    }

    /// Selects and dials one outbound candidate, honoring the recency/port
    /// relaxation rules (spec §4.3): a candidate last attempted within the
    /// past 10 minutes is skipped unless 30 failed samples have accumulated,
    /// and a non-default port is skipped unless 50 have.
    fn fill_outbound_slots(self: &Arc<Self>) {
        let connected = self.outbound_groups.lock().unwrap().values().sum::<usize>();
        if connected >= self.config.target_outbound {
            return;
        }
        let Some(candidate) = self.store.lock().unwrap().get_address() else { return };
        let addr = candidate.addr;
        let failed = self.failed_samples.load(Ordering::Relaxed) as u32;

        if failed < RELAX_RECENCY_AFTER {
            let retries = self.retries.lock().unwrap();
            if let Some(state) = retries.get(&addr) {
                if std::time::Instant::now().duration_since(state.last_attempt_at) < RECENCY_FLOOR {
                    self.failed_samples.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }
        if failed < RELAX_PORT_AFTER && addr.port() != self.config.default_port {
            self.failed_samples.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let group = {
            let store = self.store.lock().unwrap();
            store.group_key(&glyphchain_wire::NetAddress::new(addr, glyphchain_wire::ServiceFlags::NONE))
        };
        if self.outbound_groups.lock().unwrap().get(&group).copied().unwrap_or(0) > 0 {
            self.failed_samples.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.dial(addr, false);
    }

    fn dial(self: &Arc<Self>, addr: SocketAddr, persistent: bool) {
        {
            let mut retries = self.retries.lock().unwrap();
            let attempts = retries.get(&addr).map(|r| r.attempts).unwrap_or(0) + 1;
            let now = std::time::Instant::now();
            retries.insert(addr, RetryState { attempts, last_attempt_at: now, next_attempt_at: now + RETRY_BASE * attempts });
        }
        self.store.lock().unwrap().attempt(&glyphchain_wire::NetAddress::new(addr, glyphchain_wire::ServiceFlags::NONE));

        match TcpStream::connect_timeout(&addr, Duration::from_secs(5)) {
            Ok(stream) => {
                let Ok(local_addr) = stream.local_addr() else { return };
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let listener = HubListener::new(self.hub.clone());
                let group = {
                    let store = self.store.lock().unwrap();
                    store.group_key(&glyphchain_wire::NetAddress::new(addr, glyphchain_wire::ServiceFlags::NONE))
                };
                *self.outbound_groups.lock().unwrap().entry(group).or_insert(0) += 1;
                let handle = PeerHandle::associate(
                    id,
                    addr,
                    local_addr,
                    Link::Outbound,
                    persistent,
                    stream,
                    Arc::new(listener),
                    self.config.peer.clone(),
                );
                self.retries.lock().unwrap().remove(&addr);
                let _ = self.hub.send(HubMessage::Connect(addr, handle));
                info!(target: "p2p", "connected to {addr}");
            }
            Err(err) => {
                self.failed_samples.fetch_add(1, Ordering::Relaxed);
                warn!(target: "p2p", "failed to connect to {addr}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_grows_linearly() {
        let base = RETRY_BASE;
        assert_eq!(base * 2, Duration::from_secs(18));
        assert_eq!(base * 3, Duration::from_secs(27));
    }

    #[test]
    fn relaxation_thresholds_are_ordered() {
        assert!(RELAX_RECENCY_AFTER < RELAX_PORT_AFTER);
    }
}
