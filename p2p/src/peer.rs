//! The peer state machine (C2): one instance per TCP connection. Follows
//! spec §5's thread shape literally — each peer owns three OS threads (read,
//! write, send-queue) — rather than the teacher's single sans-I/O state
//! machine driven by an external reactor (REDESIGN FLAG, see SPEC_FULL.md
//! §2.1). The public contract mirrors spec §4.2 exactly.
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as chan;
use glyphchain_common::BanScore;
use glyphchain_wire::{
    Encoding, Inventory, Network, NetworkMessage, RawNetworkMessage, ServiceFlags, VersionMessage,
};
use log::{debug, trace};
use thiserror::Error;

/// Identifies a peer. Stable and monotonic, assigned at construction (spec
/// §3), unlike the teacher's `SocketAddr`-as-id scheme.
pub type PeerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Inbound,
    Outbound,
}

impl Link {
    pub fn is_outbound(self) -> bool {
        matches!(self, Link::Outbound)
    }
}

/// Why a peer was disconnected, ported from the teacher's `DisconnectReason`
/// and adjusted to this crate's ban-scoring vocabulary.
#[derive(Debug, Clone)]
pub enum DisconnectReason {
    PeerMisbehaving(&'static str),
    PeerProtocolVersion(u32),
    PeerServices(ServiceFlags),
    PeerMagic(u32),
    PeerTimeout(&'static str),
    SelfConnection,
    ConnectionLimit,
    DecodeError(Arc<glyphchain_wire::Error>),
    Command,
    Banned,
    Other(&'static str),
}

impl DisconnectReason {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionLimit | Self::PeerTimeout(_))
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeerMisbehaving(reason) => write!(f, "peer misbehaving: {}", reason),
            Self::PeerProtocolVersion(v) => write!(f, "peer protocol version too old: {}", v),
            Self::PeerServices(s) => write!(f, "peer is missing required services: {:?}", s),
            Self::PeerMagic(magic) => write!(f, "received message with invalid magic: {:#x}", magic),
            Self::PeerTimeout(s) => write!(f, "peer timed out: {}", s),
            Self::SelfConnection => write!(f, "detected self-connection"),
            Self::ConnectionLimit => write!(f, "inbound connection limit reached"),
            Self::DecodeError(err) => write!(f, "message decode error: {}", err),
            Self::Command => write!(f, "received external command"),
            Self::Banned => write!(f, "peer host is banned"),
            Self::Other(reason) => write!(f, "{}", reason),
        }
    }
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,
    #[error("{0}")]
    Disconnect(#[from] DisconnectErrorInner),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] glyphchain_wire::Error),
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct DisconnectErrorInner(pub DisconnectReason);

/// Negotiated or observed peer facts, readable by anything holding a
/// [`PeerHandle`] without touching the hub (spec §4.2 "Observers").
#[derive(Debug, Default)]
struct Stats {
    version: AtomicU32,
    services: AtomicU64,
    last_block_height: AtomicU64,
    connected: AtomicBool,
    user_agent: Mutex<String>,
}

/// One item queued for delivery to the remote peer.
enum Outbound {
    Message(NetworkMessage, Encoding),
    Inventory(Inventory),
    Shutdown,
}

/// Minimum accepted protocol version; peers below this are disconnected with
/// no reply (spec §4.2).
pub const MIN_PROTOCOL_VERSION: u32 = 70012;
/// Protocol version this node negotiates.
pub const PROTOCOL_VERSION: u32 = glyphchain_wire::PROTOCOL_VERSION;
pub const USER_AGENT: &str = "/glyphchain:0.1.0/";

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub network: Network,
    pub services: ServiceFlags,
    pub required_services: ServiceFlags,
    pub trickle_interval: Duration,
    pub send_queue_bound: usize,
    pub known_inventory_cap: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            network: Network::default(),
            services: ServiceFlags::NETWORK,
            required_services: ServiceFlags::NETWORK,
            trickle_interval: Duration::from_secs(10),
            send_queue_bound: 1_024,
            known_inventory_cap: 10_000,
        }
    }
}

/// Events a peer's read thread reports to whoever is listening (the hub).
pub trait Listener: Send + Sync {
    fn on_version(&self, peer: PeerId, version: &VersionMessage) -> Result<(), DisconnectReason>;
    fn on_negotiated(&self, peer: PeerId);
    fn on_message(&self, peer: PeerId, msg: NetworkMessage);
    fn on_disconnect(&self, peer: PeerId, reason: DisconnectReason);
}

/// The public per-peer contract (spec §4.2). Holds the three threads
/// (read/write/send-queue) that own I/O for this connection; state that must
/// be shared is limited to small atomics in [`Stats`].
pub struct PeerHandle {
    id: PeerId,
    addr: SocketAddr,
    local_addr: SocketAddr,
    link: Link,
    persistent: AtomicBool,
    since: Instant,
    stats: Arc<Stats>,
    outbound: chan::Sender<Outbound>,
    disconnecting: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    known_inventory: Mutex<std::collections::VecDeque<Inventory>>,
}

impl PeerHandle {
    /// `associate(connection)`: binds a transport and launches the read,
    /// write, and send-queue tasks.
    #[allow(clippy::too_many_arguments)]
    pub fn associate<L: Listener + 'static>(
        id: PeerId,
        addr: SocketAddr,
        local_addr: SocketAddr,
        link: Link,
        persistent: bool,
        stream: TcpStream,
        listener: Arc<L>,
        config: PeerConfig,
    ) -> Arc<PeerHandle> {
        stream.set_nodelay(true).ok();
        let (outbound_tx, outbound_rx) = chan::bounded::<Outbound>(config.send_queue_bound);
        let disconnecting = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Stats::default());

        let handle = Arc::new(PeerHandle {
            id,
            addr,
            local_addr,
            link,
            persistent: AtomicBool::new(persistent),
            since: Instant::now(),
            stats: stats.clone(),
            outbound: outbound_tx.clone(),
            disconnecting: disconnecting.clone(),
            threads: Mutex::new(Vec::new()),
            known_inventory: Mutex::new(std::collections::VecDeque::with_capacity(config.known_inventory_cap)),
        });

        let read_stream = stream.try_clone().expect("TCP stream is clonable");
        let write_stream = stream;

        let read_listener = listener.clone();
        let read_disconnecting = disconnecting.clone();
        let read_stats = stats.clone();
        let read_cfg = config.clone();
        let read_thread = std::thread::spawn(move || {
            read_loop(id, link, read_stream, read_listener, read_stats, read_disconnecting, read_cfg);
        });

        let write_network = config.network;
        let write_thread = std::thread::spawn(move || {
            write_loop(write_stream, outbound_rx, config.trickle_interval, write_network);
        });

        let mut threads = handle.threads.lock().unwrap();
        threads.push(read_thread);
        threads.push(write_thread);
        drop(threads);

        handle
    }

    pub fn queue_message(&self, msg: NetworkMessage) -> bool {
        self.queue_message_with_encoding(msg, Encoding::Witness)
    }

    pub fn queue_message_with_encoding(&self, msg: NetworkMessage, encoding: Encoding) -> bool {
        self.outbound.try_send(Outbound::Message(msg, encoding)).is_ok()
    }

    /// Batched on the write thread's trickle timer (spec §4.2).
    pub fn queue_inventory(&self, inv: Inventory) -> bool {
        self.outbound.try_send(Outbound::Inventory(inv)).is_ok()
    }

    /// Idempotent.
    pub fn disconnect(&self) {
        if self.disconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.try_send(Outbound::Shutdown);
    }

    pub fn wait_for_disconnect(&self) {
        let mut threads = self.threads.lock().unwrap();
        for t in threads.drain(..) {
            let _ = t.join();
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn link(&self) -> Link {
        self.link
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Relaxed)
    }

    pub fn set_persistent(&self, value: bool) {
        self.persistent.store(value, Ordering::Relaxed);
    }

    pub fn services(&self) -> ServiceFlags {
        ServiceFlags(self.stats.services.load(Ordering::Relaxed))
    }

    pub fn version(&self) -> Option<u32> {
        let v = self.stats.version.load(Ordering::Relaxed);
        if v == 0 {
            None
        } else {
            Some(v)
        }
    }

    pub fn connected(&self) -> bool {
        self.stats.connected.load(Ordering::Relaxed)
    }

    pub fn last_block_height(&self) -> u64 {
        self.stats.last_block_height.load(Ordering::Relaxed)
    }

    pub fn set_last_block_height(&self, height: u64) {
        self.stats.last_block_height.store(height, Ordering::Relaxed);
    }

    pub fn stats_snapshot(&self) -> PeerStatsSnapshot {
        PeerStatsSnapshot {
            id: self.id,
            addr: self.addr,
            link: self.link,
            version: self.version(),
            services: self.services(),
            user_agent: self.stats.user_agent.lock().unwrap().clone(),
            last_block_height: self.last_block_height(),
            connected: self.connected(),
            since: self.since,
        }
    }

    /// Records that this peer has announced `inv`, bounding the LRU to
    /// `known_inventory_cap` entries (spec §3 "known-inventory LRU
    /// (bounded)").
    pub fn remember_inventory(&self, inv: Inventory, cap: usize) -> bool {
        let mut known = self.known_inventory.lock().unwrap();
        if known.contains(&inv) {
            return false;
        }
        if known.len() >= cap {
            known.pop_front();
        }
        known.push_back(inv);
        true
    }
}

#[derive(Debug, Clone)]
pub struct PeerStatsSnapshot {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub link: Link,
    pub version: Option<u32>,
    pub services: ServiceFlags,
    pub user_agent: String,
    pub last_block_height: u64,
    pub connected: bool,
    pub since: Instant,
}

fn read_loop<L: Listener + 'static>(
    id: PeerId,
    link: Link,
    mut stream: TcpStream,
    listener: Arc<L>,
    stats: Arc<Stats>,
    disconnecting: Arc<AtomicBool>,
    config: PeerConfig,
) {
    let magic = config.network.magic();
    let mut negotiated = false;
    let mut got_verack = false;
    let mut got_version = false;

    loop {
        if disconnecting.load(Ordering::Relaxed) {
            break;
        }
        let (cmd, len, checksum) = match RawNetworkMessage::decode_header(&mut stream, magic) {
            Ok(header) => header,
            Err(glyphchain_wire::Error::InvalidMagic(m)) => {
                listener.on_disconnect(id, DisconnectReason::PeerMagic(m));
                return;
            }
            Err(_) => break,
        };
        let mut payload = vec![0u8; len as usize];
        if stream.read_exact(&mut payload).is_err() {
            break;
        }
        let msg = match RawNetworkMessage::decode_payload(&cmd, &payload, checksum) {
            Ok(msg) => msg,
            Err(glyphchain_wire::Error::UnknownCommand(name)) => {
                trace!(target: "p2p", "peer {id}: ignoring unknown command {name:?}");
                continue;
            }
            Err(err) => {
                listener.on_disconnect(id, DisconnectReason::DecodeError(Arc::new(err)));
                return;
            }
        };

        match &msg {
            NetworkMessage::Version(v) => {
                if got_version {
                    continue;
                }
                got_version = true;
                if v.version < MIN_PROTOCOL_VERSION {
                    listener.on_disconnect(id, DisconnectReason::PeerProtocolVersion(v.version));
                    return;
                }
                if link.is_outbound() && !v.services.has(config.required_services) {
                    listener.on_disconnect(id, DisconnectReason::PeerServices(v.services));
                    return;
                }
                if let Err(reason) = listener.on_version(id, v) {
                    listener.on_disconnect(id, reason);
                    return;
                }
                stats.version.store(v.version, Ordering::Relaxed);
                stats.services.store(v.services.0, Ordering::Relaxed);
                stats.last_block_height.store(v.start_height.max(0) as u64, Ordering::Relaxed);
                *stats.user_agent.lock().unwrap() = v.user_agent.clone();
            }
            NetworkMessage::Verack => {
                got_verack = true;
            }
            _ => {}
        }

        if got_version && got_verack && !negotiated {
            negotiated = true;
            stats.connected.store(true, Ordering::Relaxed);
            listener.on_negotiated(id);
        }

        if !matches!(msg, NetworkMessage::Version(_) | NetworkMessage::Verack) {
            listener.on_message(id, msg);
        }
    }
    stats.connected.store(false, Ordering::Relaxed);
    debug!(target: "p2p", "peer {id}: read loop exited");
}

/// Drains outbound items, batching [`Outbound::Inventory`] entries into a
/// single `inv` message on the trickle timer (spec §4.2 "Inventory
/// trickle").
fn write_loop(mut stream: TcpStream, rx: chan::Receiver<Outbound>, trickle_interval: Duration, network: Network) {
    let mut pending_inv = Vec::new();
    let mut next_trickle = Instant::now() + trickle_interval;
    loop {
        let timeout = next_trickle.saturating_duration_since(Instant::now());
        match rx.recv_timeout(timeout.max(Duration::from_millis(1))) {
            Ok(Outbound::Message(msg, encoding)) => {
                if write_message(&mut stream, &msg, encoding, network).is_err() {
                    return;
                }
            }
            Ok(Outbound::Inventory(inv)) => {
                pending_inv.push(inv);
            }
            Ok(Outbound::Shutdown) => {
                stream.shutdown(std::net::Shutdown::Both).ok();
                return;
            }
            Err(chan::RecvTimeoutError::Timeout) => {}
            Err(chan::RecvTimeoutError::Disconnected) => return,
        }
        if Instant::now() >= next_trickle {
            if !pending_inv.is_empty() {
                let batch = std::mem::take(&mut pending_inv);
                if write_message(&mut stream, &NetworkMessage::Inv(batch), Encoding::Witness, network).is_err() {
                    return;
                }
            }
            next_trickle = Instant::now() + trickle_interval;
        }
    }
}

fn write_message(stream: &mut TcpStream, msg: &NetworkMessage, encoding: Encoding, network: Network) -> io::Result<()> {
    let raw = RawNetworkMessage::new(network, msg.clone());
    let bytes = raw.serialize(encoding);
    stream.write_all(&bytes)?;
    stream.flush()
}

/// Connection-level banning helper the hub consults before completing a
/// handshake or admitting an inbound socket.
pub fn should_reject(ban_score: &BanScore, threshold: u32, now: u64) -> bool {
    ban_score.exceeds(threshold, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_reason_transience() {
        assert!(DisconnectReason::ConnectionLimit.is_transient());
        assert!(!DisconnectReason::SelfConnection.is_transient());
    }

    #[test]
    fn link_outbound_flag() {
        assert!(Link::Outbound.is_outbound());
        assert!(!Link::Inbound.is_outbound());
    }
}
