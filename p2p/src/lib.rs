//! Peer-to-peer networking core: the peer state machine (C2), connection
//! manager (C3), default address manager (C4), server hub (C5) and
//! rebroadcast handler (C6). Everything above the wire codec lives here;
//! the external `Chain`/`TxMemPool`/`SyncMgr` engines the hub calls into are
//! defined in `glyphchain-common` and supplied by the daemon crate.
pub mod addrmgr;
pub mod connmgr;
pub mod hub;
pub mod peer;
pub mod rebroadcast;

pub use addrmgr::AddressManager;
pub use connmgr::{ConnectError, ConnectionManager, ConnectionManagerConfig};
pub use hub::{CommandError, Hub, HubListener, HubMessage, PeerInfo};
pub use peer::{DisconnectReason, Link, PeerConfig, PeerHandle, PeerId, MIN_PROTOCOL_VERSION, PROTOCOL_VERSION, USER_AGENT};
pub use rebroadcast::{Rebroadcaster, RebroadcastMessage};

use std::net::SocketAddr;
use std::sync::Arc;

use glyphchain_common::peer::Whitelist;
use glyphchain_wire::Network;

/// Everything needed to stand up a node's networking stack, mirroring the
/// teacher's `fsm::Config` (network, domains, whitelist, connection limits)
/// generalized to this crate's hub/connmgr split.
#[derive(Clone)]
pub struct Config {
    pub network: Network,
    pub listen: Vec<SocketAddr>,
    pub connect: Vec<SocketAddr>,
    pub connmgr: ConnectionManagerConfig,
    pub whitelist: Whitelist,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: Network::default(),
            listen: Vec::new(),
            connect: Vec::new(),
            connmgr: ConnectionManagerConfig::default(),
            whitelist: Whitelist::default(),
        }
    }
}

/// Wires a [`Hub`] together with its [`ConnectionManager`], returning the
/// channel the rest of the node (RPC dispatcher, rebroadcast handler) sends
/// [`HubMessage`]s on. The hub runs on a dedicated thread for the lifetime
/// of the process; the connection manager spawns its own accept/dial
/// threads that feed it.
pub fn spawn<C, M, S>(
    config: Config,
    chain: Arc<C>,
    mempool: Arc<M>,
    syncmgr: Arc<S>,
    store: Arc<std::sync::Mutex<AddressManager>>,
    clock: Arc<dyn glyphchain_common::Clock>,
) -> (crossbeam_channel::Sender<HubMessage>, Arc<ConnectionManager<AddressManager>>, std::thread::JoinHandle<()>)
where
    C: glyphchain_common::Chain + 'static,
    M: glyphchain_common::TxMemPool + 'static,
    S: glyphchain_common::SyncMgr + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    let next_id = Arc::new(std::sync::atomic::AtomicU64::new(1));

    let connmgr = ConnectionManager::new(store, config.connmgr.clone(), tx.clone(), next_id, config.connect.clone());
    for addr in &config.listen {
        if let Err(err) = connmgr.listen(*addr) {
            log::warn!(target: "p2p", "failed to listen on {addr}: {err}");
        }
    }
    connmgr.run_outbound();

    let local_services = config.connmgr.peer.services;
    let hub = Hub::new(chain, mempool, syncmgr, config.whitelist.clone(), clock, local_services);
    let join = std::thread::spawn(move || hub.run(rx));

    (tx, connmgr, join)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_listeners_or_persistent_peers() {
        let config = Config::default();
        assert!(config.listen.is_empty());
        assert!(config.connect.is_empty());
    }
}
