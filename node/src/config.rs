//! The immutable configuration object threaded through construction (spec §9:
//! "replace the global `cfg` singleton with an immutable `Config` passed at
//! construction"). Plain struct, no file/CLI parsing — out of scope per
//! spec §1.
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use glyphchain_wire::Network;

/// Every tunable named across spec.md, grouped by the subsystem it belongs
/// to rather than flattened, so each subsystem's `spawn`/`new` can take just
/// its own slice.
#[derive(Clone)]
pub struct Config {
    pub network: Network,
    pub data_dir: PathBuf,
    pub p2p: glyphchain_p2p::Config,
    pub rpc: glyphchain_rpc::Config,
    /// Address(es) paid by `generate`/mined blocks when no coinbase-txn pool
    /// is configured.
    pub mining_address: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: Network::default(),
            data_dir: PathBuf::from("."),
            p2p: glyphchain_p2p::Config::default(),
            rpc: glyphchain_rpc::Config::default(),
            mining_address: None,
        }
    }
}

/// Fields that change for the life of the process but don't belong to any
/// single external engine: active mining addresses and the checkpoint set
/// currently enforced, mirroring `rpc::methods::RuntimeState`'s split for
/// the RPC surface's own runtime fields (spec §9).
#[derive(Default)]
pub struct RuntimeState {
    pub active_mining_addresses: Arc<Mutex<Vec<String>>>,
    pub active_checkpoints: Mutex<Vec<glyphchain_wire::BlockHash>>,
}

impl RuntimeState {
    pub fn set_mining_addresses(&self, addrs: Vec<String>) {
        *self.active_mining_addresses.lock().unwrap() = addrs;
    }

    pub fn mining_addresses(&self) -> Vec<String> {
        self.active_mining_addresses.lock().unwrap().clone()
    }

    /// The shared backing store, handed to `rpc::methods::Context` so both
    /// sides see the same runtime mining-address updates.
    pub fn shared_addresses(&self) -> Arc<Mutex<Vec<String>>> {
        self.active_mining_addresses.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_mining_address() {
        assert!(Config::default().mining_address.is_none());
    }

    #[test]
    fn runtime_state_tracks_mining_addresses() {
        let state = RuntimeState::default();
        state.set_mining_addresses(vec!["addr1".into()]);
        assert_eq!(state.mining_addresses(), vec!["addr1".to_string()]);
    }
}
