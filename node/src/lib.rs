//! Daemon wiring: stands up the p2p hub, the RPC dispatcher and the mining
//! work-state behind one immutable [`config::Config`], then runs until
//! `stop` or a signal tells it to shut down.
pub mod config;
pub mod stubs;

use std::sync::Arc;

use glyphchain_p2p::AddressManager;
use glyphchain_rpc::methods::{Context, RuntimeState as RpcRuntimeState};
use glyphchain_rpc::notifier::Notifier;
use glyphchain_rpc::registry::Registry;
use glyphchain_rpc::workstate::WorkState;
use glyphchain_rpc::Dispatcher;
use thiserror::Error;

pub use config::{Config, RuntimeState};

type Chain = stubs::MemChain;
type Mempool = stubs::MemMempool;
type SyncMgr = stubs::NoopSyncMgr<Chain>;
type Generator = stubs::SimpleGenerator<Chain, Mempool>;
type Miner = stubs::SimpleMiner<Chain, Mempool, Generator>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to serve the RPC endpoint: {0}")]
    Rpc(#[source] std::io::Error),
}

/// Builds every engine, wires the p2p hub and RPC dispatcher to them, and
/// blocks serving RPC requests. Returns only on a listener error; `stop`
/// shuts the process down from inside the RPC handler instead of returning
/// here (spec §4.7 "stop").
pub fn run(config: Config) -> Result<(), Error> {
    log::info!("starting on {}", config.network);

    let chain = Arc::new(Chain::default());
    let mempool = Arc::new(Mempool::default());
    let syncmgr = Arc::new(SyncMgr::new(chain.clone()));
    let generator = Arc::new(Generator::new(chain.clone(), mempool.clone()));
    let miner = Arc::new(Miner::new(chain.clone(), mempool.clone(), generator.clone()));

    let addrmgr = Arc::new(std::sync::Mutex::new(AddressManager::new()));
    let clock: Arc<dyn glyphchain_common::Clock> = Arc::new(glyphchain_common::SystemClock);
    let (hub, connmgr, _hub_join) =
        glyphchain_p2p::spawn(config.p2p.clone(), chain.clone(), mempool.clone(), syncmgr.clone(), addrmgr, clock);

    let workstate = Arc::new(WorkState::new(chain.clone(), mempool.clone(), generator.clone(), config.rpc.coinbase.clone()));

    let runtime_state = Arc::new(RuntimeState::default());
    if let Some(addr) = &config.mining_address {
        runtime_state.set_mining_addresses(vec![addr.clone()]);
    }

    let (notifier_tx, _notifier_join) = Notifier::default().spawn();
    subscribe_chain_notifications(&chain, notifier_tx.clone());

    let context = Arc::new(Context {
        chain,
        mempool,
        syncmgr,
        generator,
        miner,
        connmgr,
        hub,
        workstate,
        network: config.network,
        generate_supported: true,
        runtime: RpcRuntimeState::default(),
        mining_addresses: runtime_state.shared_addresses(),
        tx_index: None,
        addr_index: None,
        cf_index: None,
    });

    let dispatcher = Arc::new(Dispatcher::new(config.rpc, Registry::default(), context, notifier_tx));
    dispatcher.serve().map_err(Error::Rpc)
}

/// Bridges chain-tip notifications into the notifier's mailbox (spec §4.8
/// "block connected/disconnected"), the same subscribe-once-at-startup shape
/// the teacher uses to wire `fsm` callbacks into `hub`.
fn subscribe_chain_notifications(chain: &Arc<Chain>, notifier: crossbeam_channel::Sender<glyphchain_rpc::notifier::ControlMessage>) {
    use glyphchain_common::chain::{Chain as _, ChainNotification};
    use glyphchain_rpc::notifier::{ControlMessage, Notification};

    chain.subscribe(Box::new(move |event| {
        let notification = match event {
            ChainNotification::BlockAccepted(_) => return,
            ChainNotification::BlockConnected(block) => Notification::BlockConnected(*block),
            ChainNotification::BlockDisconnected(block) => Notification::BlockDisconnected(*block),
        };
        let _ = notifier.send(ControlMessage::Notify(notification));
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_without_panicking() {
        let config = Config::default();
        assert_eq!(config.network, glyphchain_wire::Network::default());
    }
}
