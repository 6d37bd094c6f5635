//! Smoke test wiring the same engines `glyphchain_node::run` builds and
//! driving a handful of read-only RPC methods straight through
//! `Context::dispatch`, without binding any listener.
use std::sync::{Arc, Mutex};

use glyphchain_node::stubs::{MemChain, MemMempool, NoopSyncMgr, SimpleGenerator, SimpleMiner};
use glyphchain_p2p::{AddressManager, HubMessage};
use glyphchain_rpc::methods::{Context, RuntimeState};
use glyphchain_rpc::workstate::{CoinbaseMode, WorkState};
use glyphchain_wire::Network;

#[test]
fn dispatch_answers_basic_queries_against_the_stub_engines() {
    let chain = Arc::new(MemChain::default());
    let mempool = Arc::new(MemMempool::default());
    let syncmgr = Arc::new(NoopSyncMgr::new(chain.clone()));
    let generator = Arc::new(SimpleGenerator::new(chain.clone(), mempool.clone()));
    let miner = Arc::new(SimpleMiner::new(chain.clone(), mempool.clone(), generator.clone()));

    let addrmgr = Arc::new(Mutex::new(AddressManager::new()));
    let clock: Arc<dyn glyphchain_common::Clock> = Arc::new(glyphchain_common::SystemClock);
    let (hub, connmgr, _hub_join) = glyphchain_p2p::spawn(
        glyphchain_p2p::Config::default(),
        chain.clone(),
        mempool.clone(),
        syncmgr.clone(),
        addrmgr,
        clock,
    );

    let workstate = Arc::new(WorkState::new(chain.clone(), mempool.clone(), generator.clone(), CoinbaseMode::Value("miner".into())));

    let context = Context {
        chain,
        mempool,
        syncmgr,
        generator,
        miner,
        connmgr,
        hub: hub.clone(),
        workstate,
        network: Network::default(),
        generate_supported: true,
        runtime: RuntimeState::default(),
        mining_addresses: Arc::new(Mutex::new(vec!["miner".into()])),
        tx_index: None,
        addr_index: None,
        cf_index: None,
    };

    assert_eq!(context.dispatch("ping", &[]).unwrap(), serde_json::Value::Null);
    assert_eq!(context.dispatch("getblockcount", &[]).unwrap(), serde_json::json!(0));
    assert!(context.dispatch("getbestblockhash", &[]).is_ok());
    assert!(context.dispatch("getmininginfo", &[]).is_ok());
    assert!(matches!(context.dispatch("nosuchmethod", &[]), Err(_)));

    let _ = hub.send(HubMessage::Shutdown);
}
