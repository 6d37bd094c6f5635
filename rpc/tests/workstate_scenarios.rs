//! End-to-end scenario from the template-staleness property (spec §8 scenario
//! 2): a cached template is invalidated the moment the chain tip moves, and a
//! long-poll waiter registered against the stale id is released promptly.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use glyphchain_common::block::{BlockTime, Height};
use glyphchain_common::chain::{
    BestSnapshot, Chain, ChainError, ChainNotification, ProcessFlags, ProcessResult, ThresholdState, UtxoEntry,
};
use glyphchain_common::generator::{BlockTemplate, Generator, GeneratorError};
use glyphchain_common::mempool::{MempoolError, TxDesc, TxMemPool};
use glyphchain_wire::{Block, BlockHash, BlockHeader, OutPoint, Transaction, Txid};
use glyphchain_rpc::workstate::{CoinbaseMode, WorkState};

struct FakeChain {
    hash: Mutex<BlockHash>,
    height: AtomicU32,
}

impl FakeChain {
    fn new() -> Self {
        FakeChain { hash: Mutex::new(BlockHash::all_zeros()), height: AtomicU32::new(0) }
    }

    fn advance_tip(&self) {
        let mut hash = self.hash.lock().unwrap();
        let mut bytes = [0u8; 32];
        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        bytes[0..4].copy_from_slice(&height.to_le_bytes());
        *hash = BlockHash::from_slice(&bytes).unwrap();
    }
}

impl Chain for FakeChain {
    fn best_snapshot(&self) -> BestSnapshot {
        BestSnapshot {
            hash: *self.hash.lock().unwrap(),
            height: self.height.load(Ordering::SeqCst) as Height,
            bits: 0x207f_ffff,
            block_size: 0,
            block_weight: 0,
            num_txns: 0,
            median_time: 0,
        }
    }
    fn block_by_hash(&self, _hash: &BlockHash) -> Option<Block> {
        None
    }
    fn block_by_height(&self, _height: Height) -> Option<Block> {
        None
    }
    fn block_height_by_hash(&self, _hash: &BlockHash) -> Option<Height> {
        None
    }
    fn header_by_hash(&self, _hash: &BlockHash) -> Option<BlockHeader> {
        None
    }
    fn locate_headers(&self, _locators: &[BlockHash], _stop: BlockHash) -> Vec<BlockHeader> {
        Vec::new()
    }
    fn locate_blocks(&self, _locators: &[BlockHash], _stop: BlockHash, _max: usize) -> Vec<BlockHash> {
        Vec::new()
    }
    fn height_to_hash_range(&self, _start: Height, _stop: &BlockHash, _max: usize) -> Result<Vec<BlockHash>, ChainError> {
        Ok(Vec::new())
    }
    fn interval_block_hashes(&self, _stop: Height, _interval: Height) -> Vec<BlockHash> {
        Vec::new()
    }
    fn process_block(&self, _block: Block, _flags: ProcessFlags) -> Result<ProcessResult, ChainError> {
        Ok(ProcessResult { is_main_chain: true, is_orphan: false })
    }
    fn check_connect_block_template(&self, _block: &Block) -> Result<(), ChainError> {
        Ok(())
    }
    fn is_deployment_active(&self, _id: u32) -> bool {
        false
    }
    fn threshold_state(&self, _id: u32) -> ThresholdState {
        ThresholdState::Defined
    }
    fn fetch_utxo_entry(&self, _outpoint: &OutPoint) -> Option<UtxoEntry> {
        None
    }
    fn calc_sequence_lock(&self, _tx: &Transaction) -> (Height, i64) {
        (0, -1)
    }
    fn subscribe(&self, _callback: Box<dyn Fn(ChainNotification) + Send + Sync>) {}
}

#[derive(Default)]
struct FakeMempool {
    last_updated: AtomicU32,
}

impl TxMemPool for FakeMempool {
    fn process_transaction(&self, tx: Transaction, _allow_orphan: bool, _rate_limit: bool, _tag: u64) -> Result<Vec<Txid>, MempoolError> {
        Ok(vec![tx.txid()])
    }
    fn fetch_transaction(&self, _txid: &Txid) -> Option<Transaction> {
        None
    }
    fn have_transaction(&self, _txid: &Txid) -> bool {
        false
    }
    fn check_spend(&self, _outpoint: &OutPoint) -> Option<Txid> {
        None
    }
    fn remove_transaction(&self, _txid: &Txid, _remove_redeemers: bool) {}
    fn remove_orphans_by_tag(&self, _tag: u64) -> usize {
        0
    }
    fn tx_descs(&self) -> Vec<TxDesc> {
        Vec::new()
    }
    fn count(&self) -> usize {
        0
    }
    fn last_updated(&self) -> u64 {
        self.last_updated.load(Ordering::SeqCst) as u64
    }
}

impl FakeMempool {
    fn touch(&self) {
        self.last_updated.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeGenerator {
    chain: Arc<FakeChain>,
}

impl Generator for FakeGenerator {
    fn new_block_template(&self, mining_addresses: &[String]) -> Result<BlockTemplate, GeneratorError> {
        if mining_addresses.is_empty() {
            return Err(GeneratorError::NoMiningAddress);
        }
        let snapshot = self.chain.best_snapshot();
        let header = BlockHeader { version: 1, prev_blockhash: snapshot.hash, merkle_root: BlockHash::all_zeros(), time: 0, bits: snapshot.bits, nonce: 0 };
        Ok(BlockTemplate { block: Block { header, txdata: Vec::new() }, height: snapshot.height + 1, fees: Vec::new(), paid_out: false })
    }
    fn update_block_time(&self, template: &mut BlockTemplate, time: BlockTime) {
        template.block.header.time = time;
    }
}

#[test]
fn template_staleness_invalidates_long_poll_on_tip_change() {
    let chain = Arc::new(FakeChain::new());
    let mempool = Arc::new(FakeMempool::default());
    let generator = Arc::new(FakeGenerator { chain: chain.clone() });
    let workstate = WorkState::new(chain.clone(), mempool, generator, CoinbaseMode::Value("miner".into()));

    let first = workstate.view().unwrap();
    let rx = workstate.register_long_poll(&first.long_poll_id).expect("id matches the freshly built template");

    chain.advance_tip();
    let second = workstate.view().unwrap();

    assert_ne!(first.prev_hash, second.prev_hash);
    // The registered waker's sender is dropped once the stale id's entry is
    // removed, so a long-poller wakes on disconnect rather than a message.
    assert!(rx.recv_timeout(std::time::Duration::from_millis(50)).is_err());
}

#[test]
fn register_long_poll_rejects_an_id_that_no_longer_matches() {
    let chain = Arc::new(FakeChain::new());
    let mempool = Arc::new(FakeMempool::default());
    let generator = Arc::new(FakeGenerator { chain: chain.clone() });
    let workstate = WorkState::new(chain.clone(), mempool, generator, CoinbaseMode::Value("miner".into()));

    workstate.view().unwrap();
    chain.advance_tip();
    workstate.view().unwrap();

    assert!(workstate.register_long_poll("stale-id-that-never-existed").is_none());
}

#[test]
fn submit_old_is_true_only_for_a_mempool_only_regeneration() {
    let chain = Arc::new(FakeChain::new());
    let mempool = Arc::new(FakeMempool::default());
    let generator = Arc::new(FakeGenerator { chain: chain.clone() });
    let workstate = WorkState::with_regenerate_after(
        chain.clone(),
        mempool.clone(),
        generator,
        CoinbaseMode::Value("miner".into()),
        std::time::Duration::from_secs(0),
    );

    let first = workstate.view().unwrap();
    assert!(!first.submit_old);

    mempool.touch();
    std::thread::sleep(std::time::Duration::from_secs(1));
    let second = workstate.view().unwrap();
    assert_eq!(first.prev_hash, second.prev_hash);
    assert!(second.submit_old);

    chain.advance_tip();
    let third = workstate.view().unwrap();
    assert!(!third.submit_old);
}
