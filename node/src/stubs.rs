//! In-memory stand-ins for the chain, mempool, sync manager and block
//! generator. These are scaffolding, not a second consensus engine (spec §1
//! leaves `Chain`/`TxMemPool`/`SyncMgr`/`Generator` external collaborators
//! with a specified interface only): just enough bookkeeping to exercise the
//! RPC dispatcher, notifier and p2p hub end to end.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use glyphchain_common::block::{Height, Target};
use glyphchain_common::chain::{
    BestSnapshot, Chain, ChainError, ChainNotification, ProcessFlags, ProcessResult, ThresholdState, UtxoEntry,
};
use glyphchain_common::generator::{BlockTemplate, CPUMiner, Generator, GeneratorError};
use glyphchain_common::mempool::{MempoolError, TxDesc, TxMemPool};
use glyphchain_common::syncmgr::SyncMgr;
use glyphchain_wire::{
    Block, BlockHash, BlockHeader, Inventory, OutPoint, Script, Transaction, TxIn, TxOut, Txid,
};

fn genesis_header() -> BlockHeader {
    BlockHeader { version: 1, prev_blockhash: BlockHash::all_zeros(), merkle_root: BlockHash::all_zeros(), time: 0, bits: 0x207f_ffff, nonce: 0 }
}

struct ChainState {
    headers: Vec<BlockHeader>,
    blocks: HashMap<BlockHash, Block>,
    height_by_hash: HashMap<BlockHash, Height>,
    subscribers: Vec<Box<dyn Fn(ChainNotification) + Send + Sync>>,
}

/// A chain that only ever holds the blocks it's handed: no header tree, no
/// reorg handling, no proof-of-work check. `process_block` always extends
/// the tip if the new block's `prev_blockhash` matches it.
pub struct MemChain {
    state: Mutex<ChainState>,
}

impl Default for MemChain {
    fn default() -> Self {
        let genesis = genesis_header();
        let hash = genesis.block_hash();
        let block = Block { header: genesis, txdata: Vec::new() };
        let mut height_by_hash = HashMap::new();
        height_by_hash.insert(hash, 0);
        let mut blocks = HashMap::new();
        blocks.insert(hash, block);
        MemChain { state: Mutex::new(ChainState { headers: vec![genesis], blocks, height_by_hash, subscribers: Vec::new() }) }
    }
}

impl Chain for MemChain {
    fn best_snapshot(&self) -> BestSnapshot {
        let state = self.state.lock().unwrap();
        let header = *state.headers.last().expect("genesis is always present");
        let hash = header.block_hash();
        let height = state.height_by_hash[&hash];
        let block = &state.blocks[&hash];
        BestSnapshot {
            hash,
            height,
            bits: header.bits,
            block_size: block.stripped_size() as u64,
            block_weight: block.weight() as u64,
            num_txns: block.txdata.len() as u64,
            median_time: header.time,
        }
    }

    fn block_by_hash(&self, hash: &BlockHash) -> Option<Block> {
        self.state.lock().unwrap().blocks.get(hash).cloned()
    }

    fn block_by_height(&self, height: Height) -> Option<Block> {
        let state = self.state.lock().unwrap();
        let header = state.headers.get(height as usize)?;
        state.blocks.get(&header.block_hash()).cloned()
    }

    fn block_height_by_hash(&self, hash: &BlockHash) -> Option<Height> {
        self.state.lock().unwrap().height_by_hash.get(hash).copied()
    }

    fn header_by_hash(&self, hash: &BlockHash) -> Option<BlockHeader> {
        self.state.lock().unwrap().blocks.get(hash).map(|b| b.header)
    }

    fn locate_headers(&self, locators: &[BlockHash], stop: BlockHash) -> Vec<BlockHeader> {
        let state = self.state.lock().unwrap();
        let start = locators
            .iter()
            .filter_map(|hash| state.height_by_hash.get(hash).copied())
            .max()
            .map(|h| h + 1)
            .unwrap_or(0);
        state
            .headers
            .iter()
            .skip(start as usize)
            .take_while(|h| h.block_hash() != stop)
            .cloned()
            .collect()
    }

    fn locate_blocks(&self, locators: &[BlockHash], stop: BlockHash, max: usize) -> Vec<BlockHash> {
        self.locate_headers(locators, stop).iter().map(|h| h.block_hash()).take(max).collect()
    }

    fn height_to_hash_range(&self, start: Height, stop: &BlockHash, max: usize) -> Result<Vec<BlockHash>, ChainError> {
        let state = self.state.lock().unwrap();
        let stop_height = *state.height_by_hash.get(stop).ok_or(ChainError::UnknownBlock(*stop))?;
        Ok((start..=stop_height).take(max).filter_map(|h| state.headers.get(h as usize).map(|hd| hd.block_hash())).collect())
    }

    fn interval_block_hashes(&self, stop: Height, interval: Height) -> Vec<BlockHash> {
        let state = self.state.lock().unwrap();
        if interval == 0 {
            return Vec::new();
        }
        (0..=stop).step_by(interval as usize).filter_map(|h| state.headers.get(h as usize).map(|hd| hd.block_hash())).collect()
    }

    fn process_block(&self, block: Block, _flags: ProcessFlags) -> Result<ProcessResult, ChainError> {
        let mut state = self.state.lock().unwrap();
        let tip = *state.headers.last().expect("genesis is always present");
        if block.header.prev_blockhash != tip.block_hash() {
            let hash = block.block_hash();
            state.blocks.insert(hash, block);
            return Ok(ProcessResult { is_main_chain: false, is_orphan: true });
        }
        let height = state.headers.len() as Height;
        let hash = block.block_hash();
        state.headers.push(block.header);
        state.height_by_hash.insert(hash, height);
        state.blocks.insert(hash, block.clone());
        for callback in &state.subscribers {
            callback(ChainNotification::BlockConnected(Box::new(block.clone())));
        }
        Ok(ProcessResult { is_main_chain: true, is_orphan: false })
    }

    fn check_connect_block_template(&self, block: &Block) -> Result<(), ChainError> {
        let state = self.state.lock().unwrap();
        let tip = state.headers.last().expect("genesis is always present");
        if block.header.prev_blockhash != tip.block_hash() {
            return Err(ChainError::RuleViolation("prev-blockhash doesn't match tip".into()));
        }
        Ok(())
    }

    fn is_deployment_active(&self, _id: u32) -> bool {
        false
    }

    fn threshold_state(&self, _id: u32) -> ThresholdState {
        ThresholdState::Defined
    }

    fn fetch_utxo_entry(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        let state = self.state.lock().unwrap();
        for (hash, block) in &state.blocks {
            let height = *state.height_by_hash.get(hash)?;
            for (idx, tx) in block.txdata.iter().enumerate() {
                if tx.txid() == outpoint.txid {
                    let output = tx.output.get(outpoint.vout as usize)?.clone();
                    return Some(UtxoEntry { output, height, is_coinbase: idx == 0 });
                }
            }
        }
        None
    }

    fn calc_sequence_lock(&self, _tx: &Transaction) -> (Height, i64) {
        (0, -1)
    }

    fn subscribe(&self, callback: Box<dyn Fn(ChainNotification) + Send + Sync>) {
        self.state.lock().unwrap().subscribers.push(callback);
    }
}

/// A flat map of accepted transactions, with no orphan pool and no fee
/// estimation: every transaction that parses is accepted.
#[derive(Default)]
pub struct MemMempool {
    txs: Mutex<HashMap<Txid, TxDesc>>,
    last_updated: AtomicU64,
}

impl TxMemPool for MemMempool {
    fn process_transaction(&self, tx: Transaction, _allow_orphan: bool, _rate_limit: bool, _tag: u64) -> Result<Vec<Txid>, MempoolError> {
        let txid = tx.txid();
        let mut txs = self.txs.lock().unwrap();
        if txs.contains_key(&txid) {
            return Err(MempoolError::Rejected("already in mempool".into()));
        }
        txs.insert(txid, TxDesc { tx, added: now_unix(), height: 0, fee: 0, fee_per_kb: 0 });
        self.last_updated.store(now_unix(), Ordering::Relaxed);
        Ok(vec![txid])
    }

    fn fetch_transaction(&self, txid: &Txid) -> Option<Transaction> {
        self.txs.lock().unwrap().get(txid).map(|d| d.tx.clone())
    }

    fn have_transaction(&self, txid: &Txid) -> bool {
        self.txs.lock().unwrap().contains_key(txid)
    }

    fn check_spend(&self, outpoint: &OutPoint) -> Option<Txid> {
        self.txs.lock().unwrap().values().find(|d| d.tx.input.iter().any(|i| i.previous_output == *outpoint)).map(|d| d.tx.txid())
    }

    fn remove_transaction(&self, txid: &Txid, _remove_redeemers: bool) {
        self.txs.lock().unwrap().remove(txid);
        self.last_updated.store(now_unix(), Ordering::Relaxed);
    }

    fn remove_orphans_by_tag(&self, _tag: u64) -> usize {
        0
    }

    fn tx_descs(&self) -> Vec<TxDesc> {
        self.txs.lock().unwrap().values().cloned().collect()
    }

    fn count(&self) -> usize {
        self.txs.lock().unwrap().len()
    }

    fn last_updated(&self) -> u64 {
        self.last_updated.load(Ordering::Relaxed)
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// A sync manager that applies blocks directly to the chain it's given and
/// reports itself as always current: there's no header-first download to
/// track since `MemChain` has no orphan/reorg handling to coordinate around.
pub struct NoopSyncMgr<C> {
    chain: std::sync::Arc<C>,
}

impl<C> NoopSyncMgr<C> {
    pub fn new(chain: std::sync::Arc<C>) -> Self {
        NoopSyncMgr { chain }
    }
}

impl<C: Chain> SyncMgr for NoopSyncMgr<C> {
    fn new_peer(&self, _peer_id: u64) {}
    fn done_peer(&self, _peer_id: u64) {}

    fn queue_tx(&self, _peer_id: u64, _tx: Transaction, done: crossbeam_channel::Sender<()>) {
        let _ = done.send(());
    }

    fn queue_block(&self, _peer_id: u64, block: Block, done: crossbeam_channel::Sender<()>) {
        let _ = self.chain.process_block(block, ProcessFlags::default());
        let _ = done.send(());
    }

    fn queue_inv(&self, _peer_id: u64, _inv: Vec<Inventory>) {}
    fn queue_headers(&self, _peer_id: u64, _headers: Vec<BlockHeader>) {}

    fn is_current(&self) -> bool {
        true
    }

    fn sync_peer_id(&self) -> Option<u64> {
        None
    }

    fn process_block(&self, block: Block) -> bool {
        self.chain.process_block(block, ProcessFlags::default()).map(|r| r.is_main_chain).unwrap_or(false)
    }

    fn pause(&self) -> crossbeam_channel::Receiver<()> {
        let (tx, rx) = crossbeam_channel::bounded(0);
        drop(tx);
        rx
    }
}

/// Builds a one-transaction (coinbase-only) block template against the
/// chain's current tip, paying the first configured mining address.
pub struct SimpleGenerator<C, M> {
    chain: std::sync::Arc<C>,
    mempool: std::sync::Arc<M>,
}

impl<C, M> SimpleGenerator<C, M> {
    pub fn new(chain: std::sync::Arc<C>, mempool: std::sync::Arc<M>) -> Self {
        SimpleGenerator { chain, mempool }
    }
}

fn coinbase_tx(height: Height, value: u64) -> Transaction {
    Transaction {
        version: 1,
        input: vec![TxIn {
            previous_output: OutPoint { txid: Txid::all_zeros(), vout: 0xffff_ffff },
            script_sig: Script(height.to_le_bytes().to_vec()),
            sequence: 0xffff_ffff,
            witness: Vec::new(),
        }],
        output: vec![TxOut { value, script_pubkey: Script(Vec::new()) }],
        lock_time: 0,
    }
}

impl<C: Chain, M: TxMemPool> Generator for SimpleGenerator<C, M> {
    fn new_block_template(&self, mining_addresses: &[String]) -> Result<BlockTemplate, GeneratorError> {
        if mining_addresses.is_empty() {
            return Err(GeneratorError::NoMiningAddress);
        }
        let snapshot = self.chain.best_snapshot();
        let height = snapshot.height + 1;
        let coinbase = coinbase_tx(height, 50_0000_0000);
        let mut txdata = vec![coinbase];
        txdata.extend(self.mempool.tx_descs().into_iter().map(|d| d.tx));
        let header = BlockHeader {
            version: 1,
            prev_blockhash: snapshot.hash,
            merkle_root: BlockHash::all_zeros(),
            time: now_unix() as u32,
            bits: snapshot.bits,
            nonce: 0,
        };
        let fees = vec![0; txdata.len()];
        Ok(BlockTemplate { block: Block { header, txdata }, height, fees, paid_out: false })
    }

    fn update_block_time(&self, template: &mut BlockTemplate, time: glyphchain_common::block::BlockTime) {
        template.block.header.time = time;
    }
}

/// Brute-forces a nonce against the template's target, with no difficulty
/// readjustment and no real mining hardware to parallelize across: one
/// thread, bounded search, per generated block.
pub struct SimpleMiner<C, M, G> {
    chain: std::sync::Arc<C>,
    mempool: std::sync::Arc<M>,
    generator: std::sync::Arc<G>,
}

impl<C, M, G> SimpleMiner<C, M, G> {
    pub fn new(chain: std::sync::Arc<C>, mempool: std::sync::Arc<M>, generator: std::sync::Arc<G>) -> Self {
        SimpleMiner { chain, mempool, generator }
    }
}

impl<C: Chain, M: TxMemPool, G: Generator> CPUMiner for SimpleMiner<C, M, G> {
    fn generate_blocks(&self, n: usize, mining_addresses: &[String]) -> Result<Vec<Block>, GeneratorError> {
        let mut blocks = Vec::with_capacity(n);
        for _ in 0..n {
            let mut template = self.generator.new_block_template(mining_addresses)?;
            let target = Target::from_compact(template.block.header.bits).0.max(1);
            let mut found = false;
            for nonce in 0..u32::MAX {
                template.block.header.nonce = nonce;
                let hash = template.block.header.block_hash();
                let hash_value = u128::from_be_bytes(hash.as_byte_array()[0..16].try_into().unwrap());
                if hash_value <= target {
                    found = true;
                    break;
                }
            }
            if !found {
                return Err(GeneratorError::Failed("exhausted nonce space".into()));
            }
            self.chain
                .process_block(template.block.clone(), ProcessFlags::default())
                .map_err(|e| GeneratorError::Failed(e.to_string()))?;
            blocks.push(template.block);
        }
        Ok(blocks)
    }

    fn solve(&self, template: &BlockTemplate) -> Option<Transaction> {
        let _ = &self.mempool;
        template.block.txdata.first().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_height_zero() {
        let chain = MemChain::default();
        let snapshot = chain.best_snapshot();
        assert_eq!(snapshot.height, 0);
    }

    #[test]
    fn process_block_extends_tip() {
        let chain = MemChain::default();
        let tip = chain.best_snapshot();
        let header = BlockHeader { version: 1, prev_blockhash: tip.hash, merkle_root: BlockHash::all_zeros(), time: 1, bits: tip.bits, nonce: 0 };
        let block = Block { header, txdata: vec![coinbase_tx(1, 50_0000_0000)] };
        let result = chain.process_block(block, ProcessFlags::default()).unwrap();
        assert!(result.is_main_chain);
        assert_eq!(chain.best_snapshot().height, 1);
    }

    #[test]
    fn mempool_rejects_duplicate_transaction() {
        let mempool = MemMempool::default();
        let tx = coinbase_tx(0, 1);
        mempool.process_transaction(tx.clone(), false, false, 0).unwrap();
        assert!(mempool.process_transaction(tx, false, false, 0).is_err());
    }

    #[test]
    fn generator_needs_a_mining_address() {
        let chain = std::sync::Arc::new(MemChain::default());
        let mempool = std::sync::Arc::new(MemMempool::default());
        let generator = SimpleGenerator::new(chain, mempool);
        assert!(matches!(generator.new_block_template(&[]), Err(GeneratorError::NoMiningAddress)));
    }
}
