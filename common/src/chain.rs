//! The blockchain/UTXO engine contract (spec §6, "out of scope as an
//! external collaborator with a specified interface only"). No
//! implementation lives here beyond what `node`'s in-memory stand-in needs
//! to exercise the rest of the workspace in tests.
use glyphchain_wire::{Block, BlockHash, BlockHeader, OutPoint, Transaction, TxOut};

use crate::block::{BlockTime, Height};

/// Snapshot of the chain's current best block, as returned by
/// `best_snapshot()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestSnapshot {
    pub hash: BlockHash,
    pub height: Height,
    pub bits: u32,
    pub block_size: u64,
    pub block_weight: u64,
    pub num_txns: u64,
    pub median_time: BlockTime,
}

/// Flags controlling how a submitted block is processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessFlags {
    pub no_verify: bool,
}

/// Outcome of feeding a block to the chain engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    pub is_main_chain: bool,
    pub is_orphan: bool,
}

/// A soft-fork deployment's activation state, as reported by
/// `threshold_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

/// Chain-event notifications delivered to `subscribe`'s callback.
#[derive(Debug, Clone)]
pub enum ChainNotification {
    BlockAccepted(Box<Block>),
    BlockConnected(Box<Block>),
    BlockDisconnected(Box<Block>),
}

/// A reference to an unspent transaction output, as returned by
/// `fetch_utxo_entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    pub output: TxOut,
    pub height: Height,
    pub is_coinbase: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("unknown block: {0}")]
    UnknownBlock(BlockHash),
    #[error("unknown height: {0}")]
    UnknownHeight(Height),
    #[error("rule violation: {0}")]
    RuleViolation(String),
}

/// The blockchain/UTXO engine contract, per spec §6.
pub trait Chain: Send + Sync {
    fn best_snapshot(&self) -> BestSnapshot;
    fn block_by_hash(&self, hash: &BlockHash) -> Option<Block>;
    fn block_by_height(&self, height: Height) -> Option<Block>;
    fn block_height_by_hash(&self, hash: &BlockHash) -> Option<Height>;
    fn header_by_hash(&self, hash: &BlockHash) -> Option<BlockHeader>;
    fn locate_headers(&self, locators: &[BlockHash], stop: BlockHash) -> Vec<BlockHeader>;
    fn locate_blocks(&self, locators: &[BlockHash], stop: BlockHash, max: usize) -> Vec<BlockHash>;
    fn height_to_hash_range(&self, start: Height, stop: &BlockHash, max: usize) -> Result<Vec<BlockHash>, ChainError>;
    fn interval_block_hashes(&self, stop: Height, interval: Height) -> Vec<BlockHash>;
    fn process_block(&self, block: Block, flags: ProcessFlags) -> Result<ProcessResult, ChainError>;
    fn check_connect_block_template(&self, block: &Block) -> Result<(), ChainError>;
    fn is_deployment_active(&self, id: u32) -> bool;
    fn threshold_state(&self, id: u32) -> ThresholdState;
    fn fetch_utxo_entry(&self, outpoint: &OutPoint) -> Option<UtxoEntry>;
    fn calc_sequence_lock(&self, tx: &Transaction) -> (Height, i64);
    fn subscribe(&self, callback: Box<dyn Fn(ChainNotification) + Send + Sync>);
}
