//! The block template generator and CPU miner contracts. Not named
//! explicitly in spec §6's external-interfaces list (that section only
//! covers `Chain`/`TxMemPool`/`SyncMgr`), but required by §1's scope list and
//! exercised by the GBT/getwork work-state (C9) and `generate`/`setgenerate`
//! RPC handlers (C7).
use glyphchain_wire::{Block, Transaction};

use crate::block::{BlockTime, Height};

/// A candidate block with all fields finalized except the nonce, per the
/// glossary entry for "Block template".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub block: Block,
    pub height: Height,
    pub fees: Vec<i64>,
    /// `true` once a mining-address payout has been written into the
    /// coinbase, tracked so coinbase-txn mode can patch in a fresh payout
    /// without a full regeneration (spec §4.9).
    pub paid_out: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("no mining address configured")]
    NoMiningAddress,
    #[error("template generation failed: {0}")]
    Failed(String),
}

/// Produces block templates for the GBT/getwork work-state.
pub trait Generator: Send + Sync {
    fn new_block_template(&self, mining_addresses: &[String]) -> Result<BlockTemplate, GeneratorError>;
    /// Patches the template's timestamp in place without a full
    /// regeneration (spec §4.9 "just `update_block_time`").
    fn update_block_time(&self, template: &mut BlockTemplate, time: BlockTime);
}

/// Drives proof-of-work search for the `generate`/`setgenerate` RPC methods.
pub trait CPUMiner: Send + Sync {
    fn generate_blocks(&self, n: usize, mining_addresses: &[String]) -> Result<Vec<Block>, GeneratorError>;
    fn solve(&self, template: &BlockTemplate) -> Option<Transaction>;
}
