//! The on-disk block/index storage contract and the optional indexers
//! (`TxIndex`, `AddrIndex`, `CfIndex`), all out of scope as implementations
//! per spec §1.
use glyphchain_wire::{Block, BlockHash, FilterHeader, Transaction, Txid};

use crate::block::Height;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(String),
}

pub trait DB: Send + Sync {
    fn store_block(&self, height: Height, block: &Block) -> Result<(), DbError>;
    fn fetch_block(&self, hash: &BlockHash) -> Result<Block, DbError>;
}

/// Full-transaction-by-id lookups, backing `getrawtransaction` with
/// `-txindex`.
pub trait TxIndex: Send + Sync {
    fn tx_by_id(&self, txid: &Txid) -> Option<(Transaction, BlockHash, Height)>;
}

/// Address-to-transaction lookups, backing `searchrawtransactions`.
pub trait AddrIndex: Send + Sync {
    fn txs_for_address(&self, address: &str, start: usize, count: usize) -> Vec<Txid>;
}

/// Committed-filter storage, backing `getcfilter`/`getcfilterheader` and the
/// checkpoint cache (C1/C10).
pub trait CfIndex: Send + Sync {
    fn filter(&self, hash: &BlockHash) -> Option<Vec<u8>>;
    fn filter_header(&self, hash: &BlockHash) -> Option<FilterHeader>;
}
