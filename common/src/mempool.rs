//! The mempool contract (spec §6).
use glyphchain_wire::{OutPoint, Transaction, Txid};

/// A summary of a mempool transaction, as returned by `tx_descs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDesc {
    pub tx: Transaction,
    pub added: u64,
    pub height: u64,
    pub fee: i64,
    pub fee_per_kb: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum MempoolError {
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("orphan transaction")]
    Orphan,
}

pub trait TxMemPool: Send + Sync {
    fn process_transaction(
        &self,
        tx: Transaction,
        allow_orphan: bool,
        rate_limit: bool,
        tag: u64,
    ) -> Result<Vec<Txid>, MempoolError>;
    fn fetch_transaction(&self, txid: &Txid) -> Option<Transaction>;
    fn have_transaction(&self, txid: &Txid) -> bool;
    fn check_spend(&self, outpoint: &OutPoint) -> Option<Txid>;
    fn remove_transaction(&self, txid: &Txid, remove_redeemers: bool);
    fn remove_orphans_by_tag(&self, tag: u64) -> usize;
    fn tx_descs(&self) -> Vec<TxDesc>;
    fn raw_mempool_verbose(&self) -> Vec<TxDesc> {
        self.tx_descs()
    }
    fn count(&self) -> usize;
    /// Unix timestamp of the last mempool mutation, used by the GBT
    /// work-state to decide whether a cached template is stale (spec §4.9).
    fn last_updated(&self) -> u64;
}
