//! The sync manager contract (spec §6). The peer state machine hands off
//! `block`/`tx` messages to this collaborator and blocks on the returned
//! done-channel as backpressure against flood (spec §4.2, §5).
use glyphchain_wire::{Block, BlockHeader, Inventory, Transaction};

pub trait SyncMgr: Send + Sync {
    fn new_peer(&self, peer_id: u64);
    fn done_peer(&self, peer_id: u64);
    /// Hands a transaction to the sync manager; `done` is signalled once
    /// processing completes, which the caller's read loop blocks on.
    fn queue_tx(&self, peer_id: u64, tx: Transaction, done: crossbeam_channel::Sender<()>);
    fn queue_block(&self, peer_id: u64, block: Block, done: crossbeam_channel::Sender<()>);
    fn queue_inv(&self, peer_id: u64, inv: Vec<Inventory>);
    fn queue_headers(&self, peer_id: u64, headers: Vec<BlockHeader>);
    fn is_current(&self) -> bool;
    fn sync_peer_id(&self) -> Option<u64>;
    fn process_block(&self, block: Block) -> bool;
    /// Pauses sync processing for the duration the returned guard is held,
    /// used by the rescan engine's reorg-safe continuation handoff (spec
    /// §4.10).
    fn pause(&self) -> crossbeam_channel::Receiver<()>;
}
