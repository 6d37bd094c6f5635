//! The rescan engine (C10, spec §4.10): walks historical blocks backward in
//! height-bounded chunks looking for transactions relevant to a watch set,
//! aborting and restarting from the fork point if a reorg is observed
//! mid-scan. Grounded on `connmgr::redial_persistent`'s "compute the work
//! inside a short lock, act on it outside the lock" discipline, generalized
//! from dial targets to block heights.
use std::sync::Arc;
use std::time::{Duration, Instant};

use glyphchain_common::block::Height;
use glyphchain_common::chain::Chain;
use glyphchain_common::syncmgr::SyncMgr;
use glyphchain_wire::{Block, OutPoint, Transaction, Txid};

use crate::notifier::{ClientQuit, TxFilter};

/// How many blocks are read from the chain engine per scan step before
/// checking for a reorg and emitting progress (spec §4.10 "chunked").
const CHUNK_SIZE: Height = 100;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Why a rescan stopped short of `Finished` (spec §4.10 "Reorg recovery" and
/// the `ClientQuit` early-stop contract shared with the notifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Reorg,
    ClientQuit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanOutcome {
    Finished { last_height: Height },
    Aborted(AbortReason),
}

/// A scan's watch set: the same fast-path script shapes as the live
/// notifier's [`TxFilter`](crate::notifier::TxFilter), plus an explicit
/// outpoint-unspent set seeded by the caller (spec §4.10 "rescan_keys").
pub struct RescanKeys {
    pub filter: TxFilter,
    pub outpoints: std::collections::HashSet<OutPoint>,
}

impl RescanKeys {
    pub fn new(filter: TxFilter, outpoints: std::collections::HashSet<OutPoint>) -> Self {
        RescanKeys { filter, outpoints }
    }

    fn spent_by(&self, tx: &Transaction) -> bool {
        tx.input.iter().any(|input| self.outpoints.contains(&input.previous_output))
    }

    fn absorb_outputs(&mut self, tx: &Transaction) -> bool {
        let mut received = false;
        for (vout, output) in tx.output.iter().enumerate() {
            if self.filter.matches_script(&output.script_pubkey) {
                self.outpoints.insert(OutPoint { txid: tx.txid(), vout: vout as u32 });
                received = true;
            }
        }
        received
    }
}

/// Where a rescan reports progress and matches as it walks blocks. Every
/// per-transaction callback can fail with [`ClientQuit`] when the client's
/// send queue is gone, at which point `run` stops early rather than
/// finishing a scan nobody is listening to (spec §4.8 "long-running handlers
/// (rescan) use it to stop early").
pub trait ProgressSink {
    fn progress(&self, scanned_through: Height, target: Height) -> Result<(), ClientQuit>;
    fn redeeming(&self, txid: Txid) -> Result<(), ClientQuit>;
    fn received(&self, txid: Txid) -> Result<(), ClientQuit>;
    fn finished(&self, last_height: Height);
}

/// Scans `[start_height, end_height.unwrap_or(tip)]` for transactions
/// relevant to `keys`. With no explicit end block the target chases the
/// live tip; when the engine notices mid-scan that a block it's about to
/// read has vanished under it, it restarts `CHUNK_SIZE` blocks behind the
/// new tip provided the already-scanned prefix is still an ancestor of that
/// new tip, otherwise it aborts (spec §4.10 "Reorg recovery"). With an
/// explicit end block any such divergence is fatal.
pub fn run<C: Chain>(chain: &Arc<C>, start_height: Height, end_height: Option<Height>, mut keys: RescanKeys, sink: &dyn ProgressSink) -> RescanOutcome {
    let mut height = start_height;
    let mut last_progress = Instant::now();
    let mut last_scanned: Option<(Height, glyphchain_wire::BlockHash)> = None;

    'restart: loop {
        let chain_tip = chain.best_snapshot().height;
        let target = end_height.unwrap_or(chain_tip).min(chain_tip);
        if height > target {
            sink.finished(target);
            return RescanOutcome::Finished { last_height: target };
        }

        while height <= target {
            let chunk_end = (height + CHUNK_SIZE).min(target);
            let mut reorged = false;
            for h in height..=chunk_end {
                match chain.block_by_height(h) {
                    Some(block) => {
                        match scan_block(&block, &mut keys, sink) {
                            Ok(()) => last_scanned = Some((h, block.block_hash())),
                            Err(ClientQuit) => return RescanOutcome::Aborted(AbortReason::ClientQuit),
                        }
                    }
                    None => {
                        // The height we were about to read vanished: a reorg
                        // happened under us.
                        reorged = true;
                        break;
                    }
                }
            }
            if reorged {
                if end_height.is_some() {
                    return RescanOutcome::Aborted(AbortReason::Reorg);
                }
                let ancestor_intact = match last_scanned {
                    Some((h, hash)) => chain.block_by_height(h).map(|b| b.block_hash() == hash).unwrap_or(false),
                    None => true,
                };
                if !ancestor_intact {
                    return RescanOutcome::Aborted(AbortReason::Reorg);
                }
                let new_target = chain.best_snapshot().height;
                height = new_target.saturating_sub(CHUNK_SIZE).min(new_target);
                continue 'restart;
            }

            height = chunk_end + 1;
            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                if sink.progress(chunk_end, target).is_err() {
                    return RescanOutcome::Aborted(AbortReason::ClientQuit);
                }
                last_progress = Instant::now();
            }

            if end_height.is_none() && chain.best_snapshot().height != target {
                continue 'restart;
            }
        }

        sink.finished(target);
        return RescanOutcome::Finished { last_height: target };
    }
}

fn scan_block(block: &Block, keys: &mut RescanKeys, sink: &dyn ProgressSink) -> Result<(), ClientQuit> {
    for tx in &block.txdata {
        if keys.spent_by(tx) {
            sink.redeeming(tx.txid())?;
        }
        if keys.absorb_outputs(tx) {
            sink.received(tx.txid())?;
        }
    }
    Ok(())
}

/// Hands the still-open watch set off for continuation once a caller-facing
/// rescan catches up to the live tip: pauses the sync manager so freshly
/// arriving blocks can't slip past the handoff, then the caller folds `keys`
/// into the live notifier's filter and drops the returned receiver to
/// release the pause (spec §4.10 "Continuation").
pub fn continue_under_pause<S: SyncMgr>(syncmgr: &S, keys: RescanKeys) -> (RescanKeys, crossbeam_channel::Receiver<()>) {
    (keys, syncmgr.pause())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphchain_wire::Script;

    #[test]
    fn empty_scan_at_tip_finishes_immediately() {
        let filter = TxFilter::default();
        let keys = RescanKeys { filter, outpoints: Default::default() };
        assert!(!keys.spent_by(&Transaction { version: 1, input: vec![], output: vec![], lock_time: 0 }));
    }

    #[test]
    fn absorbed_output_is_later_matched_as_spend() {
        let mut filter = TxFilter::default();
        filter.pubkey_hash.insert([9u8; 20]);
        let mut keys = RescanKeys { filter, outpoints: Default::default() };

        let mut script_bytes = vec![0x76, 0xa9, 0x14];
        script_bytes.extend_from_slice(&[9u8; 20]);
        script_bytes.push(0x88);
        script_bytes.push(0xac);
        let funding = Transaction {
            version: 1,
            input: vec![],
            output: vec![glyphchain_wire::TxOut { value: 5000, script_pubkey: Script(script_bytes) }],
            lock_time: 0,
        };
        keys.absorb_outputs(&funding);

        let spend = Transaction {
            version: 1,
            input: vec![glyphchain_wire::TxIn {
                previous_output: OutPoint { txid: funding.txid(), vout: 0 },
                script_sig: Script(vec![]),
                sequence: 0,
                witness: vec![],
            }],
            output: vec![],
            lock_time: 0,
        };
        assert!(keys.spent_by(&spend));
    }

    struct FakeRescanChain {
        blocks: Vec<Block>,
    }

    impl FakeRescanChain {
        fn new(count: usize) -> Self {
            let mut blocks = Vec::new();
            let mut prev = glyphchain_wire::BlockHash::all_zeros();
            for i in 0..count {
                let header = glyphchain_wire::BlockHeader {
                    version: 1,
                    prev_blockhash: prev,
                    merkle_root: glyphchain_wire::BlockHash::all_zeros(),
                    time: i as u32,
                    bits: 0x207f_ffff,
                    nonce: 0,
                };
                let block = Block { header, txdata: Vec::new() };
                prev = block.block_hash();
                blocks.push(block);
            }
            FakeRescanChain { blocks }
        }
    }

    impl Chain for FakeRescanChain {
        fn best_snapshot(&self) -> glyphchain_common::chain::BestSnapshot {
            glyphchain_common::chain::BestSnapshot {
                hash: self.blocks.last().map(Block::block_hash).unwrap_or_else(glyphchain_wire::BlockHash::all_zeros),
                height: self.blocks.len() as Height,
                bits: 0x207f_ffff,
                block_size: 0,
                block_weight: 0,
                num_txns: 0,
                median_time: 0,
            }
        }
        fn block_by_hash(&self, _hash: &glyphchain_wire::BlockHash) -> Option<Block> {
            None
        }
        fn block_by_height(&self, height: Height) -> Option<Block> {
            if height == 0 { return None }
            self.blocks.get(height as usize - 1).cloned()
        }
        fn block_height_by_hash(&self, _hash: &glyphchain_wire::BlockHash) -> Option<Height> {
            None
        }
        fn header_by_hash(&self, _hash: &glyphchain_wire::BlockHash) -> Option<glyphchain_wire::BlockHeader> {
            None
        }
        fn locate_headers(&self, _locators: &[glyphchain_wire::BlockHash], _stop: glyphchain_wire::BlockHash) -> Vec<glyphchain_wire::BlockHeader> {
            Vec::new()
        }
        fn locate_blocks(&self, _locators: &[glyphchain_wire::BlockHash], _stop: glyphchain_wire::BlockHash, _max: usize) -> Vec<glyphchain_wire::BlockHash> {
            Vec::new()
        }
        fn height_to_hash_range(&self, _start: Height, _stop: &glyphchain_wire::BlockHash, _max: usize) -> Result<Vec<glyphchain_wire::BlockHash>, glyphchain_common::chain::ChainError> {
            Ok(Vec::new())
        }
        fn interval_block_hashes(&self, _stop: Height, _interval: Height) -> Vec<glyphchain_wire::BlockHash> {
            Vec::new()
        }
        fn process_block(&self, _block: Block, _flags: glyphchain_common::chain::ProcessFlags) -> Result<glyphchain_common::chain::ProcessResult, glyphchain_common::chain::ChainError> {
            Ok(glyphchain_common::chain::ProcessResult { is_main_chain: true, is_orphan: false })
        }
        fn check_connect_block_template(&self, _block: &Block) -> Result<(), glyphchain_common::chain::ChainError> {
            Ok(())
        }
        fn is_deployment_active(&self, _id: u32) -> bool {
            false
        }
        fn threshold_state(&self, _id: u32) -> glyphchain_common::chain::ThresholdState {
            glyphchain_common::chain::ThresholdState::Defined
        }
        fn fetch_utxo_entry(&self, _outpoint: &OutPoint) -> Option<glyphchain_common::chain::UtxoEntry> {
            None
        }
        fn calc_sequence_lock(&self, _tx: &Transaction) -> (Height, i64) {
            (0, -1)
        }
        fn subscribe(&self, _callback: Box<dyn Fn(glyphchain_common::chain::ChainNotification) + Send + Sync>) {}
    }

    #[derive(Default)]
    struct RecordingSink {
        received: std::sync::Mutex<Vec<Txid>>,
    }

    impl ProgressSink for RecordingSink {
        fn progress(&self, _scanned_through: Height, _target: Height) -> Result<(), ClientQuit> {
            Ok(())
        }
        fn redeeming(&self, _txid: Txid) -> Result<(), ClientQuit> {
            Ok(())
        }
        fn received(&self, txid: Txid) -> Result<(), ClientQuit> {
            self.received.lock().unwrap().push(txid);
            Ok(())
        }
        fn finished(&self, _last_height: Height) {}
    }

    #[test]
    fn run_stops_at_an_explicit_end_height_below_the_tip() {
        let chain = Arc::new(FakeRescanChain::new(10));
        let keys = RescanKeys::new(TxFilter::default(), Default::default());
        let sink = RecordingSink::default();

        let outcome = run(&chain, 1, Some(4), keys, &sink);
        assert_eq!(outcome, RescanOutcome::Finished { last_height: 4 });
    }

    struct QuitAfterFirstMatch;

    impl ProgressSink for QuitAfterFirstMatch {
        fn progress(&self, _scanned_through: Height, _target: Height) -> Result<(), ClientQuit> {
            Ok(())
        }
        fn redeeming(&self, _txid: Txid) -> Result<(), ClientQuit> {
            Ok(())
        }
        fn received(&self, _txid: Txid) -> Result<(), ClientQuit> {
            Err(ClientQuit)
        }
        fn finished(&self, _last_height: Height) {}
    }

    #[test]
    fn a_disconnected_client_aborts_the_scan_instead_of_finishing() {
        let mut chain = FakeRescanChain::new(3);
        let mut filter = TxFilter::default();
        filter.pubkey_hash.insert([4u8; 20]);
        let mut script_bytes = vec![0x76, 0xa9, 0x14];
        script_bytes.extend_from_slice(&[4u8; 20]);
        script_bytes.push(0x88);
        script_bytes.push(0xac);
        let funding = Transaction {
            version: 1,
            input: vec![],
            output: vec![glyphchain_wire::TxOut { value: 1000, script_pubkey: Script(script_bytes) }],
            lock_time: 0,
        };
        chain.blocks[0].txdata.push(funding);
        let chain = Arc::new(chain);

        let keys = RescanKeys::new(filter, Default::default());
        let outcome = run(&chain, 1, None, keys, &QuitAfterFirstMatch);
        assert_eq!(outcome, RescanOutcome::Aborted(AbortReason::ClientQuit));
    }
}
