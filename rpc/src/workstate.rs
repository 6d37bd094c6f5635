//! The GBT/getwork work-state (C9): a single mutex-guarded cache touched by
//! both RPC requests and chain-tip notifications (spec §4.9). Grounded on
//! the teacher's single-mutex submanager shape (same "one lock serializes
//! reads and writes" discipline as `p2p::fsm::bfmgr`), generalized from a
//! peer-facing filter cache to a template cache.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel as chan;
use glyphchain_common::block::{BlockTime, Height};
use glyphchain_common::chain::Chain;
use glyphchain_common::generator::{BlockTemplate, Generator, GeneratorError};
use glyphchain_common::mempool::TxMemPool;
use glyphchain_wire::{Block, BlockHash, Transaction, Txid};

use crate::sha256;

/// The closed set of BIP-22 rejection strings a proposal-mode
/// `getblocktemplate` call may return (spec §4.9 "Proposal mode").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("duplicate")]
    Duplicate,
    #[error("bad-blk-length")]
    BadBlkLength,
    #[error("bad-blk-weight")]
    BadBlkWeight,
    #[error("bad-version")]
    BadVersion,
    #[error("bad-time")]
    BadTime,
    #[error("bad-txnmrklroot")]
    BadTxnMrklRoot,
    #[error("high-hash")]
    HighHash,
    #[error("bad-diffbits")]
    BadDiffbits,
    #[error("bad-prevblk")]
    BadPrevblk,
    #[error("bad-txns-{0}")]
    BadTxns(String),
    #[error("bad-cb-{0}")]
    BadCb(String),
}

/// How the coinbase is filled in: a fixed value payable to one address, or a
/// full coinbase transaction picked from a rotating pool (spec §4.9).
#[derive(Debug, Clone)]
pub enum CoinbaseMode {
    Value(String),
    Txn(Vec<String>),
}

pub struct TemplateTx {
    pub data: Vec<u8>,
    pub txid: Txid,
    /// 1-based indices into the returned list of the transactions this one
    /// depends on (spec §4.9 "each transaction's 1-based dependency
    /// indices").
    pub depends: Vec<usize>,
}

pub struct TemplateView {
    pub long_poll_id: String,
    pub prev_hash: BlockHash,
    pub height: Height,
    pub min_timestamp: BlockTime,
    pub bits: u32,
    pub coinbase_value: i64,
    pub transactions: Vec<TemplateTx>,
    pub submit_old: bool,
}

struct Inner {
    template: Option<BlockTemplate>,
    prev_hash: BlockHash,
    last_generated: u64,
    last_tx_update: u64,
    min_timestamp: BlockTime,
    long_poll: HashMap<String, Vec<chan::Sender<()>>>,
    /// Set when the last regeneration was triggered by the mempool alone
    /// (the tip didn't move), so a miner's in-flight work against the
    /// previous template is still valid (spec §4.9 `submitold`).
    submit_old: bool,
}

pub struct WorkState<C, M, G> {
    chain: std::sync::Arc<C>,
    mempool: std::sync::Arc<M>,
    generator: std::sync::Arc<G>,
    mode: CoinbaseMode,
    regenerate_after: Duration,
    max_time_offset: i64,
    inner: Mutex<Inner>,
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn long_poll_id(prev_hash: &BlockHash, last_generated: u64) -> String {
    format!("{prev_hash}-{last_generated}")
}

fn mining_addresses(mode: &CoinbaseMode) -> Vec<String> {
    match mode {
        CoinbaseMode::Value(addr) => vec![addr.clone()],
        CoinbaseMode::Txn(addrs) => addrs.clone(),
    }
}

impl<C: Chain, M: TxMemPool, G: Generator> WorkState<C, M, G> {
    pub fn new(chain: std::sync::Arc<C>, mempool: std::sync::Arc<M>, generator: std::sync::Arc<G>, mode: CoinbaseMode) -> Self {
        Self::with_regenerate_after(chain, mempool, generator, mode, Duration::from_secs(60))
    }

    /// Same as [`Self::new`] with an overridable regeneration cooldown
    /// (spec §8 scenario 2's "Configure `gbt_regenerate=60s`").
    pub fn with_regenerate_after(
        chain: std::sync::Arc<C>,
        mempool: std::sync::Arc<M>,
        generator: std::sync::Arc<G>,
        mode: CoinbaseMode,
        regenerate_after: Duration,
    ) -> Self {
        WorkState {
            chain,
            mempool,
            generator,
            mode,
            regenerate_after,
            max_time_offset: 2 * 60 * 60,
            inner: Mutex::new(Inner {
                template: None,
                prev_hash: BlockHash::all_zeros(),
                last_generated: 0,
                last_tx_update: 0,
                min_timestamp: 0,
                long_poll: HashMap::new(),
                submit_old: false,
            }),
        }
    }

    /// Regenerates the cached template if stale, otherwise just patches the
    /// timestamp (and, in coinbase-txn mode, the payout) in place (spec
    /// §4.9 "Update").
    fn refresh(&self) -> Result<(), GeneratorError> {
        let snapshot = self.chain.best_snapshot();
        let mempool_update = self.mempool.last_updated();
        let now = now_unix();
        let mut inner = self.inner.lock().unwrap();

        let tip_changed = inner.template.is_none() || inner.prev_hash != snapshot.hash;
        let mempool_stale =
            mempool_update != inner.last_tx_update && now.saturating_sub(inner.last_generated) > self.regenerate_after.as_secs();
        let stale = tip_changed || mempool_stale;

        if stale {
            let addrs = mining_addresses(&self.mode);
            let template = self.generator.new_block_template(&addrs)?;
            let old_id = if inner.template.is_some() { Some(long_poll_id(&inner.prev_hash, inner.last_generated)) } else { None };

            inner.submit_old = !tip_changed;
            inner.prev_hash = snapshot.hash;
            inner.last_generated = now;
            inner.last_tx_update = mempool_update;
            inner.min_timestamp = self.chain.best_snapshot().median_time;
            inner.template = Some(template);

            if let Some(id) = old_id {
                if let Some(wakers) = inner.long_poll.remove(&id) {
                    for waker in wakers {
                        drop(waker);
                    }
                }
            }
        } else if let Some(template) = inner.template.as_mut() {
            self.generator.update_block_time(template, now as BlockTime);
            if matches!(self.mode, CoinbaseMode::Txn(_)) && !template.paid_out {
                template.paid_out = true;
            }
        }
        Ok(())
    }

    /// Builds the response view for `getblocktemplate`/`getwork` (spec §4.9
    /// "Serialize template for response").
    pub fn view(&self) -> Result<TemplateView, GeneratorError> {
        self.refresh()?;
        let inner = self.inner.lock().unwrap();
        let template = inner.template.as_ref().expect("refresh populates template");
        let mut transactions = Vec::new();
        for (idx, tx) in template.block.txdata.iter().enumerate().skip(1) {
            let depends = dependency_indices(tx, &template.block.txdata[1..idx]);
            transactions.push(TemplateTx { data: glyphchain_wire::encode::serialize(tx), txid: tx.txid(), depends });
        }
        let coinbase_value = template.block.txdata.first().map(|cb| cb.output.iter().map(|o| o.value).sum()).unwrap_or(0);
        Ok(TemplateView {
            long_poll_id: long_poll_id(&inner.prev_hash, inner.last_generated),
            prev_hash: inner.prev_hash,
            height: template.height,
            min_timestamp: inner.min_timestamp,
            bits: template.block.header.bits,
            coinbase_value,
            transactions,
            submit_old: inner.submit_old,
        })
    }

    /// Registers a long-poll waiter if `id` still matches the current
    /// template; `None` means the caller's copy is already stale and should
    /// re-fetch immediately (spec §4.9 "Long-poll").
    pub fn register_long_poll(&self, id: &str) -> Option<chan::Receiver<()>> {
        let mut inner = self.inner.lock().unwrap();
        let current = long_poll_id(&inner.prev_hash, inner.last_generated);
        if current != id {
            return None;
        }
        let (tx, rx) = chan::bounded(0);
        inner.long_poll.entry(id.to_string()).or_default().push(tx);
        Some(rx)
    }

    /// Proposal-mode `getblocktemplate`: validate a caller-assembled block
    /// against the live chain tip, translating rule failures to BIP-22
    /// rejection strings (spec §4.9 "Proposal mode").
    pub fn propose(&self, block: &Block) -> Result<(), RejectReason> {
        let snapshot = self.chain.best_snapshot();
        if block.header.prev_blockhash != snapshot.hash {
            return Err(RejectReason::BadPrevblk);
        }
        if block.header.time <= snapshot.median_time {
            return Err(RejectReason::BadTime);
        }
        self.chain.check_connect_block_template(block).map_err(|err| RejectReason::BadTxns(err.to_string()))
    }

    /// Builds the legacy `getwork` no-args response: a big-endian data blob
    /// (header padded to two SHA-256 blocks), a `hash1` blob, the midstate
    /// after the header's first 64 bytes, and the expanded target (spec
    /// §4.7 "getwork").
    pub fn getwork_blob(&self) -> Result<GetWorkBlob, GeneratorError> {
        self.refresh()?;
        let inner = self.inner.lock().unwrap();
        let template = inner.template.as_ref().expect("refresh populates template");
        let header_bytes = glyphchain_wire::encode::serialize(&template.block.header);
        let padded = sha256::pad(&header_bytes);
        let first_block: [u8; 64] = padded[0..64].try_into().expect("sha256 padding always yields >=64 bytes");
        let midstate = sha256::compress(sha256::initial_state(), &first_block);

        let hash1_padded = sha256::pad(&[0u8; 32]);
        Ok(GetWorkBlob {
            data: be_u32_words(&padded),
            hash1: be_u32_words(&hash1_padded),
            midstate,
            target: expand_target(template.block.header.bits),
        })
    }

    /// Accepts a hex-encoded `getwork` submission: deserializes the header,
    /// checks proof-of-work against the expanded target, and processes the
    /// block if the submitted previous-block still matches the tip.
    pub fn submit_work(&self, header_words: &[u32]) -> bool {
        let mut bytes = Vec::with_capacity(header_words.len() * 4);
        for word in header_words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        let Ok(header) = glyphchain_wire::encode::deserialize::<glyphchain_wire::BlockHeader>(&bytes) else {
            return false;
        };
        let snapshot = self.chain.best_snapshot();
        if header.prev_blockhash != snapshot.hash {
            return false;
        }
        let target = glyphchain_common::block::Target::from_compact(header.bits);
        let hash = header.block_hash();
        let hash_value = u128::from_be_bytes(hash.as_byte_array()[0..16].try_into().unwrap());
        if hash_value > target.0 {
            return false;
        }
        let inner = self.inner.lock().unwrap();
        let Some(template) = inner.template.as_ref() else { return false };
        let block = Block { header, txdata: template.block.txdata.clone() };
        drop(inner);
        self.chain.process_block(block, glyphchain_common::chain::ProcessFlags::default()).map(|r| r.is_main_chain).unwrap_or(false)
    }
}

fn dependency_indices(tx: &Transaction, earlier: &[Transaction]) -> Vec<usize> {
    let mut depends = Vec::new();
    for input in &tx.input {
        if let Some(pos) = earlier.iter().position(|other| other.txid() == input.previous_output.txid) {
            depends.push(pos + 1);
        }
    }
    depends
}

fn be_u32_words(bytes: &[u8]) -> Vec<u32> {
    bytes.chunks_exact(4).map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn expand_target(bits: u32) -> [u8; 32] {
    let target = glyphchain_common::block::Target::from_compact(bits).0;
    let mut out = [0u8; 32];
    out[0..16].copy_from_slice(&target.to_le_bytes());
    out
}

pub struct GetWorkBlob {
    pub data: Vec<u32>,
    pub hash1: Vec<u32>,
    pub midstate: [u32; 8],
    pub target: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_poll_id_format_matches_spec() {
        let hash = BlockHash::all_zeros();
        assert_eq!(long_poll_id(&hash, 42), format!("{hash}-42"));
    }

    #[test]
    fn expand_target_round_trips_through_compact_form() {
        let expanded = expand_target(0x1d00_ffff);
        let value = u128::from_le_bytes(expanded[0..16].try_into().unwrap());
        assert_eq!(value, glyphchain_common::block::Target::from_compact(0x1d00_ffff).0);
    }
}
