//! Block-chain domain types shared by the `Chain` trait contract and the
//! node's in-memory stand-in, generalized from the teacher's
//! `nakamoto_common::block::tree` module to this protocol's wire types.
use std::collections::BTreeMap;

use glyphchain_wire::{BlockHash, BlockHeader};
use nonempty::NonEmpty;
use thiserror::Error;

pub type Height = u64;
pub type BlockTime = u32;
pub type Bits = u32;

/// Proof-of-work target, expressed as a 128-bit unsigned integer. Exact
/// consensus-grade precision (256-bit) isn't needed here: rule validation is
/// explicitly out of scope (spec.md §1), so this only has to support the
/// difficulty-retarget *shape* the `Chain` trait contract exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Target(pub u128);

impl Target {
    pub fn from_compact(bits: Bits) -> Target {
        let exponent = (bits >> 24) as u32;
        let mantissa = (bits & 0x007f_ffff) as u128;
        if exponent <= 3 {
            Target(mantissa >> (8 * (3 - exponent)))
        } else {
            Target(mantissa << (8 * (exponent.saturating_sub(3))))
        }
    }

    pub fn to_compact(self) -> Bits {
        let mut mantissa = self.0;
        let mut exponent = 3u32;
        while mantissa > 0x007f_ffff {
            mantissa >>= 8;
            exponent += 1;
        }
        while mantissa != 0 && mantissa < 0x0080_0000 && exponent > 0 {
            mantissa <<= 8;
            exponent -= 1;
        }
        ((exponent << 24) | (mantissa as u32 & 0x007f_ffff)) as Bits
    }
}

/// Accumulated proof-of-work, the sum of `2^256 / (target+1)` over a chain
/// of headers, truncated to 128 bits for the same reason [`Target`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Work(pub u128);

impl std::ops::Add for Work {
    type Output = Work;
    fn add(self, rhs: Work) -> Work {
        Work(self.0.saturating_add(rhs.0))
    }
}

/// A generic block header exposing the work it carries, mirroring the
/// teacher's `Header` trait.
pub trait Header {
    fn work(&self) -> Work;
}

impl Header for BlockHeader {
    fn work(&self) -> Work {
        let target = Target::from_compact(self.bits).0.max(1);
        Work(u128::MAX / target)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid block proof-of-work")]
    InvalidBlockPoW,
    #[error("invalid block difficulty target: {0:?}, expected {1:?}")]
    InvalidBlockTarget(Target, Target),
    #[error("invalid checkpoint block hash {0} at height {1}")]
    InvalidBlockHash(BlockHash, Height),
    #[error("block height {0} is prior to last checkpoint")]
    InvalidBlockHeight(Height),
    #[error("block timestamp {0} is invalid")]
    InvalidBlockTime(BlockTime, std::cmp::Ordering),
    #[error("duplicate block {0}")]
    DuplicateBlock(BlockHash),
    #[error("block missing: {0}")]
    BlockMissing(BlockHash),
    #[error("stored genesis header doesn't match network genesis")]
    GenesisMismatch,
}

/// Outcome of importing one or more headers into the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportResult {
    TipChanged {
        header: BlockHeader,
        hash: BlockHash,
        height: Height,
        reverted: Vec<(Height, BlockHeader)>,
        connected: NonEmpty<(Height, BlockHeader)>,
    },
    TipUnchanged,
}

/// A chain of headers that may or may not connect back to genesis.
#[derive(Debug, Clone)]
pub struct Branch<'a, H: Header>(pub &'a [H]);

impl<'a, H: Header> Branch<'a, H> {
    pub fn work(&self) -> Work {
        self.0.iter().fold(Work::default(), |acc, h| acc + h.work())
    }
}

/// Write half of the block tree contract (§6 `Chain` engine: `process_block`
/// drives this).
pub trait BlockTree: BlockReader {
    fn import_blocks<I: Iterator<Item = BlockHeader>>(&mut self, chain: I) -> Result<ImportResult, Error>;
    fn extend_tip(&mut self, header: BlockHeader) -> Result<ImportResult, Error>;
}

/// Read half of the block tree contract, grounded directly on the teacher's
/// `BlockReader` trait (same method names/shapes, generalized to this
/// protocol's `BlockHeader`/`BlockHash`).
pub trait BlockReader {
    fn get_block(&self, hash: &BlockHash) -> Option<(Height, &BlockHeader)>;
    fn get_block_by_height(&self, height: Height) -> Option<&BlockHeader>;
    fn find_branch(&self, to: &BlockHash) -> Option<(Height, NonEmpty<BlockHeader>)>;

    fn chain<'a>(&'a self) -> Box<dyn Iterator<Item = BlockHeader> + 'a> {
        Box::new(self.iter().map(|(_, h)| h))
    }

    fn chain_work(&self) -> Work;
    fn iter<'a>(&'a self) -> Box<dyn DoubleEndedIterator<Item = (Height, BlockHeader)> + 'a>;

    fn range<'a>(&'a self, range: std::ops::Range<Height>) -> Box<dyn Iterator<Item = (Height, BlockHash)> + 'a> {
        Box::new(
            self.iter()
                .map(|(height, header)| (height, header.block_hash()))
                .skip(range.start as usize)
                .take((range.end - range.start) as usize),
        )
    }

    fn height(&self) -> Height;
    fn tip(&self) -> (BlockHash, BlockHeader);

    fn best_block(&self) -> (Height, &BlockHeader) {
        let height = self.height();
        (height, self.get_block_by_height(height).expect("the best block is always present"))
    }

    fn last_checkpoint(&self) -> Height;
    fn checkpoints(&self) -> BTreeMap<Height, BlockHash>;

    fn genesis(&self) -> &BlockHeader {
        self.get_block_by_height(0).expect("the genesis block is always present")
    }

    fn is_known(&self, hash: &BlockHash) -> bool;
    fn contains(&self, hash: &BlockHash) -> bool;
    fn locate_headers(&self, locators: &[BlockHash], stop_hash: BlockHash, max_headers: usize) -> Vec<BlockHeader>;
    fn locator_hashes(&self, from: Height) -> Vec<BlockHash>;

    /// Median time past over the last 11 blocks, used by the GBT work-state
    /// to bound `min_timestamp` (spec §4.9).
    fn median_time_past(&self, height: Height) -> BlockTime {
        let start = height.saturating_sub(10);
        let mut times: Vec<BlockTime> = (start..=height).filter_map(|h| self.get_block_by_height(h)).map(|h| h.time).collect();
        times.sort_unstable();
        times.get(times.len() / 2).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_compact_roundtrip_is_lossy_but_stable() {
        let bits: Bits = 0x1d00_ffff;
        let target = Target::from_compact(bits);
        assert_eq!(target.to_compact(), bits);
    }

    #[test]
    fn work_accumulates_across_branch() {
        let low_difficulty = Target::from_compact(0x207f_ffff).0.max(1);
        let expected = Work(u128::MAX / low_difficulty) + Work(u128::MAX / low_difficulty);
        let header = BlockHeader {
            version: 1,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: BlockHash::all_zeros(),
            time: 0,
            bits: 0x207f_ffff,
            nonce: 0,
        };
        let branch = Branch(&[header, header]);
        assert_eq!(branch.work(), expected);
    }
}
