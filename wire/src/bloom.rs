//! BIP37 bloom filters, grounded on the teacher's `bitcoincash::util::bloom`
//! implementation (murmur3-based rolling hash, same size/hash-count limits).
use std::io::{Cursor, Read, Write};

use crate::encode::{decode_bytes, Decodable, Encodable};
use crate::error::Result;

const LN2_SQUARED: f64 = std::f64::consts::LN_2 * std::f64::consts::LN_2;
const LN2: f64 = std::f64::consts::LN_2;
/// Maximum size in bytes of a bloom filter's backing bit array.
pub const MAX_FILTER_SIZE: u32 = 36_000;
/// Maximum number of hash functions a filter may specify.
pub const MAX_FILTER_HASH_FUNCS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BloomUpdateFlag {
    None = 0,
    All = 1,
    PubkeyOnly = 2,
}

impl BloomUpdateFlag {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => BloomUpdateFlag::All,
            2 => BloomUpdateFlag::PubkeyOnly,
            _ => BloomUpdateFlag::None,
        }
    }
}

/// A BIP37 bloom filter, as loaded by a remote peer via `filterload` and
/// mutated by `filteradd`/`filterclear`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    pub content: Vec<u8>,
    pub hashes: u32,
    pub tweak: u32,
    pub flags: u8,
}

impl BloomFilter {
    /// Size the filter for `elements` items at the given false-positive
    /// rate, exactly as the teacher's `BloomFilter::new` computes it.
    pub fn new(elements: u32, false_positive_rate: f64, tweak: u32, flags: u8) -> BloomFilter {
        let size = -1.0 / LN2_SQUARED * elements as f64 * false_positive_rate.ln();
        let mut filter_size = (size / 8.0).floor();
        let max_bits = (MAX_FILTER_SIZE * 8) as f64;
        if filter_size > max_bits {
            filter_size = max_bits;
        }
        let content = vec![0u8; filter_size.max(1.0) as usize];

        let mut n_hashes = content.len() as f64 * 8.0 / elements.max(1) as f64 * LN2;
        if n_hashes > MAX_FILTER_HASH_FUNCS as f64 {
            n_hashes = MAX_FILTER_HASH_FUNCS as f64;
        }
        if n_hashes < 1.0 {
            n_hashes = 1.0;
        }
        BloomFilter { content, hashes: n_hashes as u32, tweak, flags }
    }

    fn bit_hash(&self, data: &[u8], hash_num: u32) -> usize {
        let seed = hash_num.wrapping_mul(0xFBA4_C795).wrapping_add(self.tweak);
        let mut cursor = Cursor::new(data);
        let h = murmur3::murmur3_32(&mut cursor, seed).unwrap_or(0);
        (h as usize) % (self.content.len() * 8).max(1)
    }

    pub fn insert(&mut self, data: &[u8]) {
        if self.content.is_empty() {
            return;
        }
        for i in 0..self.hashes {
            let bit = self.bit_hash(data, i);
            self.content[bit / 8] |= 1 << (bit % 8);
        }
    }

    pub fn contains(&self, data: &[u8]) -> bool {
        if self.content.is_empty() {
            return false;
        }
        for i in 0..self.hashes {
            let bit = self.bit_hash(data, i);
            if self.content[bit / 8] & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    pub fn update_flag(&self) -> BloomUpdateFlag {
        BloomUpdateFlag::from_u8(self.flags)
    }

    /// Validation applied when a remote peer sends `filterload`: enforce the
    /// same size/hash-count ceilings used when constructing a filter
    /// locally, so a malicious peer can't make us allocate unbounded memory.
    pub fn is_valid(&self) -> bool {
        self.content.len() as u32 <= MAX_FILTER_SIZE && self.hashes <= MAX_FILTER_HASH_FUNCS
    }
}

const MAX_FILTER_LOAD_SIZE: u64 = MAX_FILTER_SIZE as u64;
const MAX_FILTER_ADD_SIZE: u64 = 520;

impl Encodable for BloomFilter {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut n = crate::encode::encode_bytes(&self.content, writer)?;
        n += self.hashes.consensus_encode(writer)?;
        n += self.tweak.consensus_encode(writer)?;
        n += self.flags.consensus_encode(writer)?;
        Ok(n)
    }
}

impl Decodable for BloomFilter {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        let content = decode_bytes(reader, "filterload.data", MAX_FILTER_LOAD_SIZE)?;
        let hashes = u32::consensus_decode(reader)?;
        let tweak = u32::consensus_decode(reader)?;
        let flags = u8::consensus_decode(reader)?;
        Ok(BloomFilter { content, hashes, tweak, flags })
    }
}

/// `filteradd` payload: a single element to insert into the loaded filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterAdd(pub Vec<u8>);

impl Encodable for FilterAdd {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        crate::encode::encode_bytes(&self.0, writer)
    }
}

impl Decodable for FilterAdd {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(FilterAdd(decode_bytes(reader, "filteradd.data", MAX_FILTER_ADD_SIZE)?))
    }
}
