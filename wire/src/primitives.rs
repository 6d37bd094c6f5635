//! Block and transaction primitives needed to frame wire messages. This is
//! intentionally shallow: scripts are opaque byte strings (no interpreter),
//! since consensus validation is explicitly out of scope (spec.md §1) and is
//! performed by the external `Chain` engine, not by this codec.
use std::io::{Read, Write};

use crate::encode::{
    decode_bytes, decode_vec, encode_bytes, encode_vec, Decodable, Encodable, VarInt,
};
use crate::error::{Error, Result};
use crate::hash::{sha256d, BlockHash, Txid, Wtxid};

/// Maximum size of a single `Script` we'll decode, mirroring the upstream
/// 10,000-byte scriptPubKey/scriptSig soft limit.
pub const MAX_SCRIPT_SIZE: u64 = 10_000;

/// An opaque, unparsed output/input script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Encodable for Script {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        encode_bytes(&self.0, writer)
    }
}

impl Decodable for Script {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Script(decode_bytes(reader, "script", MAX_SCRIPT_SIZE)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl Encodable for OutPoint {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        Ok(self.txid.consensus_encode(writer)? + self.vout.consensus_encode(writer)?)
    }
}

impl Decodable for OutPoint {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(OutPoint { txid: Txid::consensus_decode(reader)?, vout: u32::consensus_decode(reader)? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    /// Witness stack items, empty when the transaction carries no witness
    /// data for this input.
    pub witness: Vec<Vec<u8>>,
}

impl Encodable for TxIn {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut n = self.previous_output.consensus_encode(writer)?;
        n += self.script_sig.consensus_encode(writer)?;
        n += self.sequence.consensus_encode(writer)?;
        Ok(n)
    }
}

impl Decodable for TxIn {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(TxIn {
            previous_output: OutPoint::consensus_decode(reader)?,
            script_sig: Script::consensus_decode(reader)?,
            sequence: u32::consensus_decode(reader)?,
            witness: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Script,
}

impl Encodable for TxOut {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        Ok(self.value.consensus_encode(writer)? + self.script_pubkey.consensus_encode(writer)?)
    }
}

impl Decodable for TxOut {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(TxOut { value: u64::consensus_decode(reader)?, script_pubkey: Script::consensus_decode(reader)? })
    }
}

/// Marker/flag bytes used by the witness encoding (BIP144-style): a
/// `tx_in` count of zero followed by a non-zero flag signals that witness
/// data follows the outputs.
const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEncoding {
    /// The legacy encoding, with no witness data. Used when relaying to
    /// peers that haven't negotiated witness support.
    Base,
    /// BIP144-style encoding: marker, flag, then a witness stack per input
    /// after the outputs.
    Witness,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub input: Vec<TxIn>,
    pub output: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn has_witness(&self) -> bool {
        self.input.iter().any(|i| !i.witness.is_empty())
    }

    /// Transaction id: double-SHA256 of the base (witness-stripped)
    /// serialization, exactly like the upstream protocol's `txid` (as
    /// opposed to `wtxid`, which is computed over the witness encoding).
    pub fn txid(&self) -> Txid {
        let bytes = self.serialize_with(TxEncoding::Base);
        Txid::from_slice(sha256d(&bytes).as_byte_array()).expect("32 bytes")
    }

    pub fn wtxid(&self) -> Wtxid {
        let bytes = self.serialize_with(TxEncoding::Witness);
        Wtxid::from_slice(sha256d(&bytes).as_byte_array()).expect("32 bytes")
    }

    pub fn serialize_with(&self, encoding: TxEncoding) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_with(&mut buf, encoding).expect("writing to a Vec never fails");
        buf
    }

    pub fn encode_with<W: Write>(&self, writer: &mut W, encoding: TxEncoding) -> std::io::Result<usize> {
        let witness = encoding == TxEncoding::Witness && self.has_witness();
        let mut n = self.version.consensus_encode(writer)?;
        if witness {
            writer.write_all(&[SEGWIT_MARKER, SEGWIT_FLAG])?;
            n += 2;
        }
        n += encode_vec(&self.input, writer)?;
        n += encode_vec(&self.output, writer)?;
        if witness {
            for input in &self.input {
                n += VarInt(input.witness.len() as u64).consensus_encode(writer)?;
                for item in &input.witness {
                    n += encode_bytes(item, writer)?;
                }
            }
        }
        n += self.lock_time.consensus_encode(writer)?;
        Ok(n)
    }
}

impl Encodable for Transaction {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        self.encode_with(writer, TxEncoding::Witness)
    }
}

impl Decodable for Transaction {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        let version = i32::consensus_decode(reader)?;
        let first = VarInt::consensus_decode(reader)?;
        let witness = first.0 == 0;
        let mut input;
        if witness {
            let flag = u8::consensus_decode(reader)?;
            if flag != SEGWIT_FLAG {
                return Err(Error::MalformedCommand);
            }
            input = decode_vec::<_, TxIn>(reader, "tx.input")?;
        } else {
            // `first` was actually the input count; re-derive the vector
            // by decoding `first.0` elements directly.
            input = Vec::with_capacity(first.0.min(1024) as usize);
            for _ in 0..first.0 {
                input.push(TxIn::consensus_decode(reader)?);
            }
        }
        let output = decode_vec::<_, TxOut>(reader, "tx.output")?;
        if witness {
            for txin in input.iter_mut() {
                let count = VarInt::consensus_decode(reader)?.0;
                let mut stack = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    stack.push(decode_bytes(reader, "tx.witness_item", MAX_SCRIPT_SIZE)?);
                }
                txin.witness = stack;
            }
        }
        let lock_time = u32::consensus_decode(reader)?;
        Ok(Transaction { version, input, output, lock_time })
    }
}

/// Compact difficulty target representation ("nBits").
pub type Bits = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_blockhash: BlockHash,
    pub merkle_root: BlockHash,
    pub time: u32,
    pub bits: Bits,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn block_hash(&self) -> BlockHash {
        let bytes = crate::encode::serialize(self);
        BlockHash::from_slice(sha256d(&bytes).as_byte_array()).expect("32 bytes")
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut n = self.version.consensus_encode(writer)?;
        n += self.prev_blockhash.consensus_encode(writer)?;
        n += self.merkle_root.consensus_encode(writer)?;
        n += self.time.consensus_encode(writer)?;
        n += self.bits.consensus_encode(writer)?;
        n += self.nonce.consensus_encode(writer)?;
        Ok(n)
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(BlockHeader {
            version: i32::consensus_decode(reader)?,
            prev_blockhash: BlockHash::consensus_decode(reader)?,
            merkle_root: BlockHash::consensus_decode(reader)?,
            time: u32::consensus_decode(reader)?,
            bits: Bits::consensus_decode(reader)?,
            nonce: u32::consensus_decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub txdata: Vec<Transaction>,
}

impl Block {
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }

    /// Serialized size excluding witness data, as reported in `getblock`'s
    /// `strippedsize` field.
    pub fn stripped_size(&self) -> usize {
        let mut size = crate::encode::serialize(&self.header).len();
        size += VarInt(self.txdata.len() as u64).consensus_encode(&mut Vec::new()).unwrap_or(0);
        for tx in &self.txdata {
            size += tx.serialize_with(TxEncoding::Base).len();
        }
        size
    }

    pub fn weight(&self) -> usize {
        let base = self.serialize_with(TxEncoding::Base).len();
        let total = self.serialize_with(TxEncoding::Witness).len();
        base * 3 + total
    }

    pub fn serialize_with(&self, encoding: TxEncoding) -> Vec<u8> {
        let mut buf = Vec::new();
        crate::encode::serialize(&self.header).consensus_encode(&mut buf).ok();
        VarInt(self.txdata.len() as u64).consensus_encode(&mut buf).ok();
        for tx in &self.txdata {
            tx.encode_with(&mut buf, encoding).ok();
        }
        buf
    }
}

impl Encodable for Block {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut n = self.header.consensus_encode(writer)?;
        n += encode_vec(&self.txdata, writer)?;
        Ok(n)
    }
}

impl Decodable for Block {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Block {
            header: BlockHeader::consensus_decode(reader)?,
            txdata: decode_vec::<_, Transaction>(reader, "block.txdata")?,
        })
    }
}

impl Encodable for Vec<u8> {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        encode_bytes(self, writer)
    }
}

impl Encodable for [u8; 32] {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(self)?;
        Ok(32)
    }
}
