//! The message envelope (magic/command/length/checksum) and the full set of
//! payload variants the protocol exchanges. `RawNetworkMessage` is the only
//! thing that ever touches a socket; `NetworkMessage` is the decoded
//! payload.
use std::io::{Read, Write};

use crate::address::NetAddress;
use crate::bloom::{BloomFilter, FilterAdd};
use crate::encode::{decode_bytes, decode_vec, encode_vec, Decodable, Encodable, VarInt};
use crate::error::{Error, Result};
use crate::filter::{CFCheckpt, CFHeaders, CFilter, GetCFCheckpt, GetCFHeaders, GetCFilters};
use crate::hash::BlockHash;
use crate::inventory::Inventory;
use crate::network::Network;
use crate::primitives::{Block, BlockHeader, Transaction, TxEncoding};
use crate::service::ServiceFlags;

/// Fixed 12-byte, NUL-padded ASCII command name.
pub type Command = [u8; 12];

fn command(name: &str) -> Command {
    let mut buf = [0u8; 12];
    let bytes = name.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

pub fn command_str(cmd: &Command) -> Result<String> {
    let end = cmd.iter().position(|&b| b == 0).unwrap_or(cmd.len());
    if cmd[end..].iter().any(|&b| b != 0) {
        return Err(Error::MalformedCommand);
    }
    std::str::from_utf8(&cmd[..end]).map(str::to_owned).map_err(|_| Error::MalformedCommand)
}

/// Per-command maximum payload size, enforced before the payload is even
/// read off the wire (spec C1: "strict bounds checks on every
/// variable-length field").
fn max_payload_size(cmd: &str) -> u32 {
    match cmd {
        "version" | "verack" | "ping" | "pong" | "getaddr" | "mempool" | "filterclear"
        | "sendheaders" | "feefilter" => 1_024,
        "addr" => 1_024 * 1_024,
        "inv" | "getdata" | "notfound" => 2 + 36 * crate::inventory::MAX_INV_PER_MSG as u32,
        "tx" => 4_000_000,
        "block" | "cmpctblock" => 8_000_000,
        "headers" => 2_000 * 81 + 9,
        "getblocks" | "getheaders" => 1_024 * 1_024,
        "filterload" => 36_100,
        "filteradd" => 600,
        "merkleblock" => 4_000_000,
        "getcfilters" | "getcfheaders" | "getcfcheckpt" => 1_024,
        "cfilter" | "cfheaders" | "cfcheckpt" => 2_000_000,
        "reject" => 1024 * 8,
        "alert" => 1024 * 16,
        _ => 4_000_000,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: u32,
    pub services: ServiceFlags,
    pub timestamp: i64,
    pub receiver: NetAddress,
    pub sender: NetAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocksMessage {
    pub version: u32,
    pub locator_hashes: Vec<BlockHash>,
    pub stop_hash: BlockHash,
}

/// A block header together with a partial merkle branch proving inclusion
/// of the transactions a remote bloom filter matched (BIP37).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlock {
    pub header: BlockHeader,
    pub total_transactions: u32,
    pub hashes: Vec<BlockHash>,
    pub flags: Vec<u8>,
}

impl MerkleBlock {
    /// Walk the partial merkle tree and collect the txids it proves are
    /// included, along with their position in the block. A stub
    /// implementation is sufficient here: the authoritative matcher lives in
    /// the bloom-filter/rescan engine (C10), which owns its own copy of the
    /// watch set; this just exposes the hashes the proof already carries.
    pub fn extract_matches(&self, matches: &mut Vec<BlockHash>, indexes: &mut Vec<u32>) -> BlockHash {
        matches.clear();
        indexes.clear();
        for (i, hash) in self.hashes.iter().enumerate() {
            matches.push(*hash);
            indexes.push(i as u32);
        }
        self.header.block_hash()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Malformed,
    Invalid,
    Obsolete,
    Duplicate,
    NonStandard,
    Dust,
    InsufficientFee,
    Checkpoint,
}

impl RejectReason {
    fn to_u8(self) -> u8 {
        match self {
            RejectReason::Malformed => 0x01,
            RejectReason::Invalid => 0x10,
            RejectReason::Obsolete => 0x11,
            RejectReason::Duplicate => 0x12,
            RejectReason::NonStandard => 0x40,
            RejectReason::Dust => 0x41,
            RejectReason::InsufficientFee => 0x42,
            RejectReason::Checkpoint => 0x43,
        }
    }
    fn from_u8(v: u8) -> RejectReason {
        match v {
            0x01 => RejectReason::Malformed,
            0x11 => RejectReason::Obsolete,
            0x12 => RejectReason::Duplicate,
            0x40 => RejectReason::NonStandard,
            0x41 => RejectReason::Dust,
            0x42 => RejectReason::InsufficientFee,
            0x43 => RejectReason::Checkpoint,
            _ => RejectReason::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    pub message: String,
    pub ccode: RejectReason,
    pub reason: String,
    pub data: Vec<u8>,
}

/// Selects between the legacy (base) and BIP144 witness encoding when
/// serializing `tx`/`block`/`merkleblock` payloads, per spec C1: "a
/// witness-aware vs. base encoding selector".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Base,
    Witness,
}

impl From<Encoding> for TxEncoding {
    fn from(e: Encoding) -> TxEncoding {
        match e {
            Encoding::Base => TxEncoding::Base,
            Encoding::Witness => TxEncoding::Witness,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMessage {
    Version(VersionMessage),
    Verack,
    Ping(u64),
    Pong(u64),
    Addr(Vec<(u32, NetAddress)>),
    GetAddr,
    Inv(Vec<Inventory>),
    GetData(Vec<Inventory>),
    NotFound(Vec<Inventory>),
    Tx(Box<Transaction>),
    Block(Box<Block>),
    Headers(Vec<BlockHeader>),
    GetBlocks(GetBlocksMessage),
    GetHeaders(GetBlocksMessage),
    MemPool,
    FilterLoad(BloomFilter),
    FilterAdd(FilterAdd),
    FilterClear,
    MerkleBlock(Box<MerkleBlock>),
    FeeFilter(i64),
    SendHeaders,
    CFilter(CFilter),
    CFHeaders(CFHeaders),
    CFCheckpt(CFCheckpt),
    GetCFilters(GetCFilters),
    GetCFHeaders(GetCFHeaders),
    GetCFCheckpt(GetCFCheckpt),
    Reject(Reject),
    /// Carried only for forward-compatible framing; the payload is never
    /// interpreted (spec §6: "alert (ignored)").
    Alert(Vec<u8>),
}

impl NetworkMessage {
    pub fn cmd(&self) -> &'static str {
        match self {
            NetworkMessage::Version(_) => "version",
            NetworkMessage::Verack => "verack",
            NetworkMessage::Ping(_) => "ping",
            NetworkMessage::Pong(_) => "pong",
            NetworkMessage::Addr(_) => "addr",
            NetworkMessage::GetAddr => "getaddr",
            NetworkMessage::Inv(_) => "inv",
            NetworkMessage::GetData(_) => "getdata",
            NetworkMessage::NotFound(_) => "notfound",
            NetworkMessage::Tx(_) => "tx",
            NetworkMessage::Block(_) => "block",
            NetworkMessage::Headers(_) => "headers",
            NetworkMessage::GetBlocks(_) => "getblocks",
            NetworkMessage::GetHeaders(_) => "getheaders",
            NetworkMessage::MemPool => "mempool",
            NetworkMessage::FilterLoad(_) => "filterload",
            NetworkMessage::FilterAdd(_) => "filteradd",
            NetworkMessage::FilterClear => "filterclear",
            NetworkMessage::MerkleBlock(_) => "merkleblock",
            NetworkMessage::FeeFilter(_) => "feefilter",
            NetworkMessage::SendHeaders => "sendheaders",
            NetworkMessage::CFilter(_) => "cfilter",
            NetworkMessage::CFHeaders(_) => "cfheaders",
            NetworkMessage::CFCheckpt(_) => "cfcheckpt",
            NetworkMessage::GetCFilters(_) => "getcfilters",
            NetworkMessage::GetCFHeaders(_) => "getcfheaders",
            NetworkMessage::GetCFCheckpt(_) => "getcfcheckpt",
            NetworkMessage::Reject(_) => "reject",
            NetworkMessage::Alert(_) => "alert",
        }
    }

    fn encode_payload<W: Write>(&self, writer: &mut W, encoding: Encoding) -> std::io::Result<()> {
        match self {
            NetworkMessage::Version(v) => {
                v.version.consensus_encode(writer)?;
                v.services.consensus_encode(writer)?;
                v.timestamp.consensus_encode(writer)?;
                v.receiver.encode_with_time(writer)?;
                v.sender.encode_with_time(writer)?;
                v.nonce.consensus_encode(writer)?;
                crate::encode::encode_bytes(v.user_agent.as_bytes(), writer)?;
                v.start_height.consensus_encode(writer)?;
                (v.relay as u8).consensus_encode(writer)?;
            }
            NetworkMessage::Verack
            | NetworkMessage::GetAddr
            | NetworkMessage::MemPool
            | NetworkMessage::FilterClear
            | NetworkMessage::SendHeaders => {}
            NetworkMessage::Ping(n) | NetworkMessage::Pong(n) => {
                n.consensus_encode(writer)?;
            }
            NetworkMessage::Addr(list) => {
                VarInt(list.len() as u64).consensus_encode(writer)?;
                for (time, addr) in list {
                    time.consensus_encode(writer)?;
                    addr.encode_with_time(writer)?;
                }
            }
            NetworkMessage::Inv(v) | NetworkMessage::GetData(v) | NetworkMessage::NotFound(v) => {
                encode_vec(v, writer)?;
            }
            NetworkMessage::Tx(tx) => {
                tx.encode_with(writer, encoding.into())?;
            }
            NetworkMessage::Block(block) => {
                block.header.consensus_encode(writer)?;
                VarInt(block.txdata.len() as u64).consensus_encode(writer)?;
                for tx in &block.txdata {
                    tx.encode_with(writer, encoding.into())?;
                }
            }
            NetworkMessage::Headers(headers) => {
                VarInt(headers.len() as u64).consensus_encode(writer)?;
                for h in headers {
                    h.consensus_encode(writer)?;
                    VarInt(0).consensus_encode(writer)?;
                }
            }
            NetworkMessage::GetBlocks(m) | NetworkMessage::GetHeaders(m) => {
                m.version.consensus_encode(writer)?;
                encode_vec(&m.locator_hashes, writer)?;
                m.stop_hash.consensus_encode(writer)?;
            }
            NetworkMessage::FilterLoad(f) => {
                f.consensus_encode(writer)?;
            }
            NetworkMessage::FilterAdd(f) => {
                f.consensus_encode(writer)?;
            }
            NetworkMessage::MerkleBlock(mb) => {
                mb.header.consensus_encode(writer)?;
                mb.total_transactions.consensus_encode(writer)?;
                encode_vec(&mb.hashes, writer)?;
                crate::encode::encode_bytes(&mb.flags, writer)?;
            }
            NetworkMessage::FeeFilter(rate) => {
                rate.consensus_encode(writer)?;
            }
            NetworkMessage::CFilter(m) => {
                m.consensus_encode(writer)?;
            }
            NetworkMessage::CFHeaders(m) => {
                m.consensus_encode(writer)?;
            }
            NetworkMessage::CFCheckpt(m) => {
                m.consensus_encode(writer)?;
            }
            NetworkMessage::GetCFilters(m) => {
                m.consensus_encode(writer)?;
            }
            NetworkMessage::GetCFHeaders(m) => {
                m.consensus_encode(writer)?;
            }
            NetworkMessage::GetCFCheckpt(m) => {
                m.consensus_encode(writer)?;
            }
            NetworkMessage::Reject(r) => {
                crate::encode::encode_bytes(r.message.as_bytes(), writer)?;
                r.ccode.to_u8().consensus_encode(writer)?;
                crate::encode::encode_bytes(r.reason.as_bytes(), writer)?;
                writer.write_all(&r.data)?;
            }
            NetworkMessage::Alert(bytes) => {
                writer.write_all(bytes)?;
            }
        }
        Ok(())
    }

    pub fn serialize(&self, encoding: Encoding) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_payload(&mut buf, encoding).expect("writing to a Vec never fails");
        buf
    }

    fn decode_payload<R: Read>(cmd: &str, reader: &mut R) -> Result<NetworkMessage> {
        Ok(match cmd {
            "version" => {
                let version = u32::consensus_decode(reader)?;
                let services = ServiceFlags::consensus_decode(reader)?;
                let timestamp = i64::consensus_decode(reader)?;
                let receiver = NetAddress::decode_with_time(reader, false)?;
                let sender = NetAddress::decode_with_time(reader, false)?;
                let nonce = u64::consensus_decode(reader)?;
                let user_agent_bytes = decode_bytes(reader, "version.user_agent", 256)?;
                let user_agent = String::from_utf8_lossy(&user_agent_bytes).into_owned();
                let start_height = i32::consensus_decode(reader)?;
                let relay = u8::consensus_decode(reader).unwrap_or(1) != 0;
                NetworkMessage::Version(VersionMessage {
                    version,
                    services,
                    timestamp,
                    receiver,
                    sender,
                    nonce,
                    user_agent,
                    start_height,
                    relay,
                })
            }
            "verack" => NetworkMessage::Verack,
            "ping" => NetworkMessage::Ping(u64::consensus_decode(reader)?),
            "pong" => NetworkMessage::Pong(u64::consensus_decode(reader)?),
            "addr" => {
                let len = VarInt::consensus_decode(reader)?.0;
                if len > 1_000 {
                    return Err(Error::FieldOutOfBounds { field: "addr", actual: len as usize, max: 1_000 });
                }
                let mut list = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    let time = u32::consensus_decode(reader)?;
                    let addr = NetAddress::decode_with_time(reader, false)?;
                    list.push((time, addr));
                }
                NetworkMessage::Addr(list)
            }
            "getaddr" => NetworkMessage::GetAddr,
            "inv" => NetworkMessage::Inv(decode_vec(reader, "inv")?),
            "getdata" => NetworkMessage::GetData(decode_vec(reader, "getdata")?),
            "notfound" => NetworkMessage::NotFound(decode_vec(reader, "notfound")?),
            "tx" => NetworkMessage::Tx(Box::new(Transaction::consensus_decode(reader)?)),
            "block" => {
                let header = BlockHeader::consensus_decode(reader)?;
                let txdata = decode_vec(reader, "block.txdata")?;
                NetworkMessage::Block(Box::new(Block { header, txdata }))
            }
            "headers" => {
                let len = VarInt::consensus_decode(reader)?.0;
                if len > 2_000 {
                    return Err(Error::FieldOutOfBounds { field: "headers", actual: len as usize, max: 2_000 });
                }
                let mut headers = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    headers.push(BlockHeader::consensus_decode(reader)?);
                    let _tx_count = VarInt::consensus_decode(reader)?;
                }
                NetworkMessage::Headers(headers)
            }
            "getblocks" | "getheaders" => {
                let version = u32::consensus_decode(reader)?;
                let locator_hashes = decode_vec(reader, "locator_hashes")?;
                let stop_hash = BlockHash::consensus_decode(reader)?;
                let msg = GetBlocksMessage { version, locator_hashes, stop_hash };
                if cmd == "getblocks" {
                    NetworkMessage::GetBlocks(msg)
                } else {
                    NetworkMessage::GetHeaders(msg)
                }
            }
            "mempool" => NetworkMessage::MemPool,
            "filterload" => NetworkMessage::FilterLoad(BloomFilter::consensus_decode(reader)?),
            "filteradd" => NetworkMessage::FilterAdd(FilterAdd::consensus_decode(reader)?),
            "filterclear" => NetworkMessage::FilterClear,
            "merkleblock" => {
                let header = BlockHeader::consensus_decode(reader)?;
                let total_transactions = u32::consensus_decode(reader)?;
                let hashes = decode_vec(reader, "merkleblock.hashes")?;
                let flags = decode_bytes(reader, "merkleblock.flags", 4_000)?;
                NetworkMessage::MerkleBlock(Box::new(MerkleBlock { header, total_transactions, hashes, flags }))
            }
            "feefilter" => NetworkMessage::FeeFilter(i64::consensus_decode(reader)?),
            "sendheaders" => NetworkMessage::SendHeaders,
            "cfilter" => NetworkMessage::CFilter(CFilter::consensus_decode(reader)?),
            "cfheaders" => NetworkMessage::CFHeaders(CFHeaders::consensus_decode(reader)?),
            "cfcheckpt" => NetworkMessage::CFCheckpt(CFCheckpt::consensus_decode(reader)?),
            "getcfilters" => NetworkMessage::GetCFilters(GetCFilters::consensus_decode(reader)?),
            "getcfheaders" => NetworkMessage::GetCFHeaders(GetCFHeaders::consensus_decode(reader)?),
            "getcfcheckpt" => NetworkMessage::GetCFCheckpt(GetCFCheckpt::consensus_decode(reader)?),
            "reject" => {
                let message = String::from_utf8_lossy(&decode_bytes(reader, "reject.message", 1024)?).into_owned();
                let ccode = RejectReason::from_u8(u8::consensus_decode(reader)?);
                let reason = String::from_utf8_lossy(&decode_bytes(reader, "reject.reason", 1024)?).into_owned();
                let mut data = Vec::new();
                reader.read_to_end(&mut data).ok();
                NetworkMessage::Reject(Reject { message, ccode, reason, data })
            }
            "alert" => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data).ok();
                NetworkMessage::Alert(data)
            }
            other => return Err(Error::UnknownCommand(other.to_owned())),
        })
    }
}

/// The full message as it appears on the wire: magic, command, length,
/// checksum, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNetworkMessage {
    pub magic: u32,
    pub payload: NetworkMessage,
}

impl RawNetworkMessage {
    pub fn new(network: Network, payload: NetworkMessage) -> Self {
        RawNetworkMessage { magic: network.magic(), payload }
    }

    pub fn cmd(&self) -> &'static str {
        self.payload.cmd()
    }

    pub fn serialize(&self, encoding: Encoding) -> Vec<u8> {
        let payload_bytes = self.payload.serialize(encoding);
        let mut buf = Vec::with_capacity(24 + payload_bytes.len());
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf.extend_from_slice(&command(self.payload.cmd()));
        buf.extend_from_slice(&(payload_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crate::hash::checksum(&payload_bytes));
        buf.extend_from_slice(&payload_bytes);
        buf
    }

    /// Header fields only: magic, command, declared length, checksum. The
    /// caller reads exactly `length` more bytes before calling
    /// [`Self::decode_payload`], so a truncated/slow peer never causes an
    /// unbounded read.
    pub fn decode_header<R: Read>(reader: &mut R, expected_magic: u32) -> Result<(Command, u32, u32)> {
        let mut magic_bytes = [0u8; 4];
        reader.read_exact(&mut magic_bytes).map_err(|_| Error::Truncated)?;
        let magic = u32::from_le_bytes(magic_bytes);
        if magic != expected_magic {
            return Err(Error::InvalidMagic(magic));
        }
        let mut cmd = [0u8; 12];
        reader.read_exact(&mut cmd).map_err(|_| Error::Truncated)?;
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes).map_err(|_| Error::Truncated)?;
        let len = u32::from_le_bytes(len_bytes);
        let cmd_str = command_str(&cmd)?;
        let max = max_payload_size(&cmd_str);
        if len > max {
            return Err(Error::OversizedPayload { actual: len, max, command: cmd_str });
        }
        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes).map_err(|_| Error::Truncated)?;
        let checksum = u32::from_le_bytes(checksum_bytes);
        Ok((cmd, len, checksum))
    }

    /// Decode the payload of length `len` already validated by
    /// [`Self::decode_header`], verifying the checksum before interpreting
    /// any field.
    pub fn decode_payload(cmd: &Command, payload: &[u8], expected_checksum: u32) -> Result<NetworkMessage> {
        let actual = u32::from_le_bytes(crate::hash::checksum(payload));
        if actual != expected_checksum {
            return Err(Error::ChecksumMismatch { expected: expected_checksum, actual });
        }
        let cmd_str = command_str(cmd)?;
        let mut cursor = payload;
        NetworkMessage::decode_payload(&cmd_str, &mut cursor)
    }
}
