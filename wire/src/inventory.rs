use std::io::{Read, Write};

use crate::encode::{Decodable, Encodable};
use crate::error::Result;
use crate::hash::BlockHash;

/// Upper bound on the number of inventory vectors in a single `inv`,
/// `getdata` or `notfound` message, per spec §6/§4.2.
pub const MAX_INV_PER_MSG: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CompactBlock,
    WitnessTx,
    WitnessBlock,
    FilteredWitnessBlock,
}

impl InvType {
    fn to_u32(self) -> u32 {
        match self {
            InvType::Error => 0,
            InvType::Tx => 1,
            InvType::Block => 2,
            InvType::FilteredBlock => 3,
            InvType::CompactBlock => 4,
            InvType::WitnessTx => 0x4000_0001,
            InvType::WitnessBlock => 0x4000_0002,
            InvType::FilteredWitnessBlock => 0x4000_0003,
        }
    }

    fn from_u32(v: u32) -> InvType {
        match v {
            1 => InvType::Tx,
            2 => InvType::Block,
            3 => InvType::FilteredBlock,
            4 => InvType::CompactBlock,
            0x4000_0001 => InvType::WitnessTx,
            0x4000_0002 => InvType::WitnessBlock,
            0x4000_0003 => InvType::FilteredWitnessBlock,
            _ => InvType::Error,
        }
    }

    pub fn is_witness(self) -> bool {
        matches!(self, InvType::WitnessTx | InvType::WitnessBlock | InvType::FilteredWitnessBlock)
    }
}

/// A `(type, hash)` pair announcing availability of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inventory {
    pub inv_type: InvType,
    pub hash: BlockHash,
}

impl Inventory {
    pub fn block(hash: BlockHash) -> Self {
        Inventory { inv_type: InvType::Block, hash }
    }
    pub fn tx(hash: BlockHash) -> Self {
        Inventory { inv_type: InvType::Tx, hash }
    }
}

impl Encodable for Inventory {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        Ok(self.inv_type.to_u32().consensus_encode(writer)? + self.hash.consensus_encode(writer)?)
    }
}

impl Decodable for Inventory {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        let inv_type = InvType::from_u32(u32::consensus_decode(reader)?);
        let hash = BlockHash::consensus_decode(reader)?;
        Ok(Inventory { inv_type, hash })
    }
}
