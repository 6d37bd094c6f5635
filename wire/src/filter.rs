//! Compact (committed) filter messages: BIP157/158-style `getcfilters`,
//! `getcfheaders`, `getcfcheckpt` and their responses.
use std::io::{Read, Write};

use crate::encode::{decode_bytes, decode_vec, encode_bytes, encode_vec, Decodable, Encodable};
use crate::error::{Error, Result};
use crate::hash::{BlockHash, FilterHeader};

/// Filter type byte. Only the basic filter type is defined upstream; this
/// codec rejects anything else per spec §4.2 ("filter-type must be
/// recognized").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Basic,
}

impl FilterType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FilterType::Basic),
            _ => None,
        }
    }
    pub fn to_u8(self) -> u8 {
        match self {
            FilterType::Basic => 0,
        }
    }
}

impl Encodable for FilterType {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        self.to_u8().consensus_encode(writer)
    }
}

impl Decodable for FilterType {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        let byte = u8::consensus_decode(reader)?;
        FilterType::from_u8(byte).ok_or(Error::FieldOutOfBounds { field: "filter_type", actual: byte as usize, max: 0 })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCFilters {
    pub filter_type: FilterType,
    pub start_height: u32,
    pub stop_hash: BlockHash,
}

impl Encodable for GetCFilters {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        Ok(self.filter_type.consensus_encode(writer)?
            + self.start_height.consensus_encode(writer)?
            + self.stop_hash.consensus_encode(writer)?)
    }
}

impl Decodable for GetCFilters {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(GetCFilters {
            filter_type: FilterType::consensus_decode(reader)?,
            start_height: u32::consensus_decode(reader)?,
            stop_hash: BlockHash::consensus_decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CFilter {
    pub filter_type: FilterType,
    pub block_hash: BlockHash,
    pub filter: Vec<u8>,
}

impl Encodable for CFilter {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        Ok(self.filter_type.consensus_encode(writer)?
            + self.block_hash.consensus_encode(writer)?
            + encode_bytes(&self.filter, writer)?)
    }
}

impl Decodable for CFilter {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(CFilter {
            filter_type: FilterType::consensus_decode(reader)?,
            block_hash: BlockHash::consensus_decode(reader)?,
            filter: decode_bytes(reader, "cfilter.filter", 500_000)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCFHeaders {
    pub filter_type: FilterType,
    pub start_height: u32,
    pub stop_hash: BlockHash,
}

impl Encodable for GetCFHeaders {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        Ok(self.filter_type.consensus_encode(writer)?
            + self.start_height.consensus_encode(writer)?
            + self.stop_hash.consensus_encode(writer)?)
    }
}

impl Decodable for GetCFHeaders {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(GetCFHeaders {
            filter_type: FilterType::consensus_decode(reader)?,
            start_height: u32::consensus_decode(reader)?,
            stop_hash: BlockHash::consensus_decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CFHeaders {
    pub filter_type: FilterType,
    pub stop_hash: BlockHash,
    pub previous_filter_header: FilterHeader,
    pub filter_hashes: Vec<FilterHeader>,
}

impl Encodable for CFHeaders {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut n = self.filter_type.consensus_encode(writer)?;
        n += self.stop_hash.consensus_encode(writer)?;
        n += self.previous_filter_header.consensus_encode(writer)?;
        n += encode_vec(&self.filter_hashes, writer)?;
        Ok(n)
    }
}

impl Decodable for CFHeaders {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(CFHeaders {
            filter_type: FilterType::consensus_decode(reader)?,
            stop_hash: BlockHash::consensus_decode(reader)?,
            previous_filter_header: FilterHeader::consensus_decode(reader)?,
            filter_hashes: decode_vec(reader, "cfheaders.filter_hashes")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCFCheckpt {
    pub filter_type: FilterType,
    pub stop_hash: BlockHash,
}

impl Encodable for GetCFCheckpt {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        Ok(self.filter_type.consensus_encode(writer)? + self.stop_hash.consensus_encode(writer)?)
    }
}

impl Decodable for GetCFCheckpt {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(GetCFCheckpt {
            filter_type: FilterType::consensus_decode(reader)?,
            stop_hash: BlockHash::consensus_decode(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CFCheckpt {
    pub filter_type: FilterType,
    pub stop_hash: BlockHash,
    pub filter_headers: Vec<FilterHeader>,
}

impl Encodable for CFCheckpt {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut n = self.filter_type.consensus_encode(writer)?;
        n += self.stop_hash.consensus_encode(writer)?;
        n += encode_vec(&self.filter_headers, writer)?;
        Ok(n)
    }
}

impl Decodable for CFCheckpt {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(CFCheckpt {
            filter_type: FilterType::consensus_decode(reader)?,
            stop_hash: BlockHash::consensus_decode(reader)?,
            filter_headers: decode_vec(reader, "cfcheckpt.filter_headers")?,
        })
    }
}
