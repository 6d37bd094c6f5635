//! Hash newtypes. All block/transaction identity hashes are double-SHA256,
//! as in the upstream protocol; we wrap `bitcoin_hashes` the same way the
//! teacher's `common::network` module does (`sha256d::Hash`).
use std::fmt;
use std::io::{Read, Write};

use bitcoin_hashes::{sha256d, Hash as _};

use crate::encode::{Decodable, Encodable};
use crate::error::Result;

macro_rules! hash_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub sha256d::Hash);

        impl $name {
            pub fn from_slice(data: &[u8]) -> Option<Self> {
                sha256d::Hash::from_slice(data).ok().map(Self)
            }

            pub fn as_byte_array(&self) -> &[u8; 32] {
                self.0.as_byte_array()
            }

            pub fn all_zeros() -> Self {
                Self(sha256d::Hash::all_zeros())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Encodable for $name {
            fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
                writer.write_all(self.0.as_byte_array())?;
                Ok(32)
            }
        }

        impl Decodable for $name {
            fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
                let bytes: [u8; 32] = crate::encode::decode_array(reader)?;
                Ok(Self(sha256d::Hash::from_byte_array(bytes)))
            }
        }
    };
}

hash_newtype!(BlockHash);
hash_newtype!(Txid);
hash_newtype!(Wtxid);
hash_newtype!(FilterHeader);

/// Double-SHA256 of an arbitrary byte string, used for the message checksum
/// and for hashing serialized headers/transactions.
pub fn sha256d(data: &[u8]) -> sha256d::Hash {
    sha256d::Hash::hash(data)
}

/// The 4-byte truncated double-SHA256 checksum carried in every message
/// header.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = sha256d(payload);
    let bytes = hash.as_byte_array();
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}
