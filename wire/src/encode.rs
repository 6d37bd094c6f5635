//! Consensus-style encoding primitives: a minimal `Encodable`/`Decodable`
//! pair modeled on the scheme the teacher's `bitcoincash::consensus::encode`
//! module exposes, trimmed to what the wire codec needs.
use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Maximum size of a single vector field we'll ever allocate for while
/// decoding, regardless of what a (possibly hostile) peer claims the count
/// is. Bounds every variable-length field per spec C1.
pub const MAX_VEC_ELEMS: u64 = 4_000_000;

pub trait Encodable {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize>;
}

pub trait Decodable: Sized {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self>;
}

pub fn serialize<T: Encodable>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.consensus_encode(&mut buf).expect("writing to a Vec never fails");
    buf
}

pub fn deserialize<T: Decodable>(bytes: &[u8]) -> Result<T> {
    let mut cursor = bytes;
    let value = T::consensus_decode(&mut cursor)?;
    Ok(value)
}

macro_rules! impl_int {
    ($ty:ty) => {
        impl Encodable for $ty {
            fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
                let bytes = self.to_le_bytes();
                writer.write_all(&bytes)?;
                Ok(bytes.len())
            }
        }
        impl Decodable for $ty {
            fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                reader.read_exact(&mut bytes).map_err(|_| Error::Truncated)?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        }
    };
}

impl_int!(u8);
impl_int!(u16);
impl_int!(u32);
impl_int!(u64);
impl_int!(i32);
impl_int!(i64);

/// Bitcoin-style variable-length integer ("CompactSize").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt(pub u64);

impl Encodable for VarInt {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        match self.0 {
            0..=0xfc => {
                (self.0 as u8).consensus_encode(writer)?;
                Ok(1)
            }
            0xfd..=0xffff => {
                writer.write_all(&[0xfd])?;
                (self.0 as u16).consensus_encode(writer)?;
                Ok(3)
            }
            0x10000..=0xffff_ffff => {
                writer.write_all(&[0xfe])?;
                (self.0 as u32).consensus_encode(writer)?;
                Ok(5)
            }
            _ => {
                writer.write_all(&[0xff])?;
                self.0.consensus_encode(writer)?;
                Ok(9)
            }
        }
    }
}

impl Decodable for VarInt {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        let n = u8::consensus_decode(reader)?;
        let value = match n {
            0xff => u64::consensus_decode(reader)?,
            0xfe => u32::consensus_decode(reader)? as u64,
            0xfd => u16::consensus_decode(reader)? as u64,
            _ => n as u64,
        };
        Ok(VarInt(value))
    }
}

/// Length-prefixed byte string.
pub fn encode_bytes<W: Write>(bytes: &[u8], writer: &mut W) -> io::Result<usize> {
    let mut n = VarInt(bytes.len() as u64).consensus_encode(writer)?;
    writer.write_all(bytes)?;
    n += bytes.len();
    Ok(n)
}

pub fn decode_bytes<R: Read>(reader: &mut R, field: &'static str, max: u64) -> Result<Vec<u8>> {
    let len = VarInt::consensus_decode(reader)?.0;
    if len > max {
        return Err(Error::FieldOutOfBounds { field, actual: len as usize, max: max as usize });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).map_err(|_| Error::Truncated)?;
    Ok(buf)
}

/// Length-prefixed vector of decodable elements, bounded by `MAX_VEC_ELEMS`.
pub fn encode_vec<W: Write, T: Encodable>(items: &[T], writer: &mut W) -> io::Result<usize> {
    let mut n = VarInt(items.len() as u64).consensus_encode(writer)?;
    for item in items {
        n += item.consensus_encode(writer)?;
    }
    Ok(n)
}

pub fn decode_vec<R: Read, T: Decodable>(reader: &mut R, field: &'static str) -> Result<Vec<T>> {
    let len = VarInt::consensus_decode(reader)?.0;
    if len > MAX_VEC_ELEMS {
        return Err(Error::FieldOutOfBounds { field, actual: len as usize, max: MAX_VEC_ELEMS as usize });
    }
    let mut items = Vec::with_capacity(len.min(1024) as usize);
    for _ in 0..len {
        items.push(T::consensus_decode(reader)?);
    }
    Ok(items)
}

/// Fixed-size byte array, e.g. a 32-byte hash.
pub fn encode_array<W: Write, const N: usize>(arr: &[u8; N], writer: &mut W) -> io::Result<usize> {
    writer.write_all(arr)?;
    Ok(N)
}

pub fn decode_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|_| Error::Truncated)?;
    Ok(buf)
}
