use std::io::{Read, Write};
use std::ops::{BitOr, BitOrAssign};

use crate::encode::{Decodable, Encodable};
use crate::error::Result;

/// Services advertised by a peer in its `version` message, per spec §6:
/// network, bloom, witness, committed-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceFlags(pub u64);

impl ServiceFlags {
    pub const NONE: ServiceFlags = ServiceFlags(0);
    /// Full node, able to serve complete blocks.
    pub const NETWORK: ServiceFlags = ServiceFlags(1 << 0);
    /// BIP37 bloom filters.
    pub const BLOOM: ServiceFlags = ServiceFlags(1 << 2);
    /// Segregated witness aware.
    pub const WITNESS: ServiceFlags = ServiceFlags(1 << 3);
    /// Committed (compact) filter support.
    pub const COMPACT_FILTERS: ServiceFlags = ServiceFlags(1 << 6);

    pub fn has(&self, other: ServiceFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ServiceFlags {
    type Output = ServiceFlags;
    fn bitor(self, rhs: ServiceFlags) -> ServiceFlags {
        ServiceFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ServiceFlags {
    fn bitor_assign(&mut self, rhs: ServiceFlags) {
        self.0 |= rhs.0;
    }
}

impl Encodable for ServiceFlags {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        self.0.consensus_encode(writer)
    }
}

impl Decodable for ServiceFlags {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(ServiceFlags(u64::consensus_decode(reader)?))
    }
}
