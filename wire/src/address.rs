use std::io::{Read, Write};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use crate::encode::{decode_array, Decodable, Encodable};
use crate::error::Result;
use crate::service::ServiceFlags;

/// A peer address as carried on the wire (`addr`/`version` payloads): a
/// timestamp (absent from the `version` message's embedded copy), the
/// services the peer claims, and an IPv6-mapped address plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
    /// Unix timestamp the address was last seen active. `None` in contexts
    /// (like `version`) where the field isn't present on the wire.
    pub time: Option<u32>,
    pub services: ServiceFlags,
    pub addr: SocketAddr,
}

impl NetAddress {
    fn ip_bytes(&self) -> [u8; 16] {
        match self.addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        }
    }

    pub fn encode_with_time<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut n = 0;
        if let Some(time) = self.time {
            n += time.consensus_encode(writer)?;
        }
        n += self.services.consensus_encode(writer)?;
        writer.write_all(&self.ip_bytes())?;
        n += 16;
        writer.write_all(&self.addr.port().to_be_bytes())?;
        n += 2;
        Ok(n)
    }

    pub fn decode_with_time<R: Read>(reader: &mut R, has_time: bool) -> Result<Self> {
        let time = if has_time { Some(u32::consensus_decode(reader)?) } else { None };
        let services = ServiceFlags::consensus_decode(reader)?;
        let ip_bytes: [u8; 16] = decode_array(reader)?;
        let ip = Ipv6Addr::from(ip_bytes);
        let ip = ip.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(ip));
        let mut port_bytes = [0u8; 2];
        reader.read_exact(&mut port_bytes).map_err(|_| crate::error::Error::Truncated)?;
        let port = u16::from_be_bytes(port_bytes);
        Ok(NetAddress { time, services, addr: SocketAddr::new(ip, port) })
    }

    pub fn new(addr: SocketAddr, services: ServiceFlags) -> Self {
        NetAddress { time: None, services, addr }
    }

    pub fn with_time(mut self, time: u32) -> Self {
        self.time = Some(time);
        self
    }
}
