//! Binary wire protocol: message envelope, codec primitives and the full
//! set of protocol message types. This crate owns framing only; consensus
//! validation belongs to the external chain engine the higher-level crates
//! talk to.
pub mod address;
pub mod bloom;
pub mod encode;
pub mod error;
pub mod filter;
pub mod hash;
pub mod inventory;
pub mod message;
pub mod network;
pub mod primitives;
pub mod service;

pub use address::NetAddress;
pub use bloom::{BloomFilter, BloomUpdateFlag, FilterAdd};
pub use encode::{deserialize, serialize, Decodable, Encodable, VarInt};
pub use error::{Error, Result};
pub use filter::{CFCheckpt, CFHeaders, CFilter, FilterType, GetCFCheckpt, GetCFHeaders, GetCFilters};
pub use hash::{checksum, sha256d, BlockHash, FilterHeader, Txid, Wtxid};
pub use inventory::{InvType, Inventory, MAX_INV_PER_MSG};
pub use message::{
    command_str, Command, Encoding, GetBlocksMessage, MerkleBlock, NetworkMessage, RawNetworkMessage,
    Reject, RejectReason, VersionMessage,
};
pub use network::Network;
pub use primitives::{Block, BlockHeader, OutPoint, Script, Transaction, TxEncoding, TxIn, TxOut};
pub use service::ServiceFlags;

/// Protocol version this codec speaks. Bumped only when a new message type
/// or field is added to the set this crate understands.
pub const PROTOCOL_VERSION: u32 = 70016;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn sample_version() -> NetworkMessage {
        let addr = NetAddress::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8333),
            ServiceFlags::NETWORK,
        );
        NetworkMessage::Version(VersionMessage {
            version: PROTOCOL_VERSION,
            services: ServiceFlags::NETWORK | ServiceFlags::WITNESS,
            timestamp: 1_700_000_000,
            receiver: addr,
            sender: addr,
            nonce: 0x1234_5678_9abc_def0,
            user_agent: "/glyphchain:0.1.0/".to_owned(),
            start_height: 800_000,
            relay: true,
        })
    }

    fn roundtrip(msg: NetworkMessage) -> NetworkMessage {
        let raw = RawNetworkMessage::new(Network::Regtest, msg);
        let bytes = raw.serialize(Encoding::Witness);

        let mut cursor = &bytes[..];
        let (cmd, len, checksum) = RawNetworkMessage::decode_header(&mut cursor, Network::Regtest.magic()).unwrap();
        let payload = &cursor[..len as usize];
        RawNetworkMessage::decode_payload(&cmd, payload, checksum).unwrap()
    }

    #[test]
    fn version_roundtrips() {
        let msg = sample_version();
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn ping_pong_roundtrip() {
        assert_eq!(roundtrip(NetworkMessage::Ping(42)), NetworkMessage::Ping(42));
        assert_eq!(roundtrip(NetworkMessage::Pong(42)), NetworkMessage::Pong(42));
    }

    #[test]
    fn verack_has_empty_payload() {
        let raw = RawNetworkMessage::new(Network::Mainnet, NetworkMessage::Verack);
        let bytes = raw.serialize(Encoding::Base);
        // magic(4) + command(12) + length(4) + checksum(4), zero-length payload.
        assert_eq!(bytes.len(), 24);
    }

    #[test]
    fn inv_roundtrips() {
        let hash = BlockHash::from_slice(&[7u8; 32]).unwrap();
        let msg = NetworkMessage::Inv(vec![Inventory::block(hash), Inventory::tx(hash)]);
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn transaction_base_and_witness_differ_when_witness_present() {
        let tx = Transaction {
            version: 2,
            input: vec![TxIn {
                previous_output: OutPoint { txid: Txid::all_zeros(), vout: 0 },
                script_sig: Script(vec![]),
                sequence: 0xffff_ffff,
                witness: vec![vec![1, 2, 3]],
            }],
            output: vec![TxOut { value: 5_000_000_000, script_pubkey: Script(vec![0x76, 0xa9]) }],
            lock_time: 0,
        };
        let base = tx.serialize_with(TxEncoding::Base);
        let witness = tx.serialize_with(TxEncoding::Witness);
        assert_ne!(base, witness);
        assert_ne!(tx.txid(), tx.wtxid());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let raw = RawNetworkMessage::new(Network::Mainnet, NetworkMessage::Verack);
        let bytes = raw.serialize(Encoding::Base);
        let mut cursor = &bytes[..];
        let err = RawNetworkMessage::decode_header(&mut cursor, Network::Testnet.magic()).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic(_)));
    }

    #[test]
    fn bloom_filter_contains_inserted_element() {
        let mut filter = BloomFilter::new(10, 0.001, 0, 0);
        filter.insert(b"hello");
        assert!(filter.contains(b"hello"));
        assert!(filter.is_valid());
    }

    #[test]
    fn unknown_command_is_recoverable_not_fatal() {
        let err = message::command_str(&[0u8; 12]).unwrap();
        assert_eq!(err, "");
    }

    #[test]
    fn network_magic_roundtrips_through_from_magic() {
        for net in [Network::Mainnet, Network::Testnet, Network::Regtest, Network::Signet] {
            assert_eq!(Network::from_magic(net.magic()), Some(net));
        }
    }
}
