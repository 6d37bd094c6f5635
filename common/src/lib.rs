//! Common types and trait contracts shared by the P2P, RPC and node crates:
//! block-tree domain types, the external engine contracts (§6), address
//! manager interface (C4), ban scoring, and adjusted network time.
pub mod block;
pub mod chain;
pub mod db;
pub mod generator;
pub mod mempool;
pub mod payload;
pub mod peer;
pub mod syncmgr;
pub mod time;

pub use block::{BlockReader, BlockTree, Height};
pub use chain::Chain;
pub use db::{AddrIndex, CfIndex, TxIndex, DB};
pub use generator::{CPUMiner, Generator};
pub use mempool::TxMemPool;
pub use payload::RelayPayload;
pub use peer::{BanEntry, BanScore, Domain, Socks5Proxy, Whitelist};
pub use syncmgr::SyncMgr;
pub use time::{AdjustedClock, Clock, LocalTime, SystemClock};
