//! A tagged variant for relayed inventory payloads, replacing the source's
//! `interface{}`-typed association (spec §9: "Random-tag types... Replace
//! with a tagged variant enumerating the legal payload shapes").
use glyphchain_wire::{BlockHeader, Transaction};

#[derive(Debug, Clone)]
pub enum RelayPayload {
    Transaction(Transaction),
    BlockHeader(BlockHeader),
    /// A pre-serialized filter notification payload (cfilter/cfheaders),
    /// kept opaque since this crate doesn't interpret filter contents.
    FilterNotification(Vec<u8>),
}
