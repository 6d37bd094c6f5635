use std::io;

use thiserror::Error;

/// Errors that can occur while decoding or encoding a wire message.
///
/// `UnknownCommand` is deliberately not fatal: callers should log and ignore
/// it so that newer peers using commands we don't recognize yet remain
/// connected (forward compatibility).
#[derive(Error, Debug)]
pub enum Error {
    /// The message magic doesn't match the network we're connected to.
    #[error("invalid magic: {0:#x}")]
    InvalidMagic(u32),

    /// The declared payload length exceeds the per-command maximum.
    #[error("oversized payload: {actual} bytes, maximum is {max} for command {command:?}")]
    OversizedPayload {
        /// Declared payload length.
        actual: u32,
        /// Maximum allowed for this command.
        max: u32,
        /// Command the payload belongs to.
        command: String,
    },

    /// The payload checksum doesn't match the one in the header.
    #[error("checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum from the header.
        expected: u32,
        /// Checksum computed from the payload.
        actual: u32,
    },

    /// The command string isn't one this codec knows how to decode the
    /// payload for. The message should be skipped, not treated as fatal.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// The input ended before a complete message could be read.
    #[error("truncated message")]
    Truncated,

    /// A variable-length field declared a size beyond what its context allows.
    #[error("field {field} out of bounds: {actual} exceeds maximum {max}")]
    FieldOutOfBounds {
        /// Name of the offending field.
        field: &'static str,
        /// Declared/actual size.
        actual: usize,
        /// Maximum permitted size.
        max: usize,
    },

    /// An I/O error occurred while reading or writing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A command string contained non-ASCII or unpadded bytes.
    #[error("malformed command string")]
    MalformedCommand,
}

pub type Result<T> = std::result::Result<T, Error>;
