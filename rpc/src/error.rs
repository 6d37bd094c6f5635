//! The RPC error taxonomy (spec §7), expressed as a stable wire code rather
//! than the teacher's plain `DisconnectReason`-style string enum, since this
//! one crosses the JSON wire and clients match on the numeric code.
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RpcErrorCode {
    InvalidHex = -8,
    BlockNotFound = -5,
    TxNotFound = -5,
    InvalidIndex = -1,
    WrongNetwork = -5,
    ParseError = -32700,
    Unauthorized = -1,
    OutOfRange = -8,
    Internal = -1,
    RuleViolation = -25,
    Unimplemented = -32601,
    WalletRequired = -32601,
    ClientQuit = -32000,
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("invalid hex argument: {0}")]
    InvalidHex(String),
    #[error("block not found")]
    BlockNotFound,
    #[error("transaction not found")]
    TxNotFound,
    #[error("index out of range")]
    InvalidIndex,
    #[error("address belongs to a different network")]
    WrongNetwork,
    #[error("parse error: {0}")]
    Parse(String),
    #[error("method not authorized for this user")]
    Unauthorized,
    #[error("height out of range")]
    OutOfRange,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("rule violation: {0}")]
    RuleViolation(String),
    #[error("method is not implemented")]
    Unimplemented,
    #[error("wallet RPC is not supported by this node")]
    WalletRequired,
    #[error("client quit")]
    ClientQuit,
}

impl RpcError {
    pub fn code(&self) -> RpcErrorCode {
        match self {
            RpcError::InvalidHex(_) => RpcErrorCode::InvalidHex,
            RpcError::BlockNotFound => RpcErrorCode::BlockNotFound,
            RpcError::TxNotFound => RpcErrorCode::TxNotFound,
            RpcError::InvalidIndex => RpcErrorCode::InvalidIndex,
            RpcError::WrongNetwork => RpcErrorCode::WrongNetwork,
            RpcError::Parse(_) => RpcErrorCode::ParseError,
            RpcError::Unauthorized => RpcErrorCode::Unauthorized,
            RpcError::OutOfRange => RpcErrorCode::OutOfRange,
            RpcError::Internal(_) => RpcErrorCode::Internal,
            RpcError::RuleViolation(_) => RpcErrorCode::RuleViolation,
            RpcError::Unimplemented => RpcErrorCode::Unimplemented,
            RpcError::WalletRequired => RpcErrorCode::WalletRequired,
            RpcError::ClientQuit => RpcErrorCode::ClientQuit,
        }
    }

    /// Engine failures are logged at error level; everything else is a
    /// user-facing error that shouldn't pollute the log (spec §7).
    pub fn is_engine_failure(&self) -> bool {
        matches!(self, RpcError::Internal(_))
    }
}

#[derive(Debug, Serialize)]
pub struct RpcErrorBody {
    pub code: i32,
    pub message: String,
}

impl From<&RpcError> for RpcErrorBody {
    fn from(err: &RpcError) -> Self {
        RpcErrorBody { code: err.code() as i32, message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failures_are_flagged_for_logging() {
        assert!(RpcError::Internal("boom".into()).is_engine_failure());
        assert!(!RpcError::InvalidHex("zz".into()).is_engine_failure());
    }

    #[test]
    fn out_of_range_is_distinct_from_internal() {
        assert_ne!(RpcError::OutOfRange.code() as i32, 0);
        assert_eq!(RpcError::BlockNotFound.code() as i32, RpcError::TxNotFound.code() as i32);
    }
}
