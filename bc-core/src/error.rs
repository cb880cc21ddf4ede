use crate::types::UserId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures while turning a callback payload into bytes or back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload too large: {len} bytes exceeds {limit}")]
    PayloadTooLarge { len: usize, limit: usize },

    #[error("amount out of range: {0}")]
    AmountOutOfRange(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),
}

/// Failures reported by a ledger backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("user {0} is not registered")]
    NotRegistered(UserId),

    /// Rejected by the ledger itself (insufficient funds, frozen account, ...).
    #[error("{0}")]
    Business(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected ledger response: {0}")]
    ResponseFormat(String),
}
