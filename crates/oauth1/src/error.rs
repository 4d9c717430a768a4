//! Error types for generic OAuth 1.0a protocol handling

use crate::token::TokenKind;

/// Errors raised by request parsing, signature checks and data store calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("OAuth version {0} not supported")]
    UnsupportedVersion(String),

    #[error("invalid consumer key")]
    UnknownConsumer,

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("signature method {0} not supported")]
    UnsupportedSignatureMethod(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("expired timestamp {timestamp}, server time is {now}")]
    StaleTimestamp { timestamp: u64, now: u64 },

    #[error("nonce already used")]
    NonceReused,

    #[error("invalid {kind} token")]
    TokenNotFound { kind: TokenKind },

    #[error("token is missing required authorization data")]
    CorruptToken,

    #[error("verification code mismatch")]
    VerifierMismatch,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("signing key rejected: {0}")]
    SigningKey(String),

    #[error("data store error: {0}")]
    Store(String),
}

/// Result alias for OAuth protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
