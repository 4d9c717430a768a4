//! Generic OAuth 1.0a (RFC 5849) protocol library
//!
//! Provides the pieces every OAuth 1.0a provider or client needs:
//! - Request parameter collection and the signature base string
//! - HMAC-SHA1 and RSA-SHA1 signature methods
//! - Token, verifier and nonce generation
//! - A generic verification state machine over a pluggable [`DataStore`]
//!
//! Provider policy (who may use which consumer, IP restrictions, grants)
//! lives in the crates built on top of this one.

pub mod constants;
pub mod encoding;
pub mod error;
pub mod keys;
pub mod request;
pub mod server;
pub mod signature;
pub mod token;

pub use error::{Error, Result};
pub use request::{OAuthRequest, has_oauth_authorization};
pub use server::{BoxFuture, DataStore, OAuthServer};
pub use signature::{HmacSha1, RsaSha1, SignatureMethod, SignatureMethods, SigningKeys};
pub use token::{ConsumerCredentials, Token, TokenKind};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
