//! Protocol engine error taxonomy
//!
//! Every failure of a handshake, verification or authorization maps to
//! exactly one variant. Each variant carries one OAuth problem code for the
//! wire and one HTTP status.

use std::net::IpAddr;

use oauth1::TokenKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("OAuth version {0} not supported")]
    UnsupportedVersion(String),

    #[error("invalid consumer")]
    UnknownConsumer,

    #[error("consumer is owner-only and cannot be used through this flow")]
    OwnerOnlyConsumer,

    #[error("consumer has no secret or public key to verify signatures")]
    ConsumerHasNoKeyMaterial,

    #[error("request from {0} is not allowed for this consumer")]
    SourceIpNotAllowed(IpAddr),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    #[error("invalid {0} token")]
    TokenNotFound(TokenKind),

    #[error("token is corrupt")]
    CorruptToken,

    #[error("verification code mismatch")]
    VerifierMismatch,

    #[error("account is locked")]
    AccountLocked,

    #[error("account is blocked")]
    AccountBlocked,

    #[error("account may not use this consumer; contact its owner at {owner_contact}")]
    IneligibleConsumerUse { owner_contact: String },

    #[error("invalid request token")]
    InvalidRequestToken,

    #[error("could not resolve the central account authorizing {consumer_name}")]
    IdentityResolutionFailed { consumer_name: String },

    #[error("no existing authorization to update")]
    UpdateWithoutExistingAcceptance,

    #[error("signature method {0} not supported")]
    UnsupportedSignatureMethod(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("timestamp {timestamp} outside the accepted window (server time {now})")]
    StaleTimestamp { timestamp: u64, now: u64 },

    #[error("nonce already used")]
    NonceReused,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("signing key rejected: {0}")]
    SigningKey(String),
}

impl Error {
    /// `oauth_problem` code reported to the client.
    pub fn problem(&self) -> &'static str {
        match self {
            Error::UnsupportedVersion(_) => "version_rejected",
            Error::UnknownConsumer => "consumer_key_unknown",
            Error::OwnerOnlyConsumer | Error::ConsumerHasNoKeyMaterial => "consumer_key_rejected",
            Error::IneligibleConsumerUse { .. } => "consumer_key_refused",
            Error::SourceIpNotAllowed(_) | Error::AccountLocked | Error::AccountBlocked => {
                "permission_denied"
            }
            Error::IdentityResolutionFailed { .. } => "permission_unknown",
            Error::InvalidSignature => "signature_invalid",
            Error::UnsupportedSignatureMethod(_) => "signature_method_rejected",
            Error::InvalidCallback(_)
            | Error::MalformedRequest(_)
            | Error::UpdateWithoutExistingAcceptance => "parameter_rejected",
            Error::MissingParameter(_) => "parameter_absent",
            Error::TokenNotFound(_) | Error::InvalidRequestToken => "token_rejected",
            Error::CorruptToken => "token_revoked",
            Error::VerifierMismatch => "verifier_invalid",
            Error::StaleTimestamp { .. } => "timestamp_refused",
            Error::NonceReused => "nonce_used",
            Error::StoreUnavailable(_) => "temporarily_unavailable",
            Error::SigningKey(_) => "internal_error",
        }
    }

    /// HTTP status for the error response.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::UnsupportedVersion(_)
            | Error::UnsupportedSignatureMethod(_)
            | Error::MissingParameter(_)
            | Error::MalformedRequest(_)
            | Error::InvalidCallback(_)
            | Error::InvalidRequestToken
            | Error::UpdateWithoutExistingAcceptance => 400,
            Error::UnknownConsumer
            | Error::InvalidSignature
            | Error::TokenNotFound(_)
            | Error::VerifierMismatch
            | Error::StaleTimestamp { .. }
            | Error::NonceReused => 401,
            Error::OwnerOnlyConsumer
            | Error::ConsumerHasNoKeyMaterial
            | Error::SourceIpNotAllowed(_)
            | Error::AccountLocked
            | Error::AccountBlocked
            | Error::IneligibleConsumerUse { .. }
            | Error::IdentityResolutionFailed { .. } => 403,
            Error::CorruptToken | Error::SigningKey(_) => 500,
            Error::StoreUnavailable(_) => 503,
        }
    }
}

impl From<oauth1::Error> for Error {
    fn from(e: oauth1::Error) -> Self {
        match e {
            oauth1::Error::UnsupportedVersion(v) => Error::UnsupportedVersion(v),
            oauth1::Error::UnknownConsumer => Error::UnknownConsumer,
            oauth1::Error::MissingParameter(p) => Error::MissingParameter(p),
            oauth1::Error::UnsupportedSignatureMethod(m) => Error::UnsupportedSignatureMethod(m),
            oauth1::Error::InvalidSignature => Error::InvalidSignature,
            oauth1::Error::StaleTimestamp { timestamp, now } => {
                Error::StaleTimestamp { timestamp, now }
            }
            oauth1::Error::NonceReused => Error::NonceReused,
            oauth1::Error::TokenNotFound { kind } => Error::TokenNotFound(kind),
            oauth1::Error::CorruptToken => Error::CorruptToken,
            oauth1::Error::VerifierMismatch => Error::VerifierMismatch,
            oauth1::Error::MalformedRequest(m) => Error::MalformedRequest(m),
            oauth1::Error::SigningKey(m) => Error::SigningKey(m),
            oauth1::Error::Store(m) => Error::StoreUnavailable(m),
        }
    }
}

impl From<credential_store::Error> for Error {
    fn from(e: credential_store::Error) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_keep_their_kind() {
        let err: Error = oauth1::Error::TokenNotFound {
            kind: TokenKind::Request,
        }
        .into();
        assert!(matches!(err, Error::TokenNotFound(TokenKind::Request)));
        assert_eq!(err.problem(), "token_rejected");
        assert_eq!(err.status_code(), 401);

        let err: Error = oauth1::Error::Store("disk full".into()).into();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn store_errors_are_never_protocol_rejections() {
        let err: Error = credential_store::Error::Conflict("token changed".into()).into();
        assert!(matches!(err, Error::StoreUnavailable(ref m) if m.contains("token changed")));
    }

    #[test]
    fn ineligible_use_reports_owner_contact() {
        let err = Error::IneligibleConsumerUse {
            owner_contact: "/wiki/User_talk:Owner".into(),
        };
        assert!(err.to_string().contains("/wiki/User_talk:Owner"));
        assert_eq!(err.status_code(), 403);
    }
}
