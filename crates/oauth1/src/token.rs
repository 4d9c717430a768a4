//! Token and consumer credential types shared by stores and servers

use std::fmt;

use common::Secret;

/// The two token types of the three-legged flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Temporary credential carrying a pending authorization
    Request,
    /// Token credential used to sign API calls
    Access,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Request => "request",
            TokenKind::Access => "access",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request or access token as held by the data store.
///
/// The `secret` is the stored value. Request tokens additionally carry the
/// callback supplied at initiation and, once authorized, a verifier code
/// and the key of the access token they will be exchanged for.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub key: String,
    pub secret: Secret<String>,
    pub callback: Option<String>,
    pub verifier: Option<String>,
    pub access_key: Option<String>,
    /// Store change counter used for compare-and-swap updates
    pub revision: u64,
}

impl Token {
    /// A fresh, unauthorized request token.
    pub fn new_request(key: String, secret: String, callback: String) -> Self {
        Self {
            kind: TokenKind::Request,
            key,
            secret: Secret::new(secret),
            callback: Some(callback),
            verifier: None,
            access_key: None,
            revision: 0,
        }
    }

    /// An access token.
    pub fn new_access(key: String, secret: Secret<String>) -> Self {
        Self {
            kind: TokenKind::Access,
            key,
            secret,
            callback: None,
            verifier: None,
            access_key: None,
            revision: 0,
        }
    }

    /// Attach the verifier code generated at authorization time.
    pub fn add_verifier(&mut self, verifier: String) {
        self.verifier = Some(verifier);
    }

    /// Link the access token this request token will be promoted to.
    pub fn add_access_key(&mut self, access_key: String) {
        self.access_key = Some(access_key);
    }
}

/// Key material a consumer registered for signing requests.
pub trait ConsumerCredentials {
    fn consumer_key(&self) -> &str;

    /// Stored shared secret, if the consumer signs with HMAC.
    fn shared_secret(&self) -> Option<&str>;

    /// PEM public key, if the consumer signs with RSA.
    fn rsa_public_key(&self) -> Option<&str>;
}
