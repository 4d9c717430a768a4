//! Generic OAuth 1.0a verification state machine
//!
//! `OAuthServer` knows the protocol but nothing about who the consumers are
//! or where tokens live: every lookup goes through a [`DataStore`]. Wrapping
//! servers compose these steps with their own policy checks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::constants::{
    OAUTH_VERSION, PARAM_CONSUMER_KEY, PARAM_NONCE, PARAM_SIGNATURE, PARAM_SIGNATURE_METHOD,
    PARAM_TIMESTAMP, PARAM_TOKEN, PARAM_VERSION,
};
use crate::error::{Error, Result};
use crate::request::OAuthRequest;
use crate::signature::{SignatureMethods, SigningKeys};
use crate::token::{ConsumerCredentials, Token, TokenKind};

/// Boxed future returned by data store methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage backend consulted by the protocol state machine.
///
/// Methods return boxed futures so the trait stays object-safe.
pub trait DataStore: Send + Sync {
    type Consumer: ConsumerCredentials + Send + Sync;

    /// Consumer registered under `consumer_key`, if any.
    fn lookup_consumer<'a>(
        &'a self,
        consumer_key: &'a str,
    ) -> BoxFuture<'a, Result<Option<Self::Consumer>>>;

    /// Token of the given kind issued to `consumer`.
    fn lookup_token<'a>(
        &'a self,
        consumer: &'a Self::Consumer,
        kind: TokenKind,
        token_key: &'a str,
    ) -> BoxFuture<'a, Result<Option<Token>>>;

    /// Record a nonce, returning `true` if it was already used.
    fn lookup_nonce<'a>(
        &'a self,
        consumer: &'a Self::Consumer,
        token_key: Option<&'a str>,
        nonce: &'a str,
        timestamp: u64,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Mint a request token bound to `consumer` and `callback`.
    fn new_request_token<'a>(
        &'a self,
        consumer: &'a Self::Consumer,
        callback: &'a str,
    ) -> BoxFuture<'a, Result<Token>>;

    /// Consume an authorized request token and return its access token.
    ///
    /// Checking `verifier` and consuming the request token must be one
    /// atomic step.
    fn new_access_token<'a>(
        &'a self,
        request_token: &'a Token,
        consumer: &'a Self::Consumer,
        verifier: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Token>>;
}

/// Protocol checks shared by every handshake step.
pub struct OAuthServer<D: DataStore> {
    store: Arc<D>,
    methods: SignatureMethods,
    timestamp_threshold: u64,
}

impl<D: DataStore> OAuthServer<D> {
    /// `timestamp_threshold` is the allowed clock skew in seconds.
    pub fn new(store: Arc<D>, methods: SignatureMethods, timestamp_threshold: u64) -> Self {
        Self {
            store,
            methods,
            timestamp_threshold,
        }
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    pub fn signature_methods(&self) -> &SignatureMethods {
        &self.methods
    }

    /// Protocol version of the request. Absent means 1.0.
    pub fn get_version(&self, request: &OAuthRequest) -> Result<&'static str> {
        match request.get_parameter(PARAM_VERSION) {
            None | Some(OAUTH_VERSION) => Ok(OAUTH_VERSION),
            Some(other) => Err(Error::UnsupportedVersion(other.to_owned())),
        }
    }

    /// Consumer named by `oauth_consumer_key`.
    pub async fn get_consumer(&self, request: &OAuthRequest) -> Result<D::Consumer> {
        let key = request
            .get_parameter(PARAM_CONSUMER_KEY)
            .ok_or(Error::UnknownConsumer)?;
        self.store
            .lookup_consumer(key)
            .await?
            .ok_or(Error::UnknownConsumer)
    }

    /// Token named by `oauth_token`, of the given kind.
    pub async fn get_token(
        &self,
        request: &OAuthRequest,
        consumer: &D::Consumer,
        kind: TokenKind,
    ) -> Result<Token> {
        let key = request
            .get_parameter(PARAM_TOKEN)
            .ok_or(Error::TokenNotFound { kind })?;
        self.store
            .lookup_token(consumer, kind, key)
            .await?
            .ok_or(Error::TokenNotFound { kind })
    }

    /// Timestamp window, nonce replay, method selection, then the signature.
    pub async fn check_signature(
        &self,
        request: &OAuthRequest,
        consumer: &D::Consumer,
        token: Option<&Token>,
    ) -> Result<()> {
        let timestamp = self.check_timestamp(request)?;

        let nonce = request
            .get_parameter(PARAM_NONCE)
            .ok_or(Error::MissingParameter(PARAM_NONCE))?;
        let token_key = token.map(|t| t.key.as_str());
        if self
            .store
            .lookup_nonce(consumer, token_key, nonce, timestamp)
            .await?
        {
            return Err(Error::NonceReused);
        }

        let method_name = request
            .get_parameter(PARAM_SIGNATURE_METHOD)
            .ok_or(Error::MissingParameter(PARAM_SIGNATURE_METHOD))?;
        let method = self
            .methods
            .get(method_name)
            .ok_or_else(|| Error::UnsupportedSignatureMethod(method_name.to_owned()))?;

        let signature = request
            .get_parameter(PARAM_SIGNATURE)
            .ok_or(Error::MissingParameter(PARAM_SIGNATURE))?;
        let keys = SigningKeys {
            consumer_secret: consumer.shared_secret(),
            rsa_public_key: consumer.rsa_public_key(),
            token_secret: token.map(|t| t.secret.expose_str()),
        };
        if !method.check_signature(request, &keys, signature)? {
            debug!(
                consumer_key = consumer.consumer_key(),
                method = method_name,
                "signature mismatch"
            );
            return Err(Error::InvalidSignature);
        }
        Ok(())
    }

    /// Authenticate an ordinary API call signed with an access token.
    pub async fn verify_request(&self, request: &OAuthRequest) -> Result<(D::Consumer, Token)> {
        self.get_version(request)?;
        let consumer = self.get_consumer(request).await?;
        let token = self.get_token(request, &consumer, TokenKind::Access).await?;
        self.check_signature(request, &consumer, Some(&token)).await?;
        Ok((consumer, token))
    }

    fn check_timestamp(&self, request: &OAuthRequest) -> Result<u64> {
        let raw = request
            .get_parameter(PARAM_TIMESTAMP)
            .ok_or(Error::MissingParameter(PARAM_TIMESTAMP))?;
        let timestamp: u64 = raw
            .parse()
            .map_err(|_| Error::MalformedRequest(format!("invalid timestamp: {raw}")))?;
        let now = crate::now_secs();
        if now.abs_diff(timestamp) > self.timestamp_threshold {
            return Err(Error::StaleTimestamp { timestamp, now });
        }
        Ok(timestamp)
    }
}
