//! Keyed secret transform and the provider's signature methods
//!
//! Shared secrets are never used raw. With a server secret key configured,
//! every consumer and token secret goes through `hex(HMAC-SHA1(key, raw))`
//! before it keys a signature, and clients are only ever handed the
//! transformed value. A leaked registry therefore cannot forge requests.

use common::Secret;
use oauth1::constants::HMAC_SHA1;
use oauth1::signature::hmac_sha1;
use oauth1::{HmacSha1, OAuthRequest, RsaSha1, SignatureMethod, SignatureMethods, SigningKeys};

#[derive(Debug, Clone, Default)]
pub struct SecretTransform {
    key: Option<Secret<String>>,
}

impl SecretTransform {
    /// An empty key disables the transform.
    pub fn new(key: Option<Secret<String>>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()),
        }
    }

    pub fn apply(&self, raw: &str) -> oauth1::Result<String> {
        let Some(key) = &self.key else {
            return Ok(raw.to_owned());
        };
        let digest = hmac_sha1(key.expose_str().as_bytes(), raw.as_bytes())?;
        Ok(hex::encode(digest))
    }
}

/// HMAC-SHA1 over transformed consumer and token secrets.
#[derive(Debug, Clone)]
pub struct KeyedHmacSha1 {
    transform: SecretTransform,
}

impl KeyedHmacSha1 {
    pub fn new(transform: SecretTransform) -> Self {
        Self { transform }
    }
}

impl SignatureMethod for KeyedHmacSha1 {
    fn name(&self) -> &'static str {
        HMAC_SHA1
    }

    fn check_signature(
        &self,
        request: &OAuthRequest,
        keys: &SigningKeys<'_>,
        signature: &str,
    ) -> oauth1::Result<bool> {
        let Some(consumer_secret) = keys.consumer_secret else {
            return Ok(false);
        };
        let consumer_secret = self.transform.apply(consumer_secret)?;
        let token_secret = keys
            .token_secret
            .map(|s| self.transform.apply(s))
            .transpose()?;
        HmacSha1::verify(
            &request.signature_base_string(),
            &consumer_secret,
            token_secret.as_deref(),
            signature,
        )
    }
}

/// Methods accepted by the provider.
pub fn signature_methods(transform: SecretTransform) -> SignatureMethods {
    SignatureMethods::new()
        .with(KeyedHmacSha1::new(transform))
        .with(RsaSha1)
}
