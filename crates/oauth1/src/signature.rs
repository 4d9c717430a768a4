//! Signature methods
//!
//! Each method verifies `oauth_signature` against the signature base string
//! of the request. Methods are registered by name in [`SignatureMethods`];
//! the server picks the one named by `oauth_signature_method`.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use ring::signature::{RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY, UnparsedPublicKey};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::constants::{HMAC_SHA1, RSA_SHA1};
use crate::encoding::encode;
use crate::error::{Error, Result};
use crate::request::OAuthRequest;

type HmacSha1Mac = Hmac<Sha1>;

/// Raw HMAC-SHA1 of `message` under `key`.
pub fn hmac_sha1(key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha1Mac::new_from_slice(key).map_err(|e| Error::SigningKey(e.to_string()))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Key material available for checking one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SigningKeys<'a> {
    pub consumer_secret: Option<&'a str>,
    pub rsa_public_key: Option<&'a str>,
    pub token_secret: Option<&'a str>,
}

/// A signature algorithm the server accepts.
pub trait SignatureMethod: Send + Sync {
    /// Value of `oauth_signature_method` selecting this method.
    fn name(&self) -> &'static str;

    /// Whether `signature` is valid for `request` under `keys`.
    fn check_signature(
        &self,
        request: &OAuthRequest,
        keys: &SigningKeys<'_>,
        signature: &str,
    ) -> Result<bool>;
}

/// HMAC-SHA1 (RFC 5849 section 3.4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha1;

impl HmacSha1 {
    /// Base64 HMAC-SHA1 of `base_string` keyed by `enc(cs)&enc(ts)`.
    pub fn sign(
        base_string: &str,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> Result<String> {
        let key = format!(
            "{}&{}",
            encode(consumer_secret),
            encode(token_secret.unwrap_or_default())
        );
        let digest = hmac_sha1(key.as_bytes(), base_string.as_bytes())?;
        Ok(STANDARD.encode(digest))
    }

    /// Constant-time comparison of `signature` against the expected value.
    pub fn verify(
        base_string: &str,
        consumer_secret: &str,
        token_secret: Option<&str>,
        signature: &str,
    ) -> Result<bool> {
        let expected = Self::sign(base_string, consumer_secret, token_secret)?;
        Ok(expected.as_bytes().ct_eq(signature.as_bytes()).into())
    }
}

impl SignatureMethod for HmacSha1 {
    fn name(&self) -> &'static str {
        HMAC_SHA1
    }

    fn check_signature(
        &self,
        request: &OAuthRequest,
        keys: &SigningKeys<'_>,
        signature: &str,
    ) -> Result<bool> {
        let Some(consumer_secret) = keys.consumer_secret else {
            return Ok(false);
        };
        Self::verify(
            &request.signature_base_string(),
            consumer_secret,
            keys.token_secret,
            signature,
        )
    }
}

/// RSA-SHA1 (RFC 5849 section 3.4.3), RSASSA-PKCS1-v1_5 over SHA-1.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaSha1;

impl RsaSha1 {
    /// Verify a base64 signature of `base_string` against a PEM public key.
    pub fn verify_base_string(base_string: &str, public_key_pem: &str, signature: &str) -> bool {
        let Some(public_key) = pem_to_pkcs1(public_key_pem) else {
            warn!("consumer RSA public key could not be parsed");
            return false;
        };
        let Ok(signature) = STANDARD.decode(signature) else {
            return false;
        };
        UnparsedPublicKey::new(&RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY, &public_key)
            .verify(base_string.as_bytes(), &signature)
            .is_ok()
    }
}

impl SignatureMethod for RsaSha1 {
    fn name(&self) -> &'static str {
        RSA_SHA1
    }

    fn check_signature(
        &self,
        request: &OAuthRequest,
        keys: &SigningKeys<'_>,
        signature: &str,
    ) -> Result<bool> {
        let Some(pem) = keys.rsa_public_key else {
            return Ok(false);
        };
        Ok(Self::verify_base_string(
            &request.signature_base_string(),
            pem,
            signature,
        ))
    }
}

/// Decode a PEM public key into DER `RSAPublicKey` (PKCS#1).
///
/// Accepts `RSA PUBLIC KEY` blocks as-is and unwraps `PUBLIC KEY`
/// (SubjectPublicKeyInfo) blocks.
fn pem_to_pkcs1(pem: &str) -> Option<Vec<u8>> {
    let mut label = None;
    let mut body = String::new();
    for line in pem.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("-----BEGIN ") {
            label = rest.strip_suffix("-----").map(str::to_owned);
        } else if line.starts_with("-----END ") {
            break;
        } else if label.is_some() {
            body.push_str(line);
        }
    }
    let der = STANDARD.decode(body).ok()?;
    match label?.as_str() {
        "RSA PUBLIC KEY" => Some(der),
        "PUBLIC KEY" => spki_to_pkcs1(&der).map(<[u8]>::to_vec),
        _ => None,
    }
}

const DER_SEQUENCE: u8 = 0x30;
const DER_BIT_STRING: u8 = 0x03;

/// Split one DER TLV off the front of `input`: `(tag, contents, rest)`.
fn read_tlv(input: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let tag = *input.first()?;
    let first = *input.get(1)?;
    let (len, header) = if first & 0x80 == 0 {
        (usize::from(first), 2)
    } else {
        let n = usize::from(first & 0x7f);
        if n == 0 || n > 4 {
            return None;
        }
        let bytes = input.get(2..2 + n)?;
        let len = bytes
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
        (len, 2 + n)
    };
    let end = header.checked_add(len)?;
    let contents = input.get(header..end)?;
    Some((tag, contents, &input[end..]))
}

/// SubjectPublicKeyInfo ::= SEQUENCE { algorithm SEQUENCE, key BIT STRING }
fn spki_to_pkcs1(der: &[u8]) -> Option<&[u8]> {
    let (tag, spki, _) = read_tlv(der)?;
    if tag != DER_SEQUENCE {
        return None;
    }
    let (tag, _algorithm, rest) = read_tlv(spki)?;
    if tag != DER_SEQUENCE {
        return None;
    }
    let (tag, bits, _) = read_tlv(rest)?;
    if tag != DER_BIT_STRING {
        return None;
    }
    match bits.split_first()? {
        (0, key) => Some(key),
        _ => None,
    }
}

/// Registered signature methods, keyed by name.
#[derive(Clone, Default)]
pub struct SignatureMethods {
    methods: BTreeMap<&'static str, Arc<dyn SignatureMethod>>,
}

impl SignatureMethods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method, replacing any existing one with the same name.
    pub fn with<M: SignatureMethod + 'static>(mut self, method: M) -> Self {
        self.methods.insert(method.name(), Arc::new(method));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn SignatureMethod> {
        self.methods.get(name).map(|m| m.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }
}

impl std::fmt::Debug for SignatureMethods {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.methods.keys()).finish()
    }
}

/// RSA-SHA1 known-answer data shared with downstream test suites.
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures {
    /// 2048-bit RSA public key, SubjectPublicKeyInfo form.
    pub const RSA_SPKI_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA5eTyMN6wavUvBl50r3uJ
bI6Sj3RRvS0ELs2CMjo9cP6vCnyJuiv92tcto2+6BIeb6U6tAHW48eXnUu04cd5Y
H98XmvccGBRrDvvpjC3uzXhXmTVGIzBGvv7IrOvk7t2ihuyxdF0Oa70psGGX0A0N
3F46CNSaKj6eeT9M1OHEYamoOOzavT6dWTeXgT8yNMZY8sPbn2CuenCmZKXAokqf
/v1DmK+mga+V1W4maPZ1ixZ7t7PCWLyTpaSmIwFoFHHn29gHwUh/CGIy9kQoxb2d
ISW25RL3Ev90//Bntd/1Rzd16AhWF9AaH5JHOQ+q1GpKBvHGpTkiq3vZURadEwOe
cwIDAQAB
-----END PUBLIC KEY-----
";

    /// The same key in PKCS#1 form.
    pub const RSA_PKCS1_PEM: &str = "-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEA5eTyMN6wavUvBl50r3uJbI6Sj3RRvS0ELs2CMjo9cP6vCnyJuiv9
2tcto2+6BIeb6U6tAHW48eXnUu04cd5YH98XmvccGBRrDvvpjC3uzXhXmTVGIzBG
vv7IrOvk7t2ihuyxdF0Oa70psGGX0A0N3F46CNSaKj6eeT9M1OHEYamoOOzavT6d
WTeXgT8yNMZY8sPbn2CuenCmZKXAokqf/v1DmK+mga+V1W4maPZ1ixZ7t7PCWLyT
paSmIwFoFHHn29gHwUh/CGIy9kQoxb2dISW25RL3Ev90//Bntd/1Rzd16AhWF9Aa
H5JHOQ+q1GpKBvHGpTkiq3vZURadEwOecwIDAQAB
-----END RSA PUBLIC KEY-----
";

    /// URL whose query carries every parameter of the signed RSA request.
    pub const RSA_REQUEST_URL: &str = "https://wiki.example.org/oauth/initiate?oauth_callback=oob&oauth_consumer_key=rsa-consumer&oauth_nonce=fixednonce&oauth_signature_method=RSA-SHA1&oauth_timestamp=1700000000&oauth_version=1.0";

    pub const RSA_BASE_STRING: &str = "GET&https%3A%2F%2Fwiki.example.org%2Foauth%2Finitiate&oauth_callback%3Doob%26oauth_consumer_key%3Drsa-consumer%26oauth_nonce%3Dfixednonce%26oauth_signature_method%3DRSA-SHA1%26oauth_timestamp%3D1700000000%26oauth_version%3D1.0";

    pub const RSA_SIGNATURE: &str = "EpUhws6XpyRX1BhSyO92+2tJjT2lua4VosNR6gsWhg0zsuMzNFxhUVYAobnzUIg201/oQp9Xcsefb1D1RR9VqspMKTeW+I9nHOHu/Pj3xgxqJ31QhEhWCfemnT8J35F/eakUkeZpZebWg7IybMQNcOJmlep+8t7KVtY/7rrl9a11oEZ5NkkzaEyuduEozGh4ddY0T/mGoe0zBIVg5/dVeH1pchmqDQJXaGLtV4L2eS4U6UbqkN3wbwclc4I9AsZshVY2Ssu0PeYzMEuVYSYM2VK8sdWmsDjzGPWF36gjL9bOCglqsf1iVN/CqnwnwQrIevedY8AuvnJNHxQCR+RJ7Q==";
}
