//! Signed request model (RFC 5849 section 3.4)
//!
//! An `OAuthRequest` is the protocol's view of an HTTP request: method,
//! absolute URL, the merged parameter set and the peer address. Parameters
//! are collected from three places, in this order:
//! 1. the URL query string
//! 2. an `application/x-www-form-urlencoded` body
//! 3. the `Authorization: OAuth ...` header (minus `realm`)
//!
//! The same type is used client-side to build and sign outgoing requests.

use std::net::{IpAddr, Ipv4Addr};

use url::Url;

use crate::constants::{
    AUTHORIZATION_SCHEME, HMAC_SHA1, OAUTH_VERSION, PARAM_CONSUMER_KEY, PARAM_NONCE,
    PARAM_SIGNATURE, PARAM_SIGNATURE_METHOD, PARAM_TIMESTAMP, PARAM_TOKEN, PARAM_VERSION,
};
use crate::encoding::{decode, encode};
use crate::error::{Error, Result};
use crate::signature::HmacSha1;

/// Parsed OAuth request.
#[derive(Debug, Clone)]
pub struct OAuthRequest {
    method: String,
    url: Url,
    params: Vec<(String, String)>,
    source_ip: IpAddr,
}

impl OAuthRequest {
    /// Build a request from raw HTTP parts as received by the server.
    ///
    /// `url` must be the absolute URL the client signed (scheme, host and
    /// path as the client saw them, including the query string).
    pub fn from_parts(
        method: &str,
        url: &str,
        authorization: Option<&str>,
        form_body: Option<&str>,
        source_ip: IpAddr,
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::MalformedRequest(format!("invalid request URL: {e}")))?;

        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if let Some(body) = form_body {
            params.extend(
                url::form_urlencoded::parse(body.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }

        if let Some(header) = authorization.filter(|h| has_oauth_authorization(h)) {
            params.extend(parse_authorization_header(header)?);
        }

        Ok(Self {
            method: method.to_ascii_uppercase(),
            url,
            params,
            source_ip,
        })
    }

    /// Build an unsigned client request with the protocol parameters filled in.
    ///
    /// Query parameters already present on `url` are kept and signed.
    pub fn for_client(
        method: &str,
        url: &str,
        consumer_key: &str,
        token: Option<&str>,
        signature_method: &str,
    ) -> Result<Self> {
        let mut request = Self::from_parts(
            method,
            url,
            None,
            None,
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        )?;
        request.set_parameter(PARAM_CONSUMER_KEY, consumer_key);
        if let Some(token) = token {
            request.set_parameter(PARAM_TOKEN, token);
        }
        request.set_parameter(PARAM_SIGNATURE_METHOD, signature_method);
        request.set_parameter(PARAM_TIMESTAMP, &crate::now_secs().to_string());
        request.set_parameter(PARAM_NONCE, &crate::keys::generate_nonce());
        request.set_parameter(PARAM_VERSION, OAUTH_VERSION);
        Ok(request)
    }

    /// Upper-case HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Address of the peer that sent the request.
    pub fn source_ip(&self) -> IpAddr {
        self.source_ip
    }

    /// First value of the named parameter.
    pub fn get_parameter(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a parameter, replacing every existing value with the same name.
    pub fn set_parameter(&mut self, name: &str, value: &str) {
        self.params.retain(|(k, _)| k != name);
        self.params.push((name.to_owned(), value.to_owned()));
    }

    /// All collected parameters in arrival order.
    pub fn parameters(&self) -> &[(String, String)] {
        &self.params
    }

    /// Base string URI: scheme and host lower-cased, default port dropped,
    /// no query or fragment.
    pub fn normalized_url(&self) -> String {
        let scheme = self.url.scheme();
        let host = self.url.host_str().unwrap_or_default().to_ascii_lowercase();
        let port = self
            .url
            .port()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        format!("{scheme}://{host}{port}{}", self.url.path())
    }

    /// Normalized request parameters: every parameter except the signature,
    /// encoded, sorted by name then value, joined with `&`.
    pub fn normalized_parameters(&self) -> String {
        let mut pairs: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|(k, _)| k != PARAM_SIGNATURE)
            .map(|(k, v)| (encode(k), encode(v)))
            .collect();
        pairs.sort();
        pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// `METHOD&enc(url)&enc(params)`
    pub fn signature_base_string(&self) -> String {
        format!(
            "{}&{}&{}",
            self.method,
            encode(&self.normalized_url()),
            encode(&self.normalized_parameters())
        )
    }

    /// Sign with HMAC-SHA1 and store the result in `oauth_signature`.
    pub fn sign_hmac_sha1(
        &mut self,
        consumer_secret: &str,
        token_secret: Option<&str>,
    ) -> Result<()> {
        self.set_parameter(PARAM_SIGNATURE_METHOD, HMAC_SHA1);
        let signature =
            HmacSha1::sign(&self.signature_base_string(), consumer_secret, token_secret)?;
        self.set_parameter(PARAM_SIGNATURE, &signature);
        Ok(())
    }

    /// Render the request as a URL carrying every parameter in the query.
    pub fn to_url(&self) -> String {
        let query = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.normalized_url())
    }

    /// Render the `oauth_*` parameters as an `Authorization` header value.
    pub fn to_authorization_header(&self) -> String {
        let fields = self
            .params
            .iter()
            .filter(|(k, _)| k.starts_with("oauth_"))
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{AUTHORIZATION_SCHEME}{fields}")
    }
}

/// Whether an `Authorization` header value uses the OAuth scheme.
pub fn has_oauth_authorization(header: &str) -> bool {
    header
        .get(..AUTHORIZATION_SCHEME.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(AUTHORIZATION_SCHEME))
}

/// Parse `OAuth k="v", k2="v2"` into decoded pairs, dropping `realm`.
fn parse_authorization_header(header: &str) -> Result<Vec<(String, String)>> {
    let fields = &header[AUTHORIZATION_SCHEME.len()..];
    let mut params = Vec::new();
    for field in fields.split(',') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (name, value) = field.split_once('=').ok_or_else(|| {
            Error::MalformedRequest(format!("malformed Authorization field: {field}"))
        })?;
        let name = decode(name.trim())?;
        if name.eq_ignore_ascii_case("realm") {
            continue;
        }
        let value = value.trim().trim_matches('"');
        params.push((name, decode(value)?));
    }
    Ok(params)
}
