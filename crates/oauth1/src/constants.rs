//! OAuth 1.0a protocol constants (RFC 5849)

/// The only protocol version this provider speaks
pub const OAUTH_VERSION: &str = "1.0";

/// Callback value meaning "no callback, show the verifier to the user".
/// Case sensitive per RFC 5849 section 2.1.
pub const OUT_OF_BAND: &str = "oob";

pub const PARAM_CONSUMER_KEY: &str = "oauth_consumer_key";
pub const PARAM_TOKEN: &str = "oauth_token";
pub const PARAM_TOKEN_SECRET: &str = "oauth_token_secret";
pub const PARAM_SIGNATURE_METHOD: &str = "oauth_signature_method";
pub const PARAM_SIGNATURE: &str = "oauth_signature";
pub const PARAM_TIMESTAMP: &str = "oauth_timestamp";
pub const PARAM_NONCE: &str = "oauth_nonce";
pub const PARAM_VERSION: &str = "oauth_version";
pub const PARAM_CALLBACK: &str = "oauth_callback";
pub const PARAM_CALLBACK_CONFIRMED: &str = "oauth_callback_confirmed";
pub const PARAM_VERIFIER: &str = "oauth_verifier";

/// Problem reporting parameters (OAuth Problem Reporting extension)
pub const PARAM_PROBLEM: &str = "oauth_problem";
pub const PARAM_PROBLEM_ADVICE: &str = "oauth_problem_advice";

pub const HMAC_SHA1: &str = "HMAC-SHA1";
pub const RSA_SHA1: &str = "RSA-SHA1";

/// Prefix of an `Authorization` header carrying OAuth parameters
pub const AUTHORIZATION_SCHEME: &str = "OAuth ";
