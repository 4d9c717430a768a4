//! Random key material for tokens and verifier codes
//!
//! Token keys, token secrets and verifier codes are all 128-bit values
//! from the thread-local CSPRNG, rendered as 32 lowercase hex characters.

use rand::RngExt;

/// Number of random bytes behind every generated key.
const KEY_BYTES: usize = 16;

/// Generate a random lowercase hex string from `KEY_BYTES` random bytes.
pub fn generate_hex() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Generate a fresh `(key, secret)` pair for a request or access token.
pub fn generate_token_pair() -> (String, String) {
    (generate_hex(), generate_hex())
}

/// Generate the one-time verifier code attached at authorization time.
pub fn generate_verifier() -> String {
    generate_hex()
}

/// Generate a nonce for client-side request signing.
pub fn generate_nonce() -> String {
    generate_hex()
}
