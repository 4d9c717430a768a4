//! RFC 3986 percent-encoding as required by RFC 5849 section 3.6
//!
//! OAuth signs the *encoded* form of every parameter, so the encoder must
//! be exact: only the unreserved set passes through and every other byte
//! becomes `%XX` with upper-case hex digits. `+` is never produced.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::error::{Error, Result};

/// Everything except ALPHA / DIGIT / "-" / "." / "_" / "~"
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a value for use in a signature base string or header.
pub fn encode(input: &str) -> String {
    utf8_percent_encode(input, OAUTH_ENCODE_SET).to_string()
}

/// Decode a percent-encoded value taken from an `Authorization` header.
pub fn decode(input: &str) -> Result<String> {
    percent_decode_str(input)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| Error::MalformedRequest(format!("invalid percent-encoding: {e}")))
}
