//! Callback policy
//!
//! A consumer either has its callback fixed at registration, in which case
//! clients must send the out-of-band marker, or registered a prefix that
//! every supplied callback has to start with.

use credential_store::Consumer;
use oauth1::Token;
use oauth1::constants::{OUT_OF_BAND, PARAM_TOKEN, PARAM_VERIFIER};
use url::Url;

use crate::error::{Error, Result};

/// Validate the `oauth_callback` a client sent when initiating.
///
/// Prefix matching is on the literal string, not on parsed URL parts.
pub fn check_callback(consumer: &Consumer, callback: Option<&str>) -> Result<()> {
    let callback = callback.unwrap_or_default();

    if !consumer.callback_is_prefix {
        if callback != OUT_OF_BAND {
            return Err(Error::InvalidCallback(
                "callback must be \"oob\" for this consumer".into(),
            ));
        }
        return Ok(());
    }

    if callback.is_empty() {
        return Err(Error::InvalidCallback("callback is empty".into()));
    }
    if callback == OUT_OF_BAND {
        return Ok(());
    }
    if Url::parse(callback).is_err() {
        return Err(Error::InvalidCallback(format!("{callback} is not a valid URL")));
    }
    if !callback.starts_with(&consumer.callback_url) {
        return Err(Error::InvalidCallback(format!(
            "{callback} does not start with the registered callback URL"
        )));
    }
    Ok(())
}

/// Where to send the user after authorization.
///
/// The callback stored on the request token, or the consumer's registered
/// URL when the client asked for out-of-band, with the verifier and the
/// request token key appended.
pub fn callback_url(consumer: &Consumer, request_token: &Token, verifier: &str) -> Result<String> {
    let base = match request_token.callback.as_deref() {
        Some(cb) if cb != OUT_OF_BAND && !cb.is_empty() => cb,
        _ => consumer.callback_url.as_str(),
    };
    let mut url = Url::parse(base)
        .map_err(|e| Error::InvalidCallback(format!("cannot redirect to {base}: {e}")))?;
    url.query_pairs_mut()
        .append_pair(PARAM_VERIFIER, verifier)
        .append_pair(PARAM_TOKEN, &request_token.key);
    Ok(url.into())
}
