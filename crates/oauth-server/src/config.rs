//! Engine configuration
//!
//! Built once at startup and handed to [`crate::Server::new`]; never
//! mutated afterwards.

use common::Secret;
use oauth1::encoding::encode;

/// Placeholder replaced by the owner's user name in `user_talk_url`.
pub const USER_PLACEHOLDER: &str = "{user}";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Wiki this engine serves; used for wildcard acceptance lookups
    pub current_wiki: String,
    /// Wiki holding the central account registry
    pub central_wiki: String,
    /// Key for the secret transform. `None` leaves secrets untouched.
    pub secret_key: Option<Secret<String>>,
    /// Whether a blocked account may not authorize consumers
    pub block_disables_login: bool,
    /// Allowed clock skew for `oauth_timestamp`, in seconds
    pub timestamp_threshold: u64,
    /// Template for the owner contact link, containing `{user}`
    pub user_talk_url: String,
}

impl ServerConfig {
    /// Owner contact link for `user_name`.
    ///
    /// Spaces become underscores as in wiki page titles.
    pub fn user_talk_url(&self, user_name: &str) -> String {
        let title = encode(&user_name.replace(' ', "_"));
        self.user_talk_url.replace(USER_PLACEHOLDER, &title)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            current_wiki: "wiki".into(),
            central_wiki: "wiki".into(),
            secret_key: None,
            block_disables_login: false,
            timestamp_threshold: 300,
            user_talk_url: "/wiki/User_talk:{user}".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn talk_url_substitutes_encoded_title() {
        let config = ServerConfig {
            user_talk_url: "https://meta.example.org/wiki/User_talk:{user}".into(),
            ..Default::default()
        };
        assert_eq!(
            config.user_talk_url("Jane Doe/bot"),
            "https://meta.example.org/wiki/User_talk:Jane_Doe%2Fbot"
        );
    }

    #[test]
    fn debug_redacts_secret_key() {
        let config = ServerConfig {
            secret_key: Some(Secret::from("top-secret")),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("top-secret"));
    }
}
