//! Configuration types and loading
//!
//! The file path comes from `--config`, then CONFIG_PATH, then the default.
//! The secret-transform key is loaded from OAUTH_SECRET_KEY or
//! `[oauth].secret_key_file`, never stored in the TOML directly.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use credential_store::StoreOptions;
use oauth_server::{ServerConfig, User};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: HttpConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Local account directory
    #[serde(default)]
    pub users: Vec<User>,
}

/// Public listener
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub listen_addr: SocketAddr,
    /// Base URL clients sign against, e.g. `https://wiki.example.org`
    pub public_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Admin listener, never exposed publicly
#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_admin_addr(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub current_wiki: String,
    /// Defaults to `current_wiki`
    #[serde(default)]
    pub central_wiki: Option<String>,
    #[serde(default = "default_user_talk_url")]
    pub user_talk_url: String,
    #[serde(default)]
    pub block_disables_login: bool,
    #[serde(default = "default_timestamp_threshold")]
    pub timestamp_threshold: u64,
    #[serde(skip)]
    pub secret_key: Option<Secret<String>>,
    /// Path to a file holding the secret-transform key
    #[serde(default)]
    pub secret_key_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Registry file. Without one the registry lives only in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_token_ttl")]
    pub request_token_ttl: u64,
    #[serde(default = "default_token_ttl")]
    pub nonce_ttl: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            request_token_ttl: default_token_ttl(),
            nonce_ttl: default_token_ttl(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_maintenance_interval")]
    pub interval_secs: u64,
    /// Age after which unapproved proposals expire; 0 disables expiry
    #[serde(default = "default_expiration_age")]
    pub expiration_age_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_maintenance_interval(),
            expiration_age_secs: default_expiration_age(),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_user_talk_url() -> String {
    "/wiki/User_talk:{user}".into()
}

fn default_timestamp_threshold() -> u64 {
    300
}

fn default_token_ttl() -> u64 {
    600
}

fn default_maintenance_interval() -> u64 {
    3600
}

fn default_expiration_age() -> u64 {
    30 * 24 * 60 * 60
}

impl Config {
    /// Parse and validate the TOML file, then resolve the secret key.
    ///
    /// Secret key resolution order:
    /// 1. OAUTH_SECRET_KEY env var
    /// 2. secret_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(key) = std::env::var("OAUTH_SECRET_KEY") {
            if !key.is_empty() {
                config.oauth.secret_key = Some(Secret::new(key));
            }
        } else if let Some(ref key_file) = config.oauth.secret_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::SecretKey(format!(
                    "cannot read secret_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.oauth.secret_key = Some(Secret::new(key));
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let public_url = url::Url::parse(&self.server.public_url).map_err(|e| {
            common::Error::Config(format!(
                "public_url is not a valid URL ({e}): {}",
                self.server.public_url
            ))
        })?;
        if !matches!(public_url.scheme(), "http" | "https") {
            return Err(common::Error::Config(format!(
                "public_url must start with http:// or https://, got: {}",
                self.server.public_url
            )));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.oauth.timestamp_threshold == 0 {
            return Err(common::Error::Config(
                "timestamp_threshold must be greater than 0".into(),
            ));
        }
        if self.oauth.current_wiki.trim().is_empty() {
            return Err(common::Error::Config("current_wiki must not be empty".into()));
        }
        if matches!(self.oauth.central_wiki.as_deref(), Some(w) if w.trim().is_empty()) {
            return Err(common::Error::Config("central_wiki must not be empty".into()));
        }
        if self.store.request_token_ttl == 0 || self.store.nonce_ttl == 0 {
            return Err(common::Error::Config(
                "request_token_ttl and nonce_ttl must be greater than 0".into(),
            ));
        }
        if self.maintenance.interval_secs == 0 {
            return Err(common::Error::Config(
                "maintenance interval_secs must be greater than 0".into(),
            ));
        }
        if let Some(user) = self.users.iter().find(|u| u.id == 0) {
            return Err(common::Error::Config(format!(
                "user {} has id 0, ids must be positive",
                user.name
            )));
        }
        Ok(())
    }

    /// Engine configuration derived from `[oauth]`.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            current_wiki: self.oauth.current_wiki.clone(),
            central_wiki: self
                .oauth
                .central_wiki
                .clone()
                .unwrap_or_else(|| self.oauth.current_wiki.clone()),
            secret_key: self.oauth.secret_key.clone(),
            block_disables_login: self.oauth.block_disables_login,
            timestamp_threshold: self.oauth.timestamp_threshold,
            user_talk_url: self.oauth.user_talk_url.clone(),
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            request_token_ttl: self.store.request_token_ttl,
            nonce_ttl: self.store.nonce_ttl,
        }
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance.interval_secs)
    }

    pub fn expiration_age(&self) -> Duration {
        Duration::from_secs(self.maintenance.expiration_age_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oauth-provider.toml")
    }
}
