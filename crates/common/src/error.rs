//! Errors raised while loading provider configuration

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A setting is present but unusable
    #[error("invalid provider configuration: {0}")]
    Config(String),

    /// The secret-transform key could not be obtained
    #[error("secret key unavailable: {0}")]
    SecretKey(String),

    #[error("cannot read provider configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider configuration is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
