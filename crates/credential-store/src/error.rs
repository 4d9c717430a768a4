//! Error types for credential storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("registry parse error: {0}")]
    Parse(String),

    /// A compare-and-swap lost against a concurrent writer
    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for oauth1::Error {
    fn from(e: Error) -> Self {
        oauth1::Error::Store(e.to_string())
    }
}
