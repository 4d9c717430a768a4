//! Common types shared by the OAuth provider crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
