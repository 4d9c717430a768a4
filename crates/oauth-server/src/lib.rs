//! OAuth 1.0a provider engine for a wiki farm
//!
//! Builds on the generic protocol in `oauth1` and the records in
//! `credential-store` to implement the provider handshake:
//! - `fetch_request_token` and `fetch_access_token` for consumers
//! - `authorize` for the approval UI, creating or reusing acceptances
//! - `verify_request` for signed API calls
//!
//! Acceptances are scoped per wiki. See [`authorization`] for how the one
//! governing a session is chosen.

pub mod authorization;
pub mod callback;
pub mod config;
pub mod error;
pub mod identity;
pub mod maintenance;
pub mod server;
pub mod signature;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use identity::{
    Audience, CentralIdLookup, CentralUserName, IdentityResolver, StaticUsers, User, UserDirectory,
};
pub use maintenance::{MaintenanceReport, run_maintenance, spawn_maintenance_task};
pub use server::{IssuedCredentials, Server};
pub use signature::{KeyedHmacSha1, SecretTransform, signature_methods};
