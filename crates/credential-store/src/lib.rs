//! Credential storage for the OAuth provider
//!
//! Holds consumers, request tokens, nonces and acceptances. The protocol
//! engine only talks to the [`CredentialStore`] trait; [`MemoryStore`] is
//! the in-process implementation, with consumers and acceptances persisted
//! to a JSON registry file and short-lived tokens kept in memory.

mod acceptance;
mod consumer;
mod error;
mod memory;
mod restrictions;

use std::collections::BTreeMap;

pub use acceptance::Acceptance;
pub use consumer::{ALL_WIKIS, Consumer, Stage, WikiScope};
pub use error::{Error, Result};
pub use memory::{MemoryStore, StoreOptions};
pub use restrictions::{IpRange, Restrictions};

#[cfg(test)]
pub(crate) use consumer::test_consumer;

use oauth1::{BoxFuture, DataStore, Token};

/// Counts of entries removed by a pruning sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pruned {
    pub request_tokens: usize,
    pub nonces: usize,
}

/// Provider storage contract on top of the generic OAuth data store.
pub trait CredentialStore: DataStore<Consumer = Consumer> {
    /// Persist a modified request token.
    ///
    /// Fails with [`Error::Conflict`] if the stored token's revision no
    /// longer matches `token.revision`. Returns the token as stored.
    fn update_request_token<'a>(
        &'a self,
        token: &'a Token,
        consumer: &'a Consumer,
    ) -> BoxFuture<'a, Result<Token>>;

    /// Save `acceptance` (if any) and the authorized request token together.
    ///
    /// The revision check, the acceptance write and the token write happen
    /// under one lock. On [`Error::Conflict`] nothing is written. Returns
    /// the token as stored and the saved acceptance.
    fn commit_authorization<'a>(
        &'a self,
        token: &'a Token,
        consumer: &'a Consumer,
        acceptance: Option<Acceptance>,
    ) -> BoxFuture<'a, Result<(Token, Option<Acceptance>)>>;

    /// Consumer key a live request token was issued to.
    fn consumer_key_for_request_token<'a>(
        &'a self,
        token_key: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>>>;

    fn lookup_acceptance<'a>(
        &'a self,
        user_id: u64,
        consumer_id: u64,
        wiki: &'a WikiScope,
    ) -> BoxFuture<'a, Result<Option<Acceptance>>>;

    fn lookup_acceptance_by_token<'a>(
        &'a self,
        consumer_id: u64,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Option<Acceptance>>>;

    /// Insert (id 0) or overwrite (by id) an acceptance.
    ///
    /// At most one acceptance may exist per (user, consumer, wiki).
    fn save_acceptance(&self, acceptance: Acceptance) -> BoxFuture<'_, Result<Acceptance>>;

    /// Move proposed consumers last changed before `cutoff` to expired.
    fn expire_proposed_consumers(&self, cutoff: u64) -> BoxFuture<'_, Result<usize>>;

    /// Drop request tokens and nonces whose lifetime ended before `now`.
    fn prune_expired(&self, now: u64) -> BoxFuture<'_, Result<Pruned>>;

    fn consumer_stage_counts(&self) -> BoxFuture<'_, Result<BTreeMap<Stage, usize>>>;

    fn list_consumers(&self) -> BoxFuture<'_, Result<Vec<Consumer>>>;
}
