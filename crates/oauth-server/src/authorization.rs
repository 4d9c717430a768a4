//! Resolving which acceptance governs a session
//!
//! A user may hold several acceptances for one consumer, one per wiki
//! scope. A consumer scoped to a single wiki only ever consults that wiki.
//! A wildcard consumer first looks for an acceptance on the current wiki
//! and falls back to the wildcard acceptance, so a narrower grant wins
//! whenever one exists.

use credential_store::{Acceptance, Consumer, CredentialStore, WikiScope};
use tracing::debug;

use crate::error::Result;

pub async fn current_authorization<S: CredentialStore + ?Sized>(
    store: &S,
    central_id: u64,
    consumer: &Consumer,
    current_wiki: &str,
) -> Result<Option<Acceptance>> {
    let check_wiki = match &consumer.wiki {
        WikiScope::All => WikiScope::Wiki(current_wiki.to_owned()),
        scoped => scoped.clone(),
    };

    if let Some(acceptance) = store
        .lookup_acceptance(central_id, consumer.id, &check_wiki)
        .await?
    {
        return Ok(Some(acceptance));
    }

    if consumer.wiki.is_all() {
        debug!(
            consumer_key = %consumer.consumer_key,
            wiki = %check_wiki,
            "no wiki-specific acceptance, trying wildcard"
        );
        return Ok(store
            .lookup_acceptance(central_id, consumer.id, &WikiScope::All)
            .await?);
    }
    Ok(None)
}
