//! In-process credential store
//!
//! Consumers and acceptances form the registry, which is persisted to a
//! JSON file on every change using atomic temp-file + rename. Request
//! tokens and nonces are short-lived and only ever held in memory.
//!
//! Two tokio Mutexes guard the state. When both are needed the ephemeral
//! lock is taken first, then the registry lock.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use oauth1::{BoxFuture, DataStore, Token, TokenKind, now_secs};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::{Acceptance, Consumer, CredentialStore, Pruned, Stage, WikiScope};

/// Lifetimes of in-memory entries, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub request_token_ttl: u64,
    /// Must cover the accepted timestamp skew in both directions
    pub nonce_ttl: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            request_token_ttl: 600,
            nonce_ttl: 600,
        }
    }
}

/// Persisted part of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    #[serde(default)]
    consumers: BTreeMap<String, Consumer>,
    #[serde(default)]
    acceptances: Vec<Acceptance>,
}

struct PendingToken {
    consumer_key: String,
    token: Token,
    expires: u64,
}

#[derive(Default)]
struct Ephemeral {
    request_tokens: HashMap<String, PendingToken>,
    nonces: HashMap<String, u64>,
}

impl Ephemeral {
    fn live_request_token(&self, key: &str, consumer_key: &str, now: u64) -> Option<&PendingToken> {
        self.request_tokens
            .get(key)
            .filter(|p| p.consumer_key == consumer_key && p.expires > now)
    }
}

pub struct MemoryStore {
    path: Option<PathBuf>,
    options: StoreOptions,
    ephemeral: Mutex<Ephemeral>,
    registry: Mutex<Registry>,
}

impl MemoryStore {
    /// Load the registry from `path`.
    ///
    /// A missing file is created empty so later loads take the normal path.
    pub async fn load(path: PathBuf, options: StoreOptions) -> Result<Self> {
        let registry = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading registry file: {e}")))?;
            let registry: Registry = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing registry file: {e}")))?;
            info!(
                path = %path.display(),
                consumers = registry.consumers.len(),
                acceptances = registry.acceptances.len(),
                "loaded registry"
            );
            registry
        } else {
            info!(path = %path.display(), "registry file not found, starting empty");
            let registry = Registry::default();
            write_atomic(&path, &registry).await?;
            registry
        };

        Ok(Self {
            path: Some(path),
            options,
            ephemeral: Mutex::new(Ephemeral::default()),
            registry: Mutex::new(registry),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(options: StoreOptions) -> Self {
        Self {
            path: None,
            options,
            ephemeral: Mutex::new(Ephemeral::default()),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Register or replace a consumer and persist.
    pub async fn add_consumer(&self, consumer: Consumer) -> Result<()> {
        let mut registry = self.registry.lock().await;
        if registry
            .consumers
            .values()
            .any(|c| c.id == consumer.id && c.consumer_key != consumer.consumer_key)
        {
            return Err(Error::Constraint(format!(
                "consumer id {} already in use",
                consumer.id
            )));
        }
        debug!(consumer_key = %consumer.consumer_key, "registered consumer");
        registry
            .consumers
            .insert(consumer.consumer_key.clone(), consumer);
        self.persist(&registry).await
    }

    async fn persist(&self, registry: &Registry) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, registry).await,
            None => Ok(()),
        }
    }
}

impl DataStore for MemoryStore {
    type Consumer = Consumer;

    fn lookup_consumer<'a>(
        &'a self,
        consumer_key: &'a str,
    ) -> BoxFuture<'a, oauth1::Result<Option<Consumer>>> {
        Box::pin(async move {
            let registry = self.registry.lock().await;
            Ok(registry.consumers.get(consumer_key).cloned())
        })
    }

    fn lookup_token<'a>(
        &'a self,
        consumer: &'a Consumer,
        kind: TokenKind,
        token_key: &'a str,
    ) -> BoxFuture<'a, oauth1::Result<Option<Token>>> {
        Box::pin(async move {
            match kind {
                TokenKind::Request => {
                    let state = self.ephemeral.lock().await;
                    Ok(state
                        .live_request_token(token_key, &consumer.consumer_key, now_secs())
                        .map(|p| p.token.clone()))
                }
                TokenKind::Access => {
                    let registry = self.registry.lock().await;
                    Ok(registry
                        .acceptances
                        .iter()
                        .find(|a| a.access_token == token_key && a.consumer_id == consumer.id)
                        .map(|a| Token::new_access(a.access_token.clone(), a.access_secret.clone())))
                }
            }
        })
    }

    fn lookup_nonce<'a>(
        &'a self,
        consumer: &'a Consumer,
        token_key: Option<&'a str>,
        nonce: &'a str,
        timestamp: u64,
    ) -> BoxFuture<'a, oauth1::Result<bool>> {
        Box::pin(async move {
            let entry = format!(
                "{}:{}:{timestamp}:{nonce}",
                consumer.consumer_key,
                token_key.unwrap_or_default()
            );
            let now = now_secs();
            let mut state = self.ephemeral.lock().await;
            if state.nonces.get(&entry).is_some_and(|expires| *expires > now) {
                return Ok(true);
            }
            state
                .nonces
                .insert(entry, now.saturating_add(self.options.nonce_ttl));
            Ok(false)
        })
    }

    fn new_request_token<'a>(
        &'a self,
        consumer: &'a Consumer,
        callback: &'a str,
    ) -> BoxFuture<'a, oauth1::Result<Token>> {
        Box::pin(async move {
            let (key, secret) = oauth1::keys::generate_token_pair();
            let mut token = Token::new_request(key, secret, callback.to_owned());
            token.revision = 1;

            let mut state = self.ephemeral.lock().await;
            state.request_tokens.insert(
                token.key.clone(),
                PendingToken {
                    consumer_key: consumer.consumer_key.clone(),
                    token: token.clone(),
                    expires: now_secs().saturating_add(self.options.request_token_ttl),
                },
            );
            debug!(consumer_key = %consumer.consumer_key, "issued request token");
            Ok(token)
        })
    }

    fn new_access_token<'a>(
        &'a self,
        request_token: &'a Token,
        consumer: &'a Consumer,
        verifier: Option<&'a str>,
    ) -> BoxFuture<'a, oauth1::Result<Token>> {
        Box::pin(async move {
            let mut state = self.ephemeral.lock().await;
            let pending = state
                .live_request_token(&request_token.key, &consumer.consumer_key, now_secs())
                .ok_or(oauth1::Error::TokenNotFound {
                    kind: TokenKind::Request,
                })?;

            let (Some(expected), Some(access_key)) = (
                pending.token.verifier.as_deref(),
                pending.token.access_key.as_deref(),
            ) else {
                return Err(oauth1::Error::CorruptToken);
            };
            let Some(verifier) = verifier else {
                return Err(oauth1::Error::VerifierMismatch);
            };
            if !bool::from(expected.as_bytes().ct_eq(verifier.as_bytes())) {
                return Err(oauth1::Error::VerifierMismatch);
            }
            let access_key = access_key.to_owned();

            let access_token = {
                let registry = self.registry.lock().await;
                registry
                    .acceptances
                    .iter()
                    .find(|a| a.access_token == access_key && a.consumer_id == consumer.id)
                    .map(|a| Token::new_access(a.access_token.clone(), a.access_secret.clone()))
                    .ok_or(oauth1::Error::TokenNotFound {
                        kind: TokenKind::Access,
                    })?
            };

            state.request_tokens.remove(&request_token.key);
            debug!(consumer_key = %consumer.consumer_key, "promoted request token");
            Ok(access_token)
        })
    }
}

impl CredentialStore for MemoryStore {
    fn update_request_token<'a>(
        &'a self,
        token: &'a Token,
        consumer: &'a Consumer,
    ) -> BoxFuture<'a, Result<Token>> {
        Box::pin(async move {
            let mut state = self.ephemeral.lock().await;
            let pending = checked_request_token(&mut state, token, consumer)?;
            let mut updated = token.clone();
            updated.revision += 1;
            pending.token = updated.clone();
            Ok(updated)
        })
    }

    fn commit_authorization<'a>(
        &'a self,
        token: &'a Token,
        consumer: &'a Consumer,
        acceptance: Option<Acceptance>,
    ) -> BoxFuture<'a, Result<(Token, Option<Acceptance>)>> {
        Box::pin(async move {
            let mut state = self.ephemeral.lock().await;
            checked_request_token(&mut state, token, consumer)?;

            let saved = match acceptance {
                Some(acceptance) => {
                    let mut registry = self.registry.lock().await;
                    let previous = registry.acceptances.clone();
                    let saved = upsert_acceptance(&mut registry, acceptance)?;
                    if let Err(e) = self.persist(&registry).await {
                        registry.acceptances = previous;
                        return Err(e);
                    }
                    Some(saved)
                }
                None => None,
            };

            let pending = checked_request_token(&mut state, token, consumer)?;
            let mut updated = token.clone();
            updated.revision += 1;
            pending.token = updated.clone();
            debug!(consumer_key = %consumer.consumer_key, "committed authorization");
            Ok((updated, saved))
        })
    }

    fn consumer_key_for_request_token<'a>(
        &'a self,
        token_key: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let now = now_secs();
            let state = self.ephemeral.lock().await;
            Ok(state
                .request_tokens
                .get(token_key)
                .filter(|p| p.expires > now)
                .map(|p| p.consumer_key.clone()))
        })
    }

    fn lookup_acceptance<'a>(
        &'a self,
        user_id: u64,
        consumer_id: u64,
        wiki: &'a WikiScope,
    ) -> BoxFuture<'a, Result<Option<Acceptance>>> {
        Box::pin(async move {
            let registry = self.registry.lock().await;
            Ok(registry
                .acceptances
                .iter()
                .find(|a| a.user_id == user_id && a.consumer_id == consumer_id && &a.wiki == wiki)
                .cloned())
        })
    }

    fn lookup_acceptance_by_token<'a>(
        &'a self,
        consumer_id: u64,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Option<Acceptance>>> {
        Box::pin(async move {
            let registry = self.registry.lock().await;
            Ok(registry
                .acceptances
                .iter()
                .find(|a| a.consumer_id == consumer_id && a.access_token == access_token)
                .cloned())
        })
    }

    fn save_acceptance(&self, acceptance: Acceptance) -> BoxFuture<'_, Result<Acceptance>> {
        Box::pin(async move {
            let mut registry = self.registry.lock().await;
            let saved = upsert_acceptance(&mut registry, acceptance)?;
            self.persist(&registry).await?;
            Ok(saved)
        })
    }

    fn expire_proposed_consumers(&self, cutoff: u64) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let now = now_secs();
            let mut registry = self.registry.lock().await;
            let mut expired = 0;
            for consumer in registry
                .consumers
                .values_mut()
                .filter(|c| c.stage == Stage::Proposed && c.stage_timestamp < cutoff)
            {
                consumer.stage = Stage::Expired;
                consumer.stage_timestamp = now;
                expired += 1;
                info!(consumer_key = %consumer.consumer_key, "expired stale proposed consumer");
            }
            if expired > 0 {
                self.persist(&registry).await?;
            }
            Ok(expired)
        })
    }

    fn prune_expired(&self, now: u64) -> BoxFuture<'_, Result<Pruned>> {
        Box::pin(async move {
            let mut state = self.ephemeral.lock().await;
            let tokens_before = state.request_tokens.len();
            let nonces_before = state.nonces.len();
            state.request_tokens.retain(|_, p| p.expires > now);
            state.nonces.retain(|_, expires| *expires > now);
            Ok(Pruned {
                request_tokens: tokens_before - state.request_tokens.len(),
                nonces: nonces_before - state.nonces.len(),
            })
        })
    }

    fn consumer_stage_counts(&self) -> BoxFuture<'_, Result<BTreeMap<Stage, usize>>> {
        Box::pin(async move {
            let registry = self.registry.lock().await;
            let mut counts = BTreeMap::new();
            for consumer in registry.consumers.values() {
                *counts.entry(consumer.stage).or_insert(0) += 1;
            }
            Ok(counts)
        })
    }

    fn list_consumers(&self) -> BoxFuture<'_, Result<Vec<Consumer>>> {
        Box::pin(async move {
            let registry = self.registry.lock().await;
            Ok(registry.consumers.values().cloned().collect())
        })
    }
}

/// Write the registry to a file atomically.
///
/// Writes a temporary file in the same directory and renames it over the
/// target. Permissions are 0600 since the file holds consumer secrets and
/// access token secrets.
/// Live request token for `consumer` whose revision still matches `token`.
fn checked_request_token<'s>(
    state: &'s mut Ephemeral,
    token: &Token,
    consumer: &Consumer,
) -> Result<&'s mut PendingToken> {
    let now = now_secs();
    let pending = state
        .request_tokens
        .get_mut(&token.key)
        .filter(|p| p.consumer_key == consumer.consumer_key && p.expires > now)
        .ok_or_else(|| Error::NotFound(format!("request token {}", token.key)))?;
    if pending.token.revision != token.revision {
        return Err(Error::Conflict(format!(
            "request token {} changed since it was read",
            token.key
        )));
    }
    Ok(pending)
}

/// Insert (id 0) or overwrite (by id), keeping one acceptance per slot.
fn upsert_acceptance(registry: &mut Registry, mut acceptance: Acceptance) -> Result<Acceptance> {
    if registry
        .acceptances
        .iter()
        .any(|a| a.id != acceptance.id && a.same_slot(&acceptance))
    {
        return Err(Error::Constraint(format!(
            "acceptance already exists for user {} consumer {} on {}",
            acceptance.user_id, acceptance.consumer_id, acceptance.wiki
        )));
    }

    if acceptance.id == 0 {
        acceptance.id = registry.acceptances.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        registry.acceptances.push(acceptance.clone());
    } else {
        let slot = registry
            .acceptances
            .iter_mut()
            .find(|a| a.id == acceptance.id)
            .ok_or_else(|| Error::NotFound(format!("acceptance {}", acceptance.id)))?;
        *slot = acceptance.clone();
    }
    debug!(
        acceptance_id = acceptance.id,
        consumer_id = acceptance.consumer_id,
        wiki = %acceptance.wiki,
        "saved acceptance"
    );
    Ok(acceptance)
}

async fn write_atomic(path: &Path, registry: &Registry) -> Result<()> {
    let json = serde_json::to_string_pretty(registry)
        .map_err(|e| Error::Parse(format!("serializing registry: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("registry path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".registry.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp registry file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting registry file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp registry file: {e}")))?;

    debug!(path = %path.display(), "persisted registry");
    Ok(())
}
