//! Shared test fixtures

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use common::Secret;
use credential_store::{
    Acceptance, Consumer, CredentialStore, MemoryStore, Pruned, Restrictions, Stage, StoreOptions,
    WikiScope,
};
use oauth1::constants::HMAC_SHA1;
use oauth1::{BoxFuture, DataStore, OAuthRequest, Token, TokenKind};

use crate::config::ServerConfig;
use crate::identity::{IdentityResolver, StaticUsers, User};
use crate::server::Server;
use crate::signature::SecretTransform;

pub use oauth1::signature::fixtures::{RSA_REQUEST_URL, RSA_SIGNATURE, RSA_SPKI_PEM};

pub const BASE_URL: &str = "https://wiki.example.org";
pub const CURRENT_WIKI: &str = "testwiki";
pub const SERVER_KEY: &str = "server-key";
pub const CONSUMER_SECRET: &str = "consumer-secret";
pub const OWNER_ID: u64 = 100;

pub fn user(id: u64, name: &str) -> User {
    User {
        id,
        name: name.to_owned(),
        locked: false,
        blocked: false,
        hidden: false,
        can_view_hidden: false,
    }
}

/// Approved wildcard consumer owned by `OWNER_ID` with an HMAC secret.
pub fn consumer(id: u64, key: &str) -> Consumer {
    Consumer {
        id,
        consumer_key: key.to_owned(),
        name: format!("Test app {id}"),
        user_id: OWNER_ID,
        version: "1.0".into(),
        email: "owner@example.org".into(),
        description: "fixture".into(),
        callback_url: "https://app.example.org/callback".into(),
        callback_is_prefix: false,
        owner_only: false,
        deleted: false,
        secret_key: Some(Secret::from(CONSUMER_SECRET)),
        rsa_key: None,
        wiki: WikiScope::All,
        grants: vec!["basic".into(), "editpage".into()],
        restrictions: Restrictions::default(),
        stage: Stage::Approved,
        stage_timestamp: 0,
        registered: 0,
    }
}

pub fn acceptance(user_id: u64, consumer_id: u64, wiki: &str, token: &str) -> Acceptance {
    Acceptance {
        id: 0,
        wiki: WikiScope::from(wiki),
        user_id,
        consumer_id,
        access_token: token.to_owned(),
        access_secret: Secret::from(format!("{token}-secret")),
        grants: vec!["basic".into()],
        accepted: 0,
    }
}

pub fn config() -> ServerConfig {
    ServerConfig {
        current_wiki: CURRENT_WIKI.into(),
        central_wiki: CURRENT_WIKI.into(),
        secret_key: Some(Secret::from(SERVER_KEY)),
        block_disables_login: true,
        timestamp_threshold: 300,
        user_talk_url: "https://wiki.example.org/wiki/User_talk:{user}".into(),
    }
}

/// What a client holds in place of a raw stored secret.
pub fn client_secret(raw: &str) -> String {
    SecretTransform::new(Some(Secret::from(SERVER_KEY)))
        .apply(raw)
        .unwrap()
}

pub struct Harness {
    pub server: Server<MemoryStore>,
    pub store: Arc<MemoryStore>,
}

/// Engine over an in-memory store holding `consumers`, with users
/// 1 (Alice), 2 (Bob) and the owner.
pub async fn harness_with(consumers: Vec<Consumer>, config: ServerConfig) -> Harness {
    let store = Arc::new(MemoryStore::in_memory(StoreOptions::default()));
    for c in consumers {
        store.add_consumer(c).await.unwrap();
    }
    let users = StaticUsers::new([user(1, "Alice"), user(2, "Bob"), user(OWNER_ID, "App Owner")]);
    let identity = IdentityResolver::Direct(Arc::new(users));
    Harness {
        server: Server::new(store.clone(), identity, config),
        store,
    }
}

pub async fn harness(consumers: Vec<Consumer>) -> Harness {
    harness_with(consumers, config()).await
}

/// Sign `path_and_query` on `BASE_URL` as a client would and parse it back
/// as the server receives it from `ip`.
pub fn signed_request(
    path_and_query: &str,
    consumer_key: &str,
    consumer_secret: &str,
    token: Option<(&str, &str)>,
    ip: &str,
) -> OAuthRequest {
    let mut request = OAuthRequest::for_client(
        "GET",
        &format!("{BASE_URL}{path_and_query}"),
        consumer_key,
        token.map(|(key, _)| key),
        HMAC_SHA1,
    )
    .unwrap();
    request.sign_hmac_sha1(consumer_secret, token.map(|(_, secret)| secret)).unwrap();
    reparse(&request, ip)
}

pub fn reparse(request: &OAuthRequest, ip: &str) -> OAuthRequest {
    let ip: IpAddr = ip.parse().unwrap();
    OAuthRequest::from_parts(request.method(), &request.to_url(), None, None, ip).unwrap()
}

/// Verifier from a post-authorization redirect URL.
pub fn verifier_from(callback_url: &str) -> String {
    url::Url::parse(callback_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "oauth_verifier")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

/// Store whose request-token reads are followed by a competing write, so
/// the reader always holds a stale revision.
pub struct RacingStore {
    pub inner: Arc<MemoryStore>,
}

impl DataStore for RacingStore {
    type Consumer = Consumer;

    fn lookup_consumer<'a>(
        &'a self,
        consumer_key: &'a str,
    ) -> BoxFuture<'a, oauth1::Result<Option<Consumer>>> {
        self.inner.lookup_consumer(consumer_key)
    }

    fn lookup_token<'a>(
        &'a self,
        consumer: &'a Consumer,
        kind: TokenKind,
        token_key: &'a str,
    ) -> BoxFuture<'a, oauth1::Result<Option<Token>>> {
        Box::pin(async move {
            let token = self.inner.lookup_token(consumer, kind, token_key).await?;
            if let (TokenKind::Request, Some(read)) = (kind, &token) {
                let mut rival = read.clone();
                rival.add_verifier("rival-verifier".into());
                self.inner.update_request_token(&rival, consumer).await?;
            }
            Ok(token)
        })
    }

    fn lookup_nonce<'a>(
        &'a self,
        consumer: &'a Consumer,
        token_key: Option<&'a str>,
        nonce: &'a str,
        timestamp: u64,
    ) -> BoxFuture<'a, oauth1::Result<bool>> {
        self.inner.lookup_nonce(consumer, token_key, nonce, timestamp)
    }

    fn new_request_token<'a>(
        &'a self,
        consumer: &'a Consumer,
        callback: &'a str,
    ) -> BoxFuture<'a, oauth1::Result<Token>> {
        self.inner.new_request_token(consumer, callback)
    }

    fn new_access_token<'a>(
        &'a self,
        request_token: &'a Token,
        consumer: &'a Consumer,
        verifier: Option<&'a str>,
    ) -> BoxFuture<'a, oauth1::Result<Token>> {
        self.inner.new_access_token(request_token, consumer, verifier)
    }
}

impl CredentialStore for RacingStore {
    fn update_request_token<'a>(
        &'a self,
        token: &'a Token,
        consumer: &'a Consumer,
    ) -> BoxFuture<'a, credential_store::Result<Token>> {
        self.inner.update_request_token(token, consumer)
    }

    fn commit_authorization<'a>(
        &'a self,
        token: &'a Token,
        consumer: &'a Consumer,
        acceptance: Option<Acceptance>,
    ) -> BoxFuture<'a, credential_store::Result<(Token, Option<Acceptance>)>> {
        self.inner.commit_authorization(token, consumer, acceptance)
    }

    fn consumer_key_for_request_token<'a>(
        &'a self,
        token_key: &'a str,
    ) -> BoxFuture<'a, credential_store::Result<Option<String>>> {
        self.inner.consumer_key_for_request_token(token_key)
    }

    fn lookup_acceptance<'a>(
        &'a self,
        user_id: u64,
        consumer_id: u64,
        wiki: &'a WikiScope,
    ) -> BoxFuture<'a, credential_store::Result<Option<Acceptance>>> {
        self.inner.lookup_acceptance(user_id, consumer_id, wiki)
    }

    fn lookup_acceptance_by_token<'a>(
        &'a self,
        consumer_id: u64,
        access_token: &'a str,
    ) -> BoxFuture<'a, credential_store::Result<Option<Acceptance>>> {
        self.inner.lookup_acceptance_by_token(consumer_id, access_token)
    }

    fn save_acceptance(
        &self,
        acceptance: Acceptance,
    ) -> BoxFuture<'_, credential_store::Result<Acceptance>> {
        self.inner.save_acceptance(acceptance)
    }

    fn expire_proposed_consumers(&self, cutoff: u64) -> BoxFuture<'_, credential_store::Result<usize>> {
        self.inner.expire_proposed_consumers(cutoff)
    }

    fn prune_expired(&self, now: u64) -> BoxFuture<'_, credential_store::Result<Pruned>> {
        self.inner.prune_expired(now)
    }

    fn consumer_stage_counts(
        &self,
    ) -> BoxFuture<'_, credential_store::Result<BTreeMap<Stage, usize>>> {
        self.inner.consumer_stage_counts()
    }

    fn list_consumers(&self) -> BoxFuture<'_, credential_store::Result<Vec<Consumer>>> {
        self.inner.list_consumers()
    }
}
