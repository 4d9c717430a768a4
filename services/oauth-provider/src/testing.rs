//! Shared fixtures for router tests

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use common::Secret;
use credential_store::{Consumer, MemoryStore, Restrictions, Stage, StoreOptions, WikiScope};
use oauth1::OAuthRequest;
use oauth1::constants::HMAC_SHA1;
use oauth_server::{IdentityResolver, SecretTransform, Server, ServerConfig, StaticUsers, User};

use crate::Engine;

pub const PUBLIC_URL: &str = "https://wiki.example.org";
pub const CONSUMER_KEY: &str = "test-consumer";
pub const CONSUMER_SECRET: &str = "raw-consumer-secret";
pub const SERVER_KEY: &str = "server-key";

fn user(id: u64, name: &str) -> User {
    User {
        id,
        name: name.to_owned(),
        locked: false,
        blocked: false,
        hidden: false,
        can_view_hidden: false,
    }
}

fn consumer() -> Consumer {
    Consumer {
        id: 1,
        consumer_key: CONSUMER_KEY.into(),
        name: "Test app".into(),
        user_id: 100,
        version: "1.0".into(),
        email: "owner@example.org".into(),
        description: "router fixture".into(),
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

/// Engine over an in-memory store with one approved wildcard consumer and
/// users 1 (Alice), 2 (Bob) and the owner 100.
pub async fn test_engine() -> (Arc<Engine>, Arc<StaticUsers>) {
    let store = Arc::new(MemoryStore::in_memory(StoreOptions::default()));
    store.add_consumer(consumer()).await.unwrap();
    let users = Arc::new(StaticUsers::new([
        user(1, "Alice"),
        user(2, "Bob"),
        user(100, "App Owner"),
    ]));
    let config = ServerConfig {
        current_wiki: "testwiki".into(),
        central_wiki: "testwiki".into(),
        secret_key: Some(Secret::from(SERVER_KEY)),
        block_disables_login: true,
        timestamp_threshold: 300,
        user_talk_url: format!("{PUBLIC_URL}/wiki/User_talk:{{user}}"),
    };
    let engine = Server::new(store, IdentityResolver::Direct(users.clone()), config);
    (Arc::new(engine), users)
}

/// Consumer secret as the client holds it.
pub fn client_secret() -> String {
    SecretTransform::new(Some(Secret::from(SERVER_KEY)))
        .apply(CONSUMER_SECRET)
        .unwrap()
}

/// Signed GET for `path_and_query`, as an HTTP request from a local peer.
pub fn signed_get(path_and_query: &str, token: Option<(&str, &str)>) -> Request<Body> {
    let mut request = OAuthRequest::for_client(
        "GET",
        &format!("{PUBLIC_URL}{path_and_query}"),
        CONSUMER_KEY,
        token.map(|(key, _)| key),
        HMAC_SHA1,
    )
    .unwrap();
    request.sign_hmac_sha1(&client_secret(), token.map(|(_, secret)| secret)).unwrap();
    get_from_peer(&request.to_url()[PUBLIC_URL.len()..])
}

pub fn get_from_peer(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .extension(ConnectInfo(peer()))
        .body(Body::empty())
        .unwrap()
}

pub fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}
