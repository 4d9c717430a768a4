//! OAuth 1.0a provider service
//!
//! One process that:
//! 1. Loads the consumer registry and the local account directory
//! 2. Serves the three-legged handshake (`/oauth/initiate`, `/oauth/token`)
//!    and signed-call verification (`/oauth/verify`)
//! 3. Exposes an admin listener the approval UI calls once a user consents
//! 4. Expires stale proposals and prunes used nonces in the background

mod admin;
mod config;
mod error;
mod handlers;
mod metrics;

#[cfg(test)]
mod testing;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use credential_store::{CredentialStore, MemoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use oauth_server::{IdentityResolver, Server, StaticUsers, spawn_maintenance_task};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The protocol engine as deployed: backed by the in-process store.
pub type Engine = Server<MemoryStore>;

#[derive(Parser, Debug)]
#[command(name = "mwoauth-provider", version, about = "OAuth 1.0a provider for a wiki farm")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<String>,
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    /// Base URL clients sign against, without a trailing slash
    public_url: Arc<str>,
    started_at: Instant,
    requests_total: Arc<AtomicU64>,
    prometheus: PrometheusHandle,
}

impl AppState {
    fn new(engine: Arc<Engine>, public_url: &str, prometheus: PrometheusHandle) -> Self {
        Self {
            engine,
            public_url: Arc::from(public_url.trim_end_matches('/')),
            started_at: Instant::now(),
            requests_total: Arc::new(AtomicU64::new(0)),
            prometheus,
        }
    }
}

/// Build the public router.
///
/// The concurrency limit bounds requests being served at once to
/// `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route(
            "/oauth/initiate",
            get(handlers::initiate).post(handlers::initiate),
        )
        .route("/oauth/token", get(handlers::token).post(handlers::token))
        .route("/oauth/verify", get(handlers::verify).post(handlers::verify))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting mwoauth-provider");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    let cli = Cli::parse();
    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        admin_addr = %config.admin.listen_addr,
        public_url = %config.server.public_url,
        current_wiki = %config.oauth.current_wiki,
        users = config.users.len(),
        "configuration loaded"
    );
    if config.oauth.secret_key.is_none() {
        warn!("no secret key configured, token secrets are issued untransformed");
    }

    let store = match config.store.path.clone() {
        Some(path) => MemoryStore::load(path.clone(), config.store_options())
            .await
            .with_context(|| format!("failed to load registry from {}", path.display()))?,
        None => {
            warn!("no store path configured, the registry is not persisted");
            MemoryStore::in_memory(config.store_options())
        }
    };
    let store = Arc::new(store);

    let users = Arc::new(StaticUsers::new(config.users.iter().cloned()));
    let engine = Arc::new(Server::new(
        store.clone(),
        IdentityResolver::Direct(users.clone()),
        config.server_config(),
    ));

    let maintenance = spawn_maintenance_task(
        store.clone(),
        config.maintenance_interval(),
        config.expiration_age(),
    );

    let app_state = AppState::new(engine.clone(), &config.server.public_url, prometheus_handle);
    let requests_total = app_state.requests_total.clone();
    let app = build_router(app_state, config.server.max_connections);
    let admin_app = build_admin_router(AdminState::new(engine, users));

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    let admin_addr = config.admin.listen_addr;
    let admin_listener = TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("failed to bind admin listener to {admin_addr}"))?;

    info!(addr = %listen_addr, admin_addr = %admin_addr, "accepting requests");

    // Draining starts when the signal fires; DRAIN_TIMEOUT is measured from then.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let (admin_shutdown_tx, admin_shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
    });
    let admin_handle = tokio::spawn(async move {
        axum::serve(admin_listener, admin_app)
            .with_graceful_shutdown(async {
                let _ = admin_shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());
    let _ = admin_shutdown_tx.send(());
    maintenance.abort();

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        tokio::join!(server_handle, admin_handle)
    })
    .await;
    match drained {
        Ok((public, admin)) => {
            for (listener, outcome) in [("public", public), ("admin", admin)] {
                match outcome {
                    Ok(Ok(())) => info!(listener, "all in-flight requests drained"),
                    Ok(Err(e)) => error!(listener, error = %e, "server error during shutdown"),
                    Err(e) => error!(listener, error = %e, "server task panicked"),
                }
            }
        }
        Err(_) => {
            warn!(
                requests_served = requests_total.load(Ordering::Relaxed),
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: status, uptime, requests served and consumers by stage.
/// Returns 503 when the store cannot be read.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let requests = state.requests_total.load(Ordering::Relaxed);
    let wiki = &state.engine.config().current_wiki;

    let (status_code, body) = match state.engine.store().consumer_stage_counts().await {
        Ok(counts) => {
            let consumers: BTreeMap<&str, usize> =
                counts.into_iter().map(|(s, n)| (s.as_str(), n)).collect();
            (
                axum::http::StatusCode::OK,
                serde_json::json!({
                    "status": "healthy",
                    "wiki": wiki,
                    "uptime_seconds": uptime,
                    "requests_served": requests,
                    "consumers": consumers,
                }),
            )
        }
        Err(e) => {
            warn!(error = %e, "health check could not read the store");
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "degraded",
                    "wiki": wiki,
                    "uptime_seconds": uptime,
                    "requests_served": requests,
                    "error": e.to_string(),
                }),
            )
        }
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        CONSUMER_KEY, PUBLIC_URL, client_secret, get_from_peer, peer, signed_get, test_engine,
    };
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use oauth1::OAuthRequest;
    use oauth1::constants::HMAC_SHA1;
    use tower::ServiceExt;

    /// PrometheusHandle without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    async fn test_apps() -> (Router, Router) {
        let (engine, users) = test_engine().await;
        let state = AppState::new(engine.clone(), PUBLIC_URL, test_prometheus_handle());
        (
            build_router(state, 100),
            build_admin_router(AdminState::new(engine, users)),
        )
    }

    async fn body_string(response: axum::response::Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    fn form_pairs(body: &str) -> BTreeMap<String, String> {
        url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect()
    }

    /// Approve `request_token` as Alice and return the verifier.
    async fn approve(admin: &Router, request_token: &str) -> String {
        let response = admin
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/authorize")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "consumer_key": CONSUMER_KEY,
                            "oauth_token": request_token,
                            "user_id": 1,
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let callback = body_json(response).await["callback_url"]
            .as_str()
            .unwrap()
            .to_owned();
        url::Url::parse(&callback)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "oauth_verifier")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_json() {
        let (app, _) = test_apps().await;
        let response = app.oneshot(get_from_peer("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["wiki"], "testwiki");
        assert_eq!(json["requests_served"], 0);
        assert_eq!(json["consumers"]["approved"], 1);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let (app, _) = test_apps().await;
        let response = app.oneshot(get_from_peer("/metrics")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn full_handshake_then_verified_call() {
        let (app, admin) = test_apps().await;

        // Temporary credentials
        let response = app
            .clone()
            .oneshot(signed_get(
                "/oauth/initiate?oauth_callback=oob&format=json",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let issued = body_json(response).await;
        assert_eq!(issued["oauth_callback_confirmed"], true);
        let request_key = issued["key"].as_str().unwrap().to_owned();
        let request_secret = issued["secret"].as_str().unwrap().to_owned();

        let verifier = approve(&admin, &request_key).await;

        // Token credentials, form-encoded by default
        let response = app
            .clone()
            .oneshot(signed_get(
                &format!("/oauth/token?oauth_verifier={verifier}"),
                Some((&request_key, &request_secret)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/x-www-form-urlencoded"
        );
        let access = form_pairs(&body_string(response).await);
        let access_key = access["oauth_token"].clone();
        let access_secret = access["oauth_token_secret"].clone();
        assert!(!access.contains_key("oauth_callback_confirmed"));

        // A signed API call
        let response = app
            .clone()
            .oneshot(signed_get(
                "/oauth/verify",
                Some((&access_key, &access_secret)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let caller = body_json(response).await;
        assert_eq!(caller["consumer_key"], CONSUMER_KEY);
        assert_eq!(caller["user"], "Alice");
        assert_eq!(caller["wiki"], "*");
        assert_eq!(caller["grants"], serde_json::json!(["basic", "editpage"]));

        // The request token is consumed by the exchange
        let replay = app
            .oneshot(signed_get(
                &format!("/oauth/token?oauth_verifier={verifier}"),
                Some((&request_key, &request_secret)),
            ))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            form_pairs(&body_string(replay).await)["oauth_problem"],
            "token_rejected"
        );
    }

    #[tokio::test]
    async fn authorization_header_on_post_is_accepted() {
        let (app, _) = test_apps().await;

        let mut request = OAuthRequest::for_client(
            "POST",
            &format!("{PUBLIC_URL}/oauth/initiate"),
            CONSUMER_KEY,
            None,
            HMAC_SHA1,
        )
        .unwrap();
        request.set_parameter("oauth_callback", "oob");
        request.sign_hmac_sha1(&client_secret(), None).unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/oauth/initiate")
                    .header("authorization", request.to_authorization_header())
                    .extension(ConnectInfo(peer()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let issued = form_pairs(&body_string(response).await);
        assert_eq!(issued["oauth_callback_confirmed"], "true");
        assert_eq!(issued["oauth_token"].len(), 32);
    }

    #[tokio::test]
    async fn bad_signature_is_reported_as_oauth_problem() {
        let (app, _) = test_apps().await;

        let mut request = OAuthRequest::for_client(
            "GET",
            &format!("{PUBLIC_URL}/oauth/initiate?oauth_callback=oob"),
            CONSUMER_KEY,
            None,
            HMAC_SHA1,
        )
        .unwrap();
        // Raw secret instead of the one issued to the client
        request.sign_hmac_sha1("raw-consumer-secret", None).unwrap();
        let uri = request.to_url()[PUBLIC_URL.len()..].to_owned();

        let response = app.oneshot(get_from_peer(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()["content-type"],
            "application/x-www-form-urlencoded"
        );
        let problem = form_pairs(&body_string(response).await);
        assert_eq!(problem["oauth_problem"], "signature_invalid");
        assert!(problem.contains_key("oauth_problem_advice"));
    }

    #[tokio::test]
    async fn unknown_consumer_is_rejected() {
        let (app, _) = test_apps().await;
        let response = app
            .oneshot(get_from_peer(
                "/oauth/initiate?oauth_consumer_key=nobody&oauth_callback=oob",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            form_pairs(&body_string(response).await)["oauth_problem"],
            "consumer_key_unknown"
        );
    }

    #[tokio::test]
    async fn requests_are_counted_for_health() {
        let (engine, _) = test_engine().await;
        let state = AppState::new(engine, PUBLIC_URL, test_prometheus_handle());
        let app = build_router(state.clone(), 100);

        for _ in 0..3 {
            app.clone()
                .oneshot(get_from_peer("/oauth/initiate"))
                .await
                .unwrap();
        }
        assert_eq!(state.requests_total.load(Ordering::Relaxed), 3);
    }
}
