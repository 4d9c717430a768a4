//! Admin API
//!
//! Runs on a separate listener and is never exposed publicly. The approval
//! UI calls it once a human has agreed to let a consumer act for them.
//!
//! Endpoints:
//! - POST /admin/authorize                          record an approval, return the callback URL
//! - GET  /admin/request-tokens/{token}             consumer a pending request token belongs to
//! - GET  /admin/authorizations/{consumer}/{user}   acceptance governing a user on this wiki
//! - GET  /admin/consumers                          registered consumers and stage counts

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use credential_store::{Consumer, CredentialStore};
use oauth1::DataStore;
use oauth_server::StaticUsers;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Engine;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    engine: Arc<Engine>,
    users: Arc<StaticUsers>,
}

impl AdminState {
    pub fn new(engine: Arc<Engine>, users: Arc<StaticUsers>) -> Self {
        Self { engine, users }
    }
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/authorize", post(authorize))
        .route("/admin/request-tokens/{token}", get(request_token_owner))
        .route(
            "/admin/authorizations/{consumer_key}/{user_id}",
            get(current_authorization),
        )
        .route("/admin/consumers", get(list_consumers))
        .with_state(state)
}

fn json(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn engine_error(err: oauth_server::Error) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json(
        status,
        serde_json::json!({ "error": err.problem(), "message": err.to_string() }),
    )
}

fn unknown_user(user_id: u64) -> Response {
    json(
        StatusCode::NOT_FOUND,
        serde_json::json!({ "error": "unknown_user", "message": format!("no user with id {user_id}") }),
    )
}

#[derive(Debug, Deserialize)]
struct AuthorizeRequest {
    consumer_key: String,
    oauth_token: String,
    user_id: u64,
    #[serde(default)]
    update: bool,
}

/// POST /admin/authorize
async fn authorize(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<AuthorizeRequest>,
) -> Response {
    let Some(user) = state.users.get(body.user_id) else {
        return unknown_user(body.user_id);
    };

    match state
        .engine
        .authorize(&body.consumer_key, &body.oauth_token, user, body.update)
        .await
    {
        Ok(callback_url) => {
            info!(
                consumer_key = %body.consumer_key,
                user_id = body.user_id,
                update = body.update,
                "authorization recorded"
            );
            json(
                StatusCode::OK,
                serde_json::json!({ "callback_url": callback_url }),
            )
        }
        Err(e) => {
            warn!(
                consumer_key = %body.consumer_key,
                user_id = body.user_id,
                error = %e,
                "authorization refused"
            );
            engine_error(e)
        }
    }
}

/// GET /admin/request-tokens/{token}
async fn request_token_owner(
    State(state): State<AdminState>,
    Path(token): Path<String>,
) -> Response {
    match state.engine.consumer_key_for(&token).await {
        Ok(Some(consumer_key)) => json(
            StatusCode::OK,
            serde_json::json!({ "consumer_key": consumer_key }),
        ),
        Ok(None) => engine_error(oauth_server::Error::InvalidRequestToken),
        Err(e) => engine_error(e),
    }
}

/// GET /admin/authorizations/{consumer_key}/{user_id}
///
/// Never exposes the access secret.
async fn current_authorization(
    State(state): State<AdminState>,
    Path((consumer_key, user_id)): Path<(String, u64)>,
) -> Response {
    let Some(user) = state.users.get(user_id) else {
        return unknown_user(user_id);
    };
    let consumer = match state.engine.store().lookup_consumer(&consumer_key).await {
        Ok(Some(consumer)) => consumer,
        Ok(None) => return engine_error(oauth_server::Error::UnknownConsumer),
        Err(e) => return engine_error(e.into()),
    };

    let wiki = &state.engine.config().current_wiki;
    match state
        .engine
        .get_current_authorization(user, &consumer, wiki)
        .await
    {
        Ok(Some(acceptance)) => json(
            StatusCode::OK,
            serde_json::json!({
                "id": acceptance.id,
                "wiki": acceptance.wiki.to_string(),
                "access_token": acceptance.access_token,
                "grants": acceptance.grants,
                "accepted": acceptance.accepted,
            }),
        ),
        Ok(None) => json(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "not_authorized" }),
        ),
        Err(e) => engine_error(e),
    }
}

/// Consumer as listed by the admin API. Key material is never included.
#[derive(Debug, Serialize)]
struct ConsumerSummary {
    id: u64,
    consumer_key: String,
    name: String,
    version: String,
    owner_id: u64,
    stage: &'static str,
    wiki: String,
    grants: Vec<String>,
    callback_url: String,
    owner_only: bool,
    deleted: bool,
}

impl From<Consumer> for ConsumerSummary {
    fn from(c: Consumer) -> Self {
        Self {
            id: c.id,
            stage: c.stage.as_str(),
            wiki: c.wiki.to_string(),
            consumer_key: c.consumer_key,
            name: c.name,
            version: c.version,
            owner_id: c.user_id,
            grants: c.grants,
            callback_url: c.callback_url,
            owner_only: c.owner_only,
            deleted: c.deleted,
        }
    }
}

/// GET /admin/consumers
async fn list_consumers(State(state): State<AdminState>) -> Response {
    let store = state.engine.store();
    let listing = async {
        let consumers = store.list_consumers().await?;
        let counts = store.consumer_stage_counts().await?;
        Ok::<_, credential_store::Error>((consumers, counts))
    }
    .await;

    match listing {
        Ok((consumers, counts)) => {
            let consumers: Vec<ConsumerSummary> =
                consumers.into_iter().map(ConsumerSummary::from).collect();
            let stages: BTreeMap<&str, usize> =
                counts.into_iter().map(|(s, n)| (s.as_str(), n)).collect();
            json(
                StatusCode::OK,
                serde_json::json!({ "consumers": consumers, "stages": stages }),
            )
        }
        Err(e) => engine_error(e.into()),
    }
}
