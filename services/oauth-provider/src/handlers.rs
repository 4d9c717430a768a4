//! Wire protocol endpoints
//!
//! `/oauth/initiate`, `/oauth/token` and `/oauth/verify` accept GET and
//! POST. Protocol parameters may arrive in the query string, a form body
//! or an `Authorization: OAuth` header. The URL the client signed is
//! rebuilt from the configured public base URL, since the listener
//! usually sits behind a proxy that rewrites scheme and host.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use credential_store::CredentialStore;
use oauth1::{OAuthRequest, TokenKind};
use oauth_server::{Audience, CentralUserName, IssuedCredentials};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::AppState;
use crate::error::{FORM_CONTENT_TYPE, ProblemResponse};

type HandlerResult = std::result::Result<Response, ProblemResponse>;

/// Who made a verified call, returned by `/oauth/verify`.
#[derive(Debug, Serialize)]
struct VerifiedCaller {
    consumer_key: String,
    /// Absent when the account is hidden or no longer exists
    user: Option<String>,
    wiki: String,
    grants: Vec<String>,
}

#[instrument(skip_all, fields(endpoint = "initiate", request_id = %request_id()))]
pub async fn initiate(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let result: HandlerResult = async {
        let request = parse_request(&state, peer, &method, &uri, &headers, &body)?;
        let issued = state.engine.fetch_request_token(&request).await?;
        Ok(credentials_response(&request, &issued))
    }
    .await;
    finish(&state, "initiate", started, result)
}

#[instrument(skip_all, fields(endpoint = "token", request_id = %request_id()))]
pub async fn token(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let result: HandlerResult = async {
        let request = parse_request(&state, peer, &method, &uri, &headers, &body)?;
        let issued = state.engine.fetch_access_token(&request).await?;
        Ok(credentials_response(&request, &issued))
    }
    .await;
    finish(&state, "token", started, result)
}

#[instrument(skip_all, fields(endpoint = "verify", request_id = %request_id()))]
pub async fn verify(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let result: HandlerResult = async {
        let request = parse_request(&state, peer, &method, &uri, &headers, &body)?;
        let (consumer, token) = state.engine.verify_request(&request).await?;

        // Grants are read from the acceptance as it is now, so an updated
        // authorization applies to the very next call.
        let acceptance = state
            .engine
            .store()
            .lookup_acceptance_by_token(consumer.id, &token.key)
            .await
            .map_err(oauth_server::Error::from)?
            .ok_or(oauth_server::Error::TokenNotFound(TokenKind::Access))?;

        let user = match state
            .engine
            .identity()
            .central_user_name_from_id(acceptance.user_id, Audience::Public)
            .await
        {
            CentralUserName::Name(name) => Some(name),
            CentralUserName::Hidden | CentralUserName::NotFound => None,
        };
        debug!(consumer_key = %consumer.consumer_key, "verified signed request");

        let caller = VerifiedCaller {
            consumer_key: consumer.consumer_key,
            user,
            wiki: acceptance.wiki.to_string(),
            grants: acceptance.grants,
        };
        Ok(json_response(StatusCode::OK, &caller))
    }
    .await;
    finish(&state, "verify", started, result)
}

fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// Rebuild the request as the client signed it.
fn parse_request(
    state: &AppState,
    peer: SocketAddr,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> std::result::Result<OAuthRequest, ProblemResponse> {
    let url = signed_url(&state.public_url, uri);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let form_body = form_body(headers, body)?;

    OAuthRequest::from_parts(method.as_str(), &url, authorization, form_body, peer.ip())
        .map_err(|e| ProblemResponse(e.into()))
}

fn signed_url(public_url: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}{path_and_query}", public_url.trim_end_matches('/'))
}

/// Body parameters count only for form-encoded bodies.
fn form_body<'a>(
    headers: &HeaderMap,
    body: &'a [u8],
) -> std::result::Result<Option<&'a str>, ProblemResponse> {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));
    if !is_form || body.is_empty() {
        return Ok(None);
    }
    std::str::from_utf8(body).map(Some).map_err(|_| {
        ProblemResponse(oauth_server::Error::MalformedRequest(
            "form body is not valid UTF-8".into(),
        ))
    })
}

fn wants_json(request: &OAuthRequest) -> bool {
    request.get_parameter("format") == Some("json")
}

fn credentials_response(request: &OAuthRequest, issued: &IssuedCredentials) -> Response {
    if wants_json(request) {
        json_response(StatusCode::OK, issued)
    } else {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, FORM_CONTENT_TYPE)],
            issued.to_form(),
        )
            .into_response()
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Count, time and log the outcome of one protocol request.
fn finish(
    state: &AppState,
    endpoint: &'static str,
    started: Instant,
    result: HandlerResult,
) -> Response {
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(response) => {
            crate::metrics::record_request(endpoint, "ok", elapsed);
            response
        }
        Err(problem) => {
            let code = problem.problem();
            crate::metrics::record_request(endpoint, code, elapsed);
            crate::metrics::record_error(code);
            if problem.status().is_server_error() {
                error!(endpoint, problem = code, error = %problem.0, "request failed");
            } else {
                info!(endpoint, problem = code, error = %problem.0, "request refused");
            }
            problem.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_url_joins_public_base_and_path() {
        let uri: Uri = "/oauth/initiate?oauth_callback=oob&format=json".parse().unwrap();
        assert_eq!(
            signed_url("https://wiki.example.org/", &uri),
            "https://wiki.example.org/oauth/initiate?oauth_callback=oob&format=json"
        );
        let bare: Uri = "/oauth/token".parse().unwrap();
        assert_eq!(
            signed_url("https://wiki.example.org", &bare),
            "https://wiki.example.org/oauth/token"
        );
    }

    #[test]
    fn form_body_requires_form_content_type() {
        let mut headers = HeaderMap::new();
        assert!(form_body(&headers, b"a=1").unwrap().is_none());

        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(form_body(&headers, b"a=1").unwrap().is_none());

        headers.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=utf-8".parse().unwrap(),
        );
        assert_eq!(form_body(&headers, b"a=1").unwrap(), Some("a=1"));
    }

    #[test]
    fn request_ids_are_unique() {
        let id = request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 4 + 32);
        assert_ne!(id, request_id());
    }

    #[test]
    fn form_body_rejects_invalid_utf8() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, FORM_CONTENT_TYPE.parse().unwrap());
        let err = form_body(&headers, &[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.problem(), "parameter_rejected");
    }
}
