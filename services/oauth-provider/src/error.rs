//! OAuth error responses
//!
//! Engine failures are reported the way OAuth 1.0a clients expect: a
//! form-encoded `oauth_problem` / `oauth_problem_advice` body with the
//! status the engine assigns.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An engine error on its way to the wire.
#[derive(Debug)]
pub struct ProblemResponse(pub oauth_server::Error);

impl From<oauth_server::Error> for ProblemResponse {
    fn from(err: oauth_server::Error) -> Self {
        Self(err)
    }
}

impl ProblemResponse {
    pub fn problem(&self) -> &'static str {
        self.0.problem()
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("oauth_problem", self.problem())
            .append_pair("oauth_problem_advice", &self.0.to_string())
            .finish()
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, FORM_CONTENT_TYPE)],
            self.body(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oauth_server::Error;

    fn parse(body: &str) -> Vec<(String, String)> {
        url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect()
    }

    #[test]
    fn body_carries_problem_and_advice() {
        let response = ProblemResponse(Error::NonceReused);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            parse(&response.body()),
            vec![
                ("oauth_problem".to_string(), "nonce_used".to_string()),
                ("oauth_problem_advice".to_string(), "nonce already used".to_string()),
            ]
        );
    }

    #[test]
    fn statuses_follow_the_engine() {
        let cases = [
            (Error::UnsupportedVersion("2.0".into()), StatusCode::BAD_REQUEST),
            (Error::OwnerOnlyConsumer, StatusCode::FORBIDDEN),
            (Error::CorruptToken, StatusCode::INTERNAL_SERVER_ERROR),
            (
                Error::StoreUnavailable("disk full".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ProblemResponse(err).status(), status);
        }
    }

    #[tokio::test]
    async fn into_response_is_form_encoded() {
        let response = ProblemResponse(Error::InvalidSignature).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            FORM_CONTENT_TYPE
        );
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with("oauth_problem=signature_invalid&"));
    }
}
