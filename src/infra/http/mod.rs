//! axum routers for the public and administrative listeners.

mod admin;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use public::{HttpState, build_router};

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::domain::types::AuthId;

/// Header carrying the single-sign-on identity, set by the upstream auth layer.
pub const AUTH_ID_HEADER: &str = "x-auth-id";

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

fn identity(headers: &HeaderMap) -> Option<AuthId> {
    AuthId::parse(
        headers
            .get(AUTH_ID_HEADER)
            .and_then(|value| value.to_str().ok()),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn identity_ignores_blank_header() {
        let mut headers = HeaderMap::new();
        assert!(identity(&headers).is_none());

        headers.insert(AUTH_ID_HEADER, HeaderValue::from_static("  "));
        assert!(identity(&headers).is_none());

        headers.insert(AUTH_ID_HEADER, HeaderValue::from_static("user-7"));
        assert_eq!(
            identity(&headers).as_ref().map(AuthId::as_str),
            Some("user-7")
        );
    }
}
