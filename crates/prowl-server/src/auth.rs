use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use prowl_core::room::UserId;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the caller's resolved user id. The identity layer in
/// front of this server is responsible for setting it.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Longest accepted user id.
const MAX_USER_ID_LEN: usize = 128;

/// Authentication configuration for the REST API.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Bearer token for REST API access. None = auth disabled.
    pub bearer_token: Option<String>,
}

/// Axum middleware that validates Bearer token authentication.
/// If no token is configured, all requests are allowed through.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = &state.auth.bearer_token
        && !bearer_matches(request.headers(), expected)
    {
        return Err(AppError::Unauthorized(
            "missing or invalid bearer token".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

/// The calling user, taken from the `x-user-id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        if value.len() > MAX_USER_ID_LEN {
            return Err(AppError::BadRequest(format!(
                "{USER_ID_HEADER} exceeds {MAX_USER_ID_LEN} chars"
            )));
        }
        Ok(Self(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_must_match_exactly() {
        let mut headers = HeaderMap::new();
        assert!(!bearer_matches(&headers, "secret"));

        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        assert!(bearer_matches(&headers, "secret"));
        assert!(!bearer_matches(&headers, "other"));

        headers.insert("authorization", HeaderValue::from_static("secret"));
        assert!(!bearer_matches(&headers, "secret"));
    }

    #[tokio::test]
    async fn caller_id_reads_header() {
        let request = axum::http::Request::builder()
            .header(USER_ID_HEADER, "  alice ")
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();
        let caller = CallerId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller, CallerId("alice".to_string()));
    }

    #[tokio::test]
    async fn caller_id_missing_is_unauthorized() {
        let request = axum::http::Request::builder().body(()).unwrap();
        let (mut parts, ()) = request.into_parts();
        let err = CallerId::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
