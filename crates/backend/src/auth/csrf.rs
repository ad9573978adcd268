//! Double-submit CSRF protection.
//!
//! A random token is handed to the client twice: as a cookie the browser
//! attaches automatically, and in a response body the client script echoes
//! back in the `X-CSRF-Token` header. A cross-site page can make the browser
//! send the cookie but cannot read it, so it cannot produce the header.

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::middleware::extract_cookie;
use super::{constant_time_eq, random_urlsafe};
use crate::error::ApiError;

pub const CSRF_COOKIE_NAME: &str = "csrf_token";
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";
pub const CSRF_TOKEN_TTL_SECS: i64 = 60 * 60;

const CSRF_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfViolation {
    MissingCookie,
    MissingHeader,
    Mismatch,
}

impl CsrfViolation {
    fn message(&self) -> &'static str {
        match self {
            CsrfViolation::MissingCookie => "CSRF token missing",
            CsrfViolation::MissingHeader => "CSRF token required in header",
            CsrfViolation::Mismatch => "CSRF token mismatch",
        }
    }
}

pub fn generate_csrf_token() -> String {
    random_urlsafe(CSRF_TOKEN_BYTES)
}

/// Methods that must not change state and therefore skip the check.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Check cookie and header tokens for a request.
pub fn verify(method: &Method, headers: &HeaderMap) -> Result<(), CsrfViolation> {
    if is_safe_method(method) {
        return Ok(());
    }

    let cookie_token = extract_cookie(headers, CSRF_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .ok_or(CsrfViolation::MissingCookie)?;
    let header_token = headers
        .get(CSRF_HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or(CsrfViolation::MissingHeader)?;

    if !constant_time_eq(&cookie_token, header_token) {
        return Err(CsrfViolation::Mismatch);
    }
    Ok(())
}

/// Middleware rejecting mutating requests without a matching token pair.
///
/// Use with `axum::middleware::from_fn`.
pub async fn require_csrf(request: Request<Body>, next: Next) -> Response {
    if let Err(violation) = verify(request.method(), request.headers()) {
        tracing::warn!(
            "CSRF check failed for {} {}: {:?}",
            request.method(),
            request.uri().path(),
            violation
        );
        return ApiError::forbidden(violation.message()).into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Router};
    use tower::ServiceExt;

    fn headers(cookie: Option<&str>, header: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(c) = cookie {
            map.insert(
                axum::http::header::COOKIE,
                format!("other=1; {}={}", CSRF_COOKIE_NAME, c).parse().unwrap(),
            );
        }
        if let Some(h) = header {
            map.insert(CSRF_HEADER_NAME, h.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_safe_methods_always_pass() {
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert_eq!(verify(&method, &HeaderMap::new()), Ok(()));
            assert_eq!(verify(&method, &headers(Some("a"), Some("b"))), Ok(()));
        }
    }

    #[test]
    fn test_mutating_methods_need_matching_pair() {
        let token = generate_csrf_token();
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert_eq!(verify(&method, &headers(Some(&token), Some(&token))), Ok(()));
            assert_eq!(
                verify(&method, &headers(None, Some(&token))),
                Err(CsrfViolation::MissingCookie)
            );
            assert_eq!(
                verify(&method, &headers(Some(&token), None)),
                Err(CsrfViolation::MissingHeader)
            );
            assert_eq!(
                verify(&method, &headers(Some(&token), Some("forged"))),
                Err(CsrfViolation::Mismatch)
            );
        }
    }

    #[test]
    fn test_empty_values_count_as_missing() {
        assert_eq!(
            verify(&Method::POST, &headers(Some(""), Some(""))),
            Err(CsrfViolation::MissingCookie)
        );
    }

    #[tokio::test]
    async fn test_middleware_rejects_before_handler() {
        let app = Router::new()
            .route("/test", post(|| async { "ok" }).get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(require_csrf));

        let rejected = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

        let read = app
            .clone()
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(read.status(), StatusCode::OK);

        let token = generate_csrf_token();
        let accepted = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/test")
                    .header("cookie", format!("{}={}", CSRF_COOKIE_NAME, token))
                    .header(CSRF_HEADER_NAME, &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(accepted.status(), StatusCode::OK);
    }
}
