//! Session middleware layer for protecting routes, plus cookie helpers.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cookie::{time::Duration, Cookie, SameSite};

use super::csrf::{CSRF_COOKIE_NAME, CSRF_TOKEN_TTL_SECS};
use super::jwt::{TokenService, SESSION_TTL_HOURS};
use super::types::AuthenticatedIdentity;
use crate::error::ApiError;
use crate::AppState;

pub const SESSION_COOKIE_NAME: &str = "ecolink_token";
pub const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";

const OAUTH_STATE_TTL_SECS: i64 = 10 * 60;

/// Middleware function that requires a valid session.
///
/// Use with `axum::middleware::from_fn_with_state`. On success the
/// [`AuthenticatedIdentity`] is attached to the request for handlers to
/// extract; it is not re-validated downstream.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(request.headers(), &state.tokens) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Validate the session carried by a request.
///
/// The cookie wins over an `Authorization: Bearer` header.
pub fn authenticate(
    headers: &HeaderMap,
    tokens: &TokenService,
) -> Result<AuthenticatedIdentity, ApiError> {
    let token = extract_cookie(headers, SESSION_COOKIE_NAME)
        .filter(|t| !t.is_empty())
        .or_else(|| extract_bearer(headers))
        .ok_or_else(|| ApiError::auth("Missing authentication"))?;

    let claims = tokens.validate(&token).map_err(|e| {
        tracing::debug!("Rejected session token: {}", e);
        ApiError::auth("Invalid or expired token")
    })?;

    Ok(AuthenticatedIdentity {
        subject_id: claims.subject_id,
        email: claims.email,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .ok_or_else(|| ApiError::auth("Missing authentication"))
    }
}

pub(crate) fn extract_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Cookie attributes for one response.
///
/// Over TLS cookies are `Secure` and `SameSite=Strict`; otherwise `Lax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    secure: bool,
}

impl CookiePolicy {
    /// TLS is detected from `X-Forwarded-Proto` since TLS terminates upstream.
    pub fn for_request(headers: &HeaderMap, force_secure: bool) -> Self {
        let forwarded_tls = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
            .unwrap_or(false);
        Self {
            secure: force_secure || forwarded_tls,
        }
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    fn same_site(&self) -> SameSite {
        if self.secure {
            SameSite::Strict
        } else {
            SameSite::Lax
        }
    }

    fn build(&self, name: &'static str, value: String, max_age: Duration, http_only: bool) -> String {
        Cookie::build((name, value))
            .path("/")
            .http_only(http_only)
            .secure(self.secure)
            .same_site(self.same_site())
            .max_age(max_age)
            .build()
            .to_string()
    }

    pub fn session(&self, token: &str) -> String {
        self.build(
            SESSION_COOKIE_NAME,
            token.to_string(),
            Duration::hours(SESSION_TTL_HOURS),
            true,
        )
    }

    pub fn oauth_state(&self, state: &str) -> String {
        self.build(
            OAUTH_STATE_COOKIE_NAME,
            state.to_string(),
            Duration::seconds(OAUTH_STATE_TTL_SECS),
            true,
        )
    }

    /// Readable by scripts so the client can copy it into the header.
    pub fn csrf(&self, token: &str) -> String {
        self.build(
            CSRF_COOKIE_NAME,
            token.to_string(),
            Duration::seconds(CSRF_TOKEN_TTL_SECS),
            false,
        )
    }

    pub fn clear(&self, name: &'static str) -> String {
        self.build(name, String::new(), Duration::ZERO, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tokens() -> TokenService {
        TokenService::new(b"middleware-test-secret-32-bytes-long", "ecolink-test")
    }

    #[test]
    fn test_extract_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; ecolink_token=abc.def.ghi; csrf_token=xyz"
                .parse()
                .unwrap(),
        );
        assert_eq!(
            extract_cookie(&headers, SESSION_COOKIE_NAME).as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(extract_cookie(&headers, CSRF_COOKIE_NAME).as_deref(), Some("xyz"));
        assert_eq!(extract_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_preferred_over_bearer() {
        let tokens = tokens();
        let cookie_user = Uuid::new_v4();
        let header_user = Uuid::new_v4();
        let cookie_token = tokens.issue(cookie_user, "cookie@example.com").unwrap();
        let header_token = tokens.issue(header_user, "header@example.com").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("{}={}", SESSION_COOKIE_NAME, cookie_token.token)
                .parse()
                .unwrap(),
        );
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", header_token.token).parse().unwrap(),
        );

        let identity = authenticate(&headers, &tokens).unwrap();
        assert_eq!(identity.subject_id, cookie_user);

        headers.remove(header::COOKIE);
        let identity = authenticate(&headers, &tokens).unwrap();
        assert_eq!(identity.subject_id, header_user);
        assert_eq!(identity.email, "header@example.com");
    }

    #[test]
    fn test_missing_or_invalid_token_rejected() {
        let tokens = tokens();
        let err = authenticate(&HeaderMap::new(), &tokens).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer not-a-jwt".parse().unwrap());
        let err = authenticate(&headers, &tokens).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(authenticate(&headers, &tokens).is_err());
    }

    #[test]
    fn test_cookie_policy_plain_http() {
        let policy = CookiePolicy::for_request(&HeaderMap::new(), false);
        let cookie = policy.session("tok");
        assert!(cookie.starts_with("ecolink_token=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));
        assert!(cookie.contains("Max-Age=86400"));
    }

    #[test]
    fn test_cookie_policy_tls() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        let policy = CookiePolicy::for_request(&headers, false);
        assert!(policy.is_secure());

        let cookie = policy.oauth_state("st");
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=600"));

        assert!(CookiePolicy::for_request(&HeaderMap::new(), true).is_secure());
    }

    #[test]
    fn test_csrf_cookie_readable_by_scripts() {
        let cookie = CookiePolicy::for_request(&HeaderMap::new(), false).csrf("t");
        assert!(cookie.starts_with("csrf_token=t"));
        assert!(!cookie.contains("HttpOnly"));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = CookiePolicy::for_request(&HeaderMap::new(), false).clear(SESSION_COOKIE_NAME);
        assert!(cookie.starts_with("ecolink_token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
