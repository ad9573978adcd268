//! EcoLink authentication backend.
//!
//! Local accounts, Google sign-in, JWT sessions carried in httpOnly cookies
//! and double-submit CSRF protection, served over axum.

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use shared_types::HealthResponse;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod config;
pub mod error;

use auth::jwt::TokenService;
use auth::service::AuthService;
use auth::store::CredentialStore;
use config::AuthConfig;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(config: AuthConfig, store: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        config.validate()?;
        let tokens = Arc::new(TokenService::from_config(&config));
        let auth = Arc::new(AuthService::new(&config, store, tokens.clone())?);
        Ok(Self {
            auth,
            tokens,
            config: Arc::new(config),
        })
    }
}

/// Build the full application router.
pub fn create_app(state: AppState) -> Router {
    // Session first, then CSRF; the guard ignores safe methods.
    let session_routes = Router::new()
        .route("/me", get(auth::auth_me).put(auth::auth_update_me))
        .route("/me/password", post(auth::auth_change_password))
        .route("/csrf-token", get(auth::auth_csrf_token))
        .route_layer(from_fn(auth::require_csrf))
        .route_layer(from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(auth::auth_register))
        .route("/auth/login", post(auth::auth_login))
        .route("/auth/google", get(auth::google_login))
        .route("/auth/google/callback", post(auth::auth_callback))
        .route("/auth/logout", post(auth::auth_logout))
        .nest("/api/v1", session_routes)
        .layer(build_cors_layer(&state.config.frontend_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ecolink".to_string(),
    })
}

/// CORS for the frontend origin only, with credentials.
fn build_cors_layer(frontend_url: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = frontend_url
        .split(',')
        .filter_map(|s| s.trim().trim_end_matches('/').parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("FRONTEND_URL is not a valid origin, cross-origin requests will be refused");
    } else {
        tracing::info!("CORS configured for origins: {:?}", origins);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(auth::CSRF_HEADER_NAME),
        ])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::store::InMemoryCredentialStore;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let store = Arc::new(InMemoryCredentialStore::spawn());
        create_app(AppState::new(config::test_config(), store).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.service, "ecolink");
    }

    #[tokio::test]
    async fn test_cors_preflight_for_frontend_origin() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/auth/login")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            headers.get("access-control-allow-credentials").unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_unknown_origin_not_allowed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://evil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }

    #[tokio::test]
    async fn test_session_routes_require_auth_before_csrf() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/v1/me")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Ana"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config::test_config();
        config.jwt_secret = "short".to_string();
        let store = tokio_test::block_on(async { Arc::new(InMemoryCredentialStore::spawn()) });
        assert!(AppState::new(config, store).is_err());
    }
}
