//! Authentication HTTP handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use shared_types::{
    ChangePasswordRequest, CsrfTokenResponse, Identity, LoginInitResponse, LoginRequest,
    LoginResponse, MessageResponse, OAuthCallbackRequest, OAuthCallbackResponse, RegisterRequest,
    RegisterResponse, UpdateProfileRequest,
};
use validator::Validate;

use super::csrf::generate_csrf_token;
use super::middleware::{extract_cookie, CookiePolicy, OAUTH_STATE_COOKIE_NAME, SESSION_COOKIE_NAME};
use super::service::OAuthCallback;
use super::types::{AuthenticatedIdentity, SessionToken};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Unwrap a JSON body and run its field validation.
fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    let Json(body) = payload.map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        ApiError::validation("Invalid request body")
    })?;
    body.validate()?;
    Ok(body)
}

fn cookie_policy(state: &AppState, headers: &HeaderMap) -> CookiePolicy {
    CookiePolicy::for_request(headers, state.config.cookie_secure)
}

/// Register a local account.
pub async fn auth_register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let req = validated(payload)?;
    let user = state
        .auth
        .register(&req.name, &req.email, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user,
        }),
    ))
}

/// Log in with email and password. The session token travels only in the
/// httpOnly cookie.
pub async fn auth_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = validated(payload)?;
    let session = state.auth.login(&req.email, &req.password).await?;
    let cookie = cookie_policy(&state, &headers).session(&session.token);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            message: "Login successful".to_string(),
            expires_at: session.expires_at,
        }),
    )
        .into_response())
}

/// Start the Google OAuth flow.
///
/// Returns the URL the frontend should send the browser to, and stores the
/// state in a short-lived cookie for the callback to compare against.
pub async fn google_login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let start = state.auth.begin_google_login();
    let cookie = cookie_policy(&state, &headers).oauth_state(&start.state);

    (
        [(header::SET_COOKIE, cookie)],
        Json(LoginInitResponse {
            redirect_url: start.redirect_url,
            state: start.state,
        }),
    )
        .into_response()
}

/// Complete the Google OAuth flow with the code and state the provider
/// returned to the frontend.
///
/// The state cookie is cleared on every outcome, so a state value is good
/// for one callback only.
pub async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<OAuthCallbackRequest>, JsonRejection>,
) -> Response {
    let policy = cookie_policy(&state, &headers);
    let clear_state = policy.clear(OAUTH_STATE_COOKIE_NAME);

    match complete_callback(&state, &headers, payload).await {
        Ok((user, session)) => (
            AppendHeaders([
                (header::SET_COOKIE, policy.session(&session.token)),
                (header::SET_COOKIE, clear_state),
            ]),
            Json(OAuthCallbackResponse {
                user,
                expires_at: session.expires_at,
            }),
        )
            .into_response(),
        Err(err) => (AppendHeaders([(header::SET_COOKIE, clear_state)]), err).into_response(),
    }
}

async fn complete_callback(
    state: &AppState,
    headers: &HeaderMap,
    payload: Result<Json<OAuthCallbackRequest>, JsonRejection>,
) -> ApiResult<(Identity, SessionToken)> {
    let req = validated(payload)?;
    let stored_state = extract_cookie(headers, OAUTH_STATE_COOKIE_NAME);

    // Detached so a client disconnect cannot abandon a half-finished code
    // exchange; the code is single-use.
    let auth = state.auth.clone();
    let outcome = tokio::spawn(async move {
        auth.complete_google_login(OAuthCallback {
            code: &req.code,
            state: &req.state,
            redirect_uri: &req.redirect_uri,
            stored_state: stored_state.as_deref(),
        })
        .await
    })
    .await
    .map_err(|e| anyhow::anyhow!("OAuth callback task failed: {}", e))??;

    Ok(outcome)
}

/// Get the current authenticated user.
pub async fn auth_me(
    State(state): State<AppState>,
    identity: AuthenticatedIdentity,
) -> ApiResult<Json<Identity>> {
    let user = state.auth.current_user(identity.subject_id).await?;
    Ok(Json(user))
}

/// Update name and picture of the current user.
pub async fn auth_update_me(
    State(state): State<AppState>,
    identity: AuthenticatedIdentity,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ApiResult<Json<Identity>> {
    let req = validated(payload)?;
    let user = state
        .auth
        .update_profile(identity.subject_id, req.name, req.picture)
        .await?;
    Ok(Json(user))
}

pub async fn auth_change_password(
    State(state): State<AppState>,
    identity: AuthenticatedIdentity,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let req = validated(payload)?;
    state
        .auth
        .change_password(identity.subject_id, &req.current_password, &req.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// Issue a CSRF token as both a cookie and a body value.
pub async fn auth_csrf_token(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = generate_csrf_token();
    let cookie = cookie_policy(&state, &headers).csrf(&token);

    (
        [(header::SET_COOKIE, cookie)],
        Json(CsrfTokenResponse { csrf_token: token }),
    )
        .into_response()
}

/// Logout - clear the session cookie. Issued tokens stay valid until expiry.
pub async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie = cookie_policy(&state, &headers).clear(SESSION_COOKIE_NAME);
    (
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse::new("Logged out successfully")),
    )
        .into_response()
}
