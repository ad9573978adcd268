use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of an account. Never carries password material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "validate", derive(validator::Validate))]
pub struct RegisterRequest {
    #[cfg_attr(feature = "validate", validate(length(min = 2, max = 100)))]
    pub name: String,
    #[cfg_attr(feature = "validate", validate(email))]
    pub email: String,
    #[cfg_attr(feature = "validate", validate(length(min = 8, max = 128)))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "validate", derive(validator::Validate))]
pub struct LoginRequest {
    #[cfg_attr(feature = "validate", validate(email))]
    pub email: String,
    #[cfg_attr(feature = "validate", validate(length(min = 1)))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Returned when starting an OAuth login; the client should navigate to
/// `redirect_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginInitResponse {
    pub redirect_url: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "validate", derive(validator::Validate))]
pub struct OAuthCallbackRequest {
    #[cfg_attr(feature = "validate", validate(length(min = 1)))]
    pub code: String,
    #[cfg_attr(feature = "validate", validate(length(min = 1)))]
    pub state: String,
    #[cfg_attr(feature = "validate", validate(length(min = 1)))]
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCallbackResponse {
    pub user: Identity,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "validate", derive(validator::Validate))]
pub struct UpdateProfileRequest {
    #[cfg_attr(feature = "validate", validate(length(min = 2, max = 100)))]
    pub name: Option<String>,
    #[cfg_attr(feature = "validate", validate(url))]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "validate", derive(validator::Validate))]
pub struct ChangePasswordRequest {
    #[cfg_attr(feature = "validate", validate(length(min = 1)))]
    pub current_password: String,
    #[cfg_attr(feature = "validate", validate(length(min = 8, max = 128)))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}
