//! Auth-related types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export shared types for convenience
pub use shared_types::Identity;

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity id)
    pub sub: String,
    pub email: String,
    pub iss: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Random per-token id
    pub jti: String,
}

/// A freshly minted session token.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub subject_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Identity established by the session middleware for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub subject_id: Uuid,
    pub email: String,
}

/// Local password material. Never serialized.
#[derive(Clone)]
pub struct Credential {
    pub identity_id: Uuid,
    /// PHC-format Argon2id hash
    pub password_hash: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("identity_id", &self.identity_id)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binding between an identity and an external provider account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialLink {
    pub identity_id: Uuid,
    pub provider: OAuthProvider,
    pub subject: String,
}

/// Profile returned by the provider's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}
