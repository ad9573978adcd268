//! Authentication use cases: local registration and login, Google login,
//! and the account operations that sit behind a session.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::google::{GoogleClient, ProviderError};
use super::jwt::{TokenError, TokenService};
use super::password::Passwords;
use super::store::{ConflictKind, CredentialStore, StoreError};
use super::types::{Credential, Identity, OAuthProvider, ProviderProfile, SessionToken, SocialLink};
use super::{constant_time_eq, random_urlsafe};
use crate::config::AuthConfig;
use crate::error::ApiError;

const OAUTH_STATE_BYTES: usize = 32;

/// Progress of an OAuth callback. Errors record the stage that was being
/// attempted when they occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    Received,
    StateValidated,
    CodeExchanged,
    UserInfoFetched,
    AccountResolved,
    TokenIssued,
}

impl std::fmt::Display for CallbackStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallbackStage::Received => "received",
            CallbackStage::StateValidated => "state validation",
            CallbackStage::CodeExchanged => "code exchange",
            CallbackStage::UserInfoFetched => "user info fetch",
            CallbackStage::AccountResolved => "account resolution",
            CallbackStage::TokenIssued => "token issuance",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("user already exists")]
    AlreadyExists,

    /// Covers unknown email, wrong password and password-less accounts alike.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("OAuth state missing or mismatched")]
    StateMismatch,

    #[error("OAuth provider failure during {stage}: {source}")]
    Provider {
        stage: CallbackStage,
        #[source]
        source: ProviderError,
    },

    #[error("account conflict: {0}")]
    Conflict(ConflictKind),

    #[error("identity not found")]
    NotFound,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("credential store failure: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// True when the caller (bad input, bad code or state) caused the failure
    /// rather than us or the provider.
    pub fn is_client_caused(&self) -> bool {
        match self {
            AuthError::InvalidInput(_)
            | AuthError::AlreadyExists
            | AuthError::InvalidCredentials
            | AuthError::StateMismatch
            | AuthError::Conflict(_)
            | AuthError::NotFound => true,
            AuthError::Provider { source, .. } => source.is_client_caused(),
            AuthError::Token(_) | AuthError::Store(_) | AuthError::Internal(_) => false,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Conflict(kind) => AuthError::Conflict(kind),
            StoreError::Unavailable => AuthError::Store(err),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput(msg) => ApiError::Validation(msg),
            AuthError::AlreadyExists => ApiError::Conflict("user already exists".to_string()),
            AuthError::InvalidCredentials => ApiError::auth("invalid credentials"),
            AuthError::StateMismatch => ApiError::bad_state("Invalid state parameter"),
            AuthError::Provider { stage, source } => {
                if source.is_client_caused() {
                    tracing::warn!("OAuth {} rejected by provider: {}", stage, source);
                } else {
                    tracing::error!("OAuth {} failed upstream: {}", stage, source);
                }
                ApiError::auth("OAuth authentication failed")
            }
            AuthError::Conflict(kind) => ApiError::Conflict(kind.to_string()),
            AuthError::NotFound => ApiError::not_found("User"),
            AuthError::Token(e) => ApiError::Internal(anyhow::Error::new(e)),
            AuthError::Store(e) => ApiError::Internal(anyhow::Error::new(e)),
            AuthError::Internal(e) => ApiError::Internal(e),
        }
    }
}

/// Where to send the browser, and the state value the client must keep.
#[derive(Debug, Clone)]
pub struct OAuthStart {
    pub redirect_url: String,
    pub state: String,
}

/// What the provider echoed back, plus the state the client stored.
#[derive(Debug, Clone)]
pub struct OAuthCallback<'a> {
    pub code: &'a str,
    pub state: &'a str,
    pub redirect_uri: &'a str,
    pub stored_state: Option<&'a str>,
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<TokenService>,
    passwords: Passwords,
    google: GoogleClient,
    /// Verified against when the email is unknown so both paths cost the same.
    dummy_hash: String,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 100;

/// Trimmed display name, length-checked after trimming.
fn normalize_name(name: &str) -> Result<String, AuthError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&len) {
        return Err(AuthError::InvalidInput(format!(
            "name must be between {} and {} characters long",
            NAME_MIN_CHARS, NAME_MAX_CHARS
        )));
    }
    Ok(name.to_string())
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        tokens: Arc<TokenService>,
    ) -> anyhow::Result<Self> {
        let passwords = Passwords::new(config.password_hashing)?;
        let dummy_hash = passwords.hash(&random_urlsafe(16))?;
        Ok(Self {
            store,
            tokens,
            passwords,
            google: GoogleClient::new(config.google.clone())?,
            dummy_hash,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Register a local account.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        let name = normalize_name(name)?;

        match self.store.find_by_email(&email).await {
            Ok(_) => return Err(AuthError::AlreadyExists),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(AuthError::Store(e)),
        }

        let password_hash = self.hash_password(password).await?;
        let now = Utc::now();
        let identity = Identity {
            id: Uuid::new_v4(),
            email,
            name,
            picture: None,
            created_at: now,
            updated_at: now,
        };
        let credential = Credential {
            identity_id: identity.id,
            password_hash,
        };

        match self.store.create_local(identity.clone(), credential).await {
            Ok(()) => {}
            // Lost a race against a concurrent registration.
            Err(StoreError::Conflict(ConflictKind::Email)) => return Err(AuthError::AlreadyExists),
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Registered identity {}", identity.id);
        Ok(identity)
    }

    /// Check a local password and issue a session token.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionToken, AuthError> {
        let email = normalize_email(email);

        let found = match self.store.find_by_email(&email).await {
            Ok(found) => Some(found),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(AuthError::Store(e)),
        };

        let identity = match found {
            Some((identity, Some(credential))) => {
                if !self.verify_password(password, &credential.password_hash).await? {
                    tracing::warn!("Failed login for identity {}", identity.id);
                    return Err(AuthError::InvalidCredentials);
                }
                identity
            }
            _ => {
                self.verify_password(password, &self.dummy_hash).await?;
                tracing::warn!("Failed login for unknown or password-less account");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = self.tokens.issue(identity.id, &identity.email)?;
        tracing::info!("Successful login for identity {}", identity.id);
        Ok(token)
    }

    /// Start a Google login. The returned state is never kept server-side;
    /// the caller hands it to the client as a short-lived cookie.
    pub fn begin_google_login(&self) -> OAuthStart {
        let state = random_urlsafe(OAUTH_STATE_BYTES);
        OAuthStart {
            redirect_url: self.google.authorization_url(&state),
            state,
        }
    }

    /// Complete a Google login.
    ///
    /// The state check happens before any network traffic, so a forged
    /// callback never reaches the provider.
    pub async fn complete_google_login(
        &self,
        callback: OAuthCallback<'_>,
    ) -> Result<(Identity, SessionToken), AuthError> {
        tracing::debug!("OAuth callback {}", CallbackStage::Received);
        let stored = callback.stored_state.unwrap_or_default();
        if stored.is_empty() || !constant_time_eq(stored, callback.state) {
            tracing::warn!("OAuth callback rejected: state missing or mismatched");
            return Err(AuthError::StateMismatch);
        }
        if callback.redirect_uri != self.google.redirect_uri() {
            return Err(AuthError::InvalidInput(
                "redirect_uri does not match the configured redirect URI".to_string(),
            ));
        }
        tracing::debug!("OAuth callback passed {}", CallbackStage::StateValidated);

        let access_token = self
            .google
            .exchange_code(callback.code)
            .await
            .map_err(|source| AuthError::Provider {
                stage: CallbackStage::CodeExchanged,
                source,
            })?;

        let profile = self
            .google
            .fetch_profile(&access_token)
            .await
            .map_err(|source| AuthError::Provider {
                stage: CallbackStage::UserInfoFetched,
                source,
            })?;

        let identity = self.resolve_account(OAuthProvider::Google, profile).await?;
        tracing::debug!("OAuth callback passed {}", CallbackStage::AccountResolved);

        let token = self.tokens.issue(identity.id, &identity.email)?;
        tracing::debug!("OAuth callback reached {}", CallbackStage::TokenIssued);
        tracing::info!("Successful OAuth login for identity {}", identity.id);
        Ok((identity, token))
    }

    async fn resolve_account(
        &self,
        provider: OAuthProvider,
        profile: ProviderProfile,
    ) -> Result<Identity, AuthError> {
        match self
            .store
            .find_by_provider_identity(provider, &profile.id)
            .await
        {
            Ok(identity) => return Ok(identity),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(AuthError::Store(e)),
        }

        let email = normalize_email(&profile.email);
        match self.store.find_by_email(&email).await {
            Ok((existing, _)) if profile.verified_email => {
                tracing::info!("Linking {} account to identity {}", provider, existing.id);
                let link = SocialLink {
                    identity_id: existing.id,
                    provider,
                    subject: profile.id,
                };
                Ok(self.store.link_social(link).await?)
            }
            Ok(_) => {
                tracing::warn!("Unverified {} email collides with an existing account", provider);
                Err(AuthError::Conflict(ConflictKind::Email))
            }
            Err(StoreError::NotFound) => {
                let now = Utc::now();
                let identity = Identity {
                    id: Uuid::new_v4(),
                    name: profile.name.unwrap_or_else(|| email.clone()),
                    email,
                    picture: profile.picture,
                    created_at: now,
                    updated_at: now,
                };
                let link = SocialLink {
                    identity_id: identity.id,
                    provider,
                    subject: profile.id,
                };
                let created = self.store.create_from_social(identity, link).await?;
                tracing::info!("Created identity {} from {} login", created.id, provider);
                Ok(created)
            }
            Err(e) => Err(AuthError::Store(e)),
        }
    }

    pub async fn current_user(&self, id: Uuid) -> Result<Identity, AuthError> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn update_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        picture: Option<String>,
    ) -> Result<Identity, AuthError> {
        let name = name.as_deref().map(normalize_name).transpose()?;
        let mut identity = self.store.find_by_id(id).await?;
        if let Some(name) = name {
            identity.name = name;
        }
        if picture.is_some() {
            identity.picture = picture;
        }
        identity.updated_at = Utc::now();
        self.store.update(identity.clone()).await?;
        Ok(identity)
    }

    /// Replace the local password after checking the current one.
    pub async fn change_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let identity = self.store.find_by_id(id).await?;
        let (_, credential) = self.store.find_by_email(&identity.email).await?;
        let credential = credential.ok_or(AuthError::InvalidCredentials)?;

        if !self
            .verify_password(current_password, &credential.password_hash)
            .await?
        {
            tracing::warn!("Password change rejected for identity {}", id);
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.hash_password(new_password).await?;
        self.store
            .replace_credential(Credential {
                identity_id: id,
                password_hash,
            })
            .await?;
        tracing::info!("Password changed for identity {}", id);
        Ok(())
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let passwords = self.passwords.clone();
        let password = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))??;
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let passwords = self.passwords.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        let matches = tokio::task::spawn_blocking(move || passwords.verify(&password, &hash))
            .await
            .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))??;
        Ok(matches)
    }
}
