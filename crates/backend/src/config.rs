//! Runtime configuration loaded from the environment.

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

/// Shortest accepted HMAC signing key (256 bits).
pub const MIN_JWT_SECRET_BYTES: usize = 32;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// OAuth client registration and provider endpoints.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub http_timeout: Duration,
}

impl GoogleConfig {
    /// Google endpoints with the given client registration.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHashing {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashing {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Auth configuration loaded from environment
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub google: GoogleConfig,
    pub frontend_url: String,
    /// Force `Secure` cookies even when the request did not arrive over TLS.
    pub cookie_secure: bool,
    pub password_hashing: PasswordHashing,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("google_client_id", &self.google.client_id)
            .field("frontend_url", &self.frontend_url)
            .field("cookie_secure", &self.cookie_secure)
            .field("password_hashing", &self.password_hashing)
            .finish()
    }
}

impl AuthConfig {
    /// Load auth configuration from environment variables.
    ///
    /// Required env vars:
    /// - `JWT_SECRET`: HMAC key for session tokens, at least 32 bytes
    /// - `GOOGLE_CLIENT_ID`: Google OAuth client ID
    /// - `GOOGLE_CLIENT_SECRET`: Google OAuth client secret
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let redirect_uri = env::var("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| format!("{}/auth/callback/google", frontend_url));

        let mut google = GoogleConfig::new(
            env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID must be set")?,
            env::var("GOOGLE_CLIENT_SECRET").context("GOOGLE_CLIENT_SECRET must be set")?,
            redirect_uri,
        );
        if let Some(secs) = parse_var::<u64>("OAUTH_HTTP_TIMEOUT_SECS")? {
            google.http_timeout = Duration::from_secs(secs);
        }

        let defaults = PasswordHashing::default();
        let password_hashing = PasswordHashing {
            memory_kib: parse_var("ARGON2_MEMORY_KIB")?.unwrap_or(defaults.memory_kib),
            iterations: parse_var("ARGON2_ITERATIONS")?.unwrap_or(defaults.iterations),
            parallelism: parse_var("ARGON2_PARALLELISM")?.unwrap_or(defaults.parallelism),
        };

        let config = Self {
            jwt_secret,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "ecolink".to_string()),
            google,
            frontend_url,
            cookie_secure: parse_var("COOKIE_SECURE")?.unwrap_or(false),
            password_hashing,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service must not start with.
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            bail!(
                "JWT_SECRET must be at least {} bytes (got {})",
                MIN_JWT_SECRET_BYTES,
                self.jwt_secret.len()
            );
        }
        argon2::Params::new(
            self.password_hashing.memory_kib,
            self.password_hashing.iterations,
            self.password_hashing.parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Ok(())
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value", name)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "test-secret-key-that-is-32-bytes!".to_string(),
        jwt_issuer: "ecolink-test".to_string(),
        google: GoogleConfig::new("test-client", "test-secret", "http://localhost/callback"),
        frontend_url: "http://localhost:3000".to_string(),
        cookie_secure: false,
        password_hashing: PasswordHashing {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secret_rejected() {
        let mut config = test_config();
        config.jwt_secret = "too-short".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least 32 bytes"));
    }

    #[test]
    fn test_minimum_length_secret_accepted() {
        let mut config = test_config();
        config.jwt_secret = "k".repeat(MIN_JWT_SECRET_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_argon2_params_rejected() {
        let mut config = test_config();
        config.password_hashing.parallelism = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("test-secret-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
