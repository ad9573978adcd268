//! Outbound calls to the Google OAuth endpoints.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::ProviderProfile;
use crate::config::GoogleConfig;

const SCOPES: &str = "openid email profile";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to provider failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("provider responded with status {0}")]
    Status(StatusCode),
    #[error("provider returned a malformed payload: {0}")]
    Payload(#[source] reqwest::Error),
    #[error("provider profile is missing `{0}`")]
    MissingField(&'static str),
}

impl ProviderError {
    /// 4xx from the provider means the code we forwarded was bad.
    pub fn is_client_caused(&self) -> bool {
        matches!(self, ProviderError::Status(status) if status.is_client_error())
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    grant_type: &'static str,
}

pub struct GoogleClient {
    http: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http, config })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.config.redirect_uri
    }

    /// Authorization URL the browser is sent to.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for an access token. Not retried:
    /// codes are single-use.
    pub async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&TokenRequest {
                code,
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
                redirect_uri: &self.config.redirect_uri,
                grant_type: "authorization_code",
            })
            .send()
            .await
            .map_err(ProviderError::Transport)?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }

        let tokens: GoogleTokenResponse = response.json().await.map_err(ProviderError::Payload)?;
        Ok(tokens.access_token)
    }

    /// Fetch the signed-in user's profile.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(ProviderError::Transport)?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }

        let profile: ProviderProfile = response.json().await.map_err(ProviderError::Payload)?;
        if profile.id.is_empty() {
            return Err(ProviderError::MissingField("id"));
        }
        if profile.email.trim().is_empty() {
            return Err(ProviderError::MissingField("email"));
        }
        Ok(profile)
    }
}
