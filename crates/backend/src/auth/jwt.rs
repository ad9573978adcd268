//! JWT session token issuance and validation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use uuid::Uuid;

use super::random_urlsafe;
use super::types::{Claims, SessionToken};
use crate::config::AuthConfig;

/// Fixed session lifetime.
pub const SESSION_TTL_HOURS: i64 = 24;

const JTI_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token claims")]
    MalformedClaims,
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => TokenError::InvalidSignature,
            _ => TokenError::MalformedClaims,
        }
    }
}

/// Claims extracted from a token that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject_id: Uuid,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Stateless HS256 token service. Holds the signing key for its lifetime.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        // Only HS256 is accepted; a token announcing any other algorithm
        // fails before its signature is looked at.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer,
            validation,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.jwt_issuer.clone())
    }

    /// Create a new session token for an identity.
    pub fn issue(&self, subject_id: Uuid, email: &str) -> Result<SessionToken, TokenError> {
        self.issue_at(subject_id, email, Utc::now())
    }

    fn issue_at(
        &self,
        subject_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, TokenError> {
        let expires_at = now + Duration::hours(SESSION_TTL_HOURS);

        let claims = Claims {
            sub: subject_id.to_string(),
            email: email.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: random_urlsafe(JTI_BYTES),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)?;

        Ok(SessionToken {
            token,
            subject_id,
            expires_at,
        })
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, raw_token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<Claims>(raw_token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        let subject_id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::MalformedClaims)?;
        let issued_at = Utc
            .timestamp_opt(claims.iat, 0)
            .single()
            .ok_or(TokenError::MalformedClaims)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(TokenError::MalformedClaims)?;

        Ok(TokenClaims {
            subject_id,
            email: claims.email,
            issued_at,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key-for-testing-only-32b";

    fn service() -> TokenService {
        TokenService::new(SECRET, "ecolink-test")
    }

    #[test]
    fn test_issue_and_validate_token() {
        let tokens = service();
        let id = Uuid::new_v4();
        let issued = tokens.issue(id, "test@example.com").expect("should issue token");

        let claims = tokens.validate(&issued.token).expect("should validate token");
        assert_eq!(claims.subject_id, id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.expires_at.timestamp(), issued.expires_at.timestamp());
        assert_eq!(
            claims.expires_at - claims.issued_at,
            Duration::hours(SESSION_TTL_HOURS)
        );
    }

    #[test]
    fn test_tokens_carry_distinct_ids() {
        let tokens = service();
        let id = Uuid::new_v4();
        let a = tokens.issue(id, "a@example.com").unwrap();
        let b = tokens.issue(id, "a@example.com").unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_flipped_signature_rejected() {
        let tokens = service();
        let issued = tokens.issue(Uuid::new_v4(), "test@example.com").unwrap();

        let (body, signature) = issued.token.rsplit_once('.').unwrap();
        let mut chars: Vec<char> = signature.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered = format!("{}.{}", body, chars.into_iter().collect::<String>());

        assert!(matches!(
            tokens.validate(&tampered),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = service();
        let past = Utc::now() - Duration::hours(SESSION_TTL_HOURS + 1);
        let issued = tokens
            .issue_at(Uuid::new_v4(), "test@example.com", past)
            .unwrap();

        assert!(matches!(
            tokens.validate(&issued.token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issued = service().issue(Uuid::new_v4(), "test@example.com").unwrap();
        let other = TokenService::new(b"another-secret-key-also-32-bytes-long", "ecolink-test");

        assert!(matches!(
            other.validate(&issued.token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            iss: "ecolink-test".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
            jti: "fixed".to_string(),
        };
        let forged = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert!(matches!(
            service().validate(&forged),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let issued = TokenService::new(SECRET, "someone-else")
            .issue(Uuid::new_v4(), "test@example.com")
            .unwrap();
        assert!(service().validate(&issued.token).is_err());
    }

    #[test]
    fn test_invalid_token_rejected() {
        assert!(matches!(
            service().validate("invalid.token.here"),
            Err(TokenError::MalformedClaims)
        ));
    }
}
