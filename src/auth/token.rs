//! Session token issuance and validation (HS256 JWT).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::types::{SubjectId, TokenAudience, TokenIssuerName};

/// Default access token lifetime in seconds (15 minutes).
pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 900;

/// Mints and checks bearer tokens bound to a subject.
///
/// Issuer, audience, lifetime and key material are fixed when the issuer is
/// built and never change for the life of the process.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, subject: &SubjectId) -> Result<IssuedToken, TokenError>;

    /// Check signature, issuer, audience and validity window.
    fn validate(&self, token: &str) -> Result<SubjectId, TokenError>;
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims carried by session tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

/// Token errors.
#[derive(Debug, Clone)]
pub enum TokenError {
    /// Signing failed
    Signing(String),
    /// Token is past its `exp`
    Expired,
    /// Bad signature, wrong issuer/audience, malformed, or not yet valid
    Invalid(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signing(msg) => write!(f, "Token signing failed: {}", msg),
            Self::Expired => write!(f, "Token expired"),
            Self::Invalid(msg) => write!(f, "Invalid token: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

/// HS256 issuer over a process-wide shared secret.
pub struct JwtTokenIssuer {
    issuer: TokenIssuerName,
    audience: TokenAudience,
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenIssuer {
    pub fn new(
        secret: &[u8],
        issuer: TokenIssuerName,
        audience: TokenAudience,
        ttl: Duration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        Self {
            issuer,
            audience,
            ttl,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issuer(&self) -> &TokenIssuerName {
        &self.issuer
    }

    pub fn audience(&self) -> &TokenAudience {
        &self.audience
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(&self, subject: &SubjectId, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| TokenError::Signing(format!("ttl out of range: {}", e)))?;
        let expires_at = now + ttl;

        let claims = SessionClaims {
            iss: self.issuer.to_string(),
            sub: subject.to_string(),
            aud: self.audience.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Decode and validate, returning the full claim set.
    pub fn decode_claims(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;
        Ok(data.claims)
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, subject: &SubjectId) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, Utc::now())
    }

    fn validate(&self, token: &str) -> Result<SubjectId, TokenError> {
        let claims = self.decode_claims(token)?;
        debug!("Token verified for subject: {}", claims.sub);
        Ok(SubjectId::new(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn issuer() -> JwtTokenIssuer {
        JwtTokenIssuer::new(
            SECRET,
            TokenIssuerName::new("auth-gateway"),
            TokenAudience::new("api"),
            Duration::from_secs(DEFAULT_ACCESS_TTL_SECONDS),
        )
    }

    #[test]
    fn test_issue_then_validate() {
        let issuer = issuer();
        let issued = issuer.issue(&SubjectId::new("42")).unwrap();

        let subject = issuer.validate(&issued.token).unwrap();
        assert_eq!(subject.as_str(), "42");

        let claims = issuer.decode_claims(&issued.token).unwrap();
        assert_eq!(claims.iss, "auth-gateway");
        assert_eq!(claims.aud, "api");
        assert_eq!(claims.exp - claims.iat, DEFAULT_ACCESS_TTL_SECONDS as i64);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_each_token_has_unique_jti() {
        let issuer = issuer();
        let a = issuer.issue(&SubjectId::new("1")).unwrap();
        let b = issuer.issue(&SubjectId::new("1")).unwrap();

        let a = issuer.decode_claims(&a.token).unwrap();
        let b = issuer.decode_claims(&b.token).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = issuer();
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        let issued = issuer.issue_at(&SubjectId::new("42"), long_ago).unwrap();

        assert!(matches!(issuer.validate(&issued.token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_not_yet_valid_token_rejected() {
        let issuer = issuer();
        let later = Utc::now() + chrono::Duration::hours(1);
        let issued = issuer.issue_at(&SubjectId::new("42"), later).unwrap();

        assert!(matches!(issuer.validate(&issued.token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = JwtTokenIssuer::new(
            b"another-secret-another-secret-xx",
            TokenIssuerName::new("auth-gateway"),
            TokenAudience::new("api"),
            Duration::from_secs(60),
        );
        let issued = other.issue(&SubjectId::new("42")).unwrap();

        assert!(matches!(issuer().validate(&issued.token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let other = JwtTokenIssuer::new(
            SECRET,
            TokenIssuerName::new("auth-gateway"),
            TokenAudience::new("someone-else"),
            Duration::from_secs(60),
        );
        let issued = other.issue(&SubjectId::new("42")).unwrap();

        assert!(issuer().validate(&issued.token).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let other = JwtTokenIssuer::new(
            SECRET,
            TokenIssuerName::new("impostor"),
            TokenAudience::new("api"),
            Duration::from_secs(60),
        );
        let issued = other.issue(&SubjectId::new("42")).unwrap();

        assert!(issuer().validate(&issued.token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(issuer().validate("not.a.jwt"), Err(TokenError::Invalid(_))));
        assert!(issuer().validate("").is_err());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(TokenError::Expired.to_string(), "Token expired");
        assert_eq!(
            TokenError::Invalid("bad".to_string()).to_string(),
            "Invalid token: bad"
        );
    }
}
