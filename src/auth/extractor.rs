//! Authentication gates for HTTP requests.
//!
//! Both gates run as axum extractors, so a handler that names
//! [`VerifiedIdentity`] or [`AuthenticatedSubject`] in its arguments is never
//! entered for a request that failed the check.

use std::fmt;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use http::HeaderMap;
use http::header::AUTHORIZATION;
use http::request::Parts;
use tracing::debug;

use crate::auth::context::{AuthenticatedSubject, VerifiedIdentity};
use crate::auth::telegram::IdentityVerifier;
use crate::auth::token::{TokenError, TokenIssuer};

/// Authentication errors.
///
/// Every variant is answered with 401; the detail only reaches the logs.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No credentials of the expected kind were presented
    Unauthenticated,
    /// The identity assertion failed verification
    InvalidAssertion(String),
    /// The identity assertion is too old
    AssertionExpired,
    /// The bearer token failed validation
    InvalidToken(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Authentication required"),
            Self::InvalidAssertion(msg) => write!(f, "Invalid identity assertion: {}", msg),
            Self::AssertionExpired => write!(f, "Identity assertion has expired"),
            Self::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        Self::InvalidToken(e.to_string())
    }
}

/// Runs the identity verifier and the token validator for incoming requests.
pub struct AuthExtractor {
    verifier: Arc<dyn IdentityVerifier>,
    tokens: Arc<dyn TokenIssuer>,
}

impl AuthExtractor {
    /// Create a new auth extractor.
    pub fn new(verifier: Arc<dyn IdentityVerifier>, tokens: Arc<dyn TokenIssuer>) -> Self {
        Self { verifier, tokens }
    }

    /// Verify the provider assertion carried by a login request.
    pub fn verify_login(&self, headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError> {
        self.verifier.verify(headers)
    }

    /// Validate an `Authorization: Bearer <token>` header value.
    pub fn authenticate_bearer(
        &self,
        authorization: Option<&str>,
    ) -> Result<AuthenticatedSubject, AuthError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        let subject = self.tokens.validate(token)?;
        Ok(AuthenticatedSubject::new(subject))
    }
}

impl<S> FromRequestParts<S> for VerifiedIdentity
where
    S: Send + Sync,
    Arc<AuthExtractor>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let extractor = Arc::<AuthExtractor>::from_ref(state);
        extractor.verify_login(&parts.headers).inspect_err(|e| {
            debug!("Login assertion rejected: {}", e);
        })
    }
}

impl<S> FromRequestParts<S> for AuthenticatedSubject
where
    S: Send + Sync,
    Arc<AuthExtractor>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let extractor = Arc::<AuthExtractor>::from_ref(state);
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        extractor.authenticate_bearer(authorization).inspect_err(|e| {
            debug!("Bearer token rejected: {}", e);
        })
    }
}
