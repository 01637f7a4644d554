//! Session orchestration: the login sequence and the profile read path.
//!
//! A login runs verify → persist → issue, strictly in that order and in one
//! pass. Verification has already happened by the time [`SessionOrchestrator::login`]
//! is called (the argument type proves it); persistence has to succeed before a
//! token is minted, so every token's subject resolves in the store.

mod profile;

pub use profile::ProfileQuery;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::auth::{CredentialStore, StoreError, TokenError, TokenIssuer, VerifiedIdentity};
use crate::types::SubjectId;

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub subject_id: SubjectId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Provider profile as verified for this request
    pub user: Value,
}

/// Errors from the session flows.
#[derive(Debug, Clone)]
pub enum SessionError {
    /// Token subject cannot address a stored user
    InvalidSubject(SubjectId),
    /// No stored user for an authenticated subject
    UserNotFound(SubjectId),
    /// The credential store failed
    Storage(StoreError),
    /// The token issuer failed
    Token(TokenError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSubject(subject) => write!(f, "Invalid subject: {}", subject),
            Self::UserNotFound(subject) => write!(f, "User not found: {}", subject),
            Self::Storage(e) => write!(f, "{}", e),
            Self::Token(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// Runs the login state machine for one request at a time.
///
/// Holds no per-request state; one instance is shared by all requests.
pub struct SessionOrchestrator {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenIssuer>,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: Arc<dyn TokenIssuer>) -> Self {
        Self { store, tokens }
    }

    /// Persist the verified identity, then issue a token for it.
    pub async fn login(&self, identity: VerifiedIdentity) -> Result<LoginOutcome, SessionError> {
        let subject_id = identity.subject();
        debug!(
            subject = %subject_id,
            auth_date = %identity.auth_date(),
            "Persisting verified identity"
        );
        let (external_id, profile) = identity.into_parts();

        self.store
            .upsert(external_id, profile.clone())
            .await
            .map_err(|e| {
                error!(external_id = %external_id, "Failed to persist user: {}", e);
                SessionError::Storage(e)
            })?;

        let issued = self.tokens.issue(&subject_id).map_err(|e| {
            error!(subject = %subject_id, "Failed to issue token: {}", e);
            SessionError::Token(e)
        })?;

        info!(subject = %subject_id, "Login succeeded");

        Ok(LoginOutcome {
            subject_id,
            token: issued.token,
            expires_at: issued.expires_at,
            user: profile,
        })
    }
}
