//! Authenticated read of the caller's own profile.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::auth::{AuthenticatedSubject, CredentialStore};
use crate::orchestrator::SessionError;
use crate::types::ExternalUserId;

/// Reads the stored profile for the subject of a validated token.
///
/// The subject is taken from the token only; there is no way to ask for
/// someone else's profile.
pub struct ProfileQuery {
    store: Arc<dyn CredentialStore>,
}

impl ProfileQuery {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn profile(&self, caller: &AuthenticatedSubject) -> Result<Value, SessionError> {
        let subject = caller.subject();
        let external_id = ExternalUserId::try_from(subject).map_err(|_| {
            debug!(subject = %subject, "Token subject is not a user id");
            SessionError::InvalidSubject(subject.clone())
        })?;

        match self.store.get_profile(external_id).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(SessionError::UserNotFound(subject.clone())),
            Err(e) => {
                error!(external_id = %external_id, "Failed to read profile: {}", e);
                Err(SessionError::Storage(e))
            }
        }
    }
}
