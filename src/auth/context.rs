//! Request-scoped identity values.
//!
//! Neither type can be built from raw request data: a [`VerifiedIdentity`]
//! only comes out of an [`IdentityVerifier`](crate::auth::IdentityVerifier)
//! and an [`AuthenticatedSubject`] only out of a
//! [`TokenIssuer`](crate::auth::TokenIssuer). Handlers that take one of them
//! as an argument are therefore behind the matching gate.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::{ExternalUserId, SubjectId};

/// Identity asserted by the provider and checked against the bot secret.
///
/// Lives for one request. The profile is persisted through the credential
/// store, never this value itself.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// Provider user id
    external_id: ExternalUserId,
    /// Raw provider profile, stored verbatim
    profile: Value,
    /// When the provider signed the assertion
    auth_date: DateTime<Utc>,
}

impl VerifiedIdentity {
    pub(crate) fn new(external_id: ExternalUserId, profile: Value, auth_date: DateTime<Utc>) -> Self {
        Self {
            external_id,
            profile,
            auth_date,
        }
    }

    /// Get the provider user id.
    pub fn external_id(&self) -> ExternalUserId {
        self.external_id
    }

    /// Get the raw profile.
    pub fn profile(&self) -> &Value {
        &self.profile
    }

    /// Get the assertion signing time.
    pub fn auth_date(&self) -> DateTime<Utc> {
        self.auth_date
    }

    /// Subject a token for this identity is bound to.
    pub fn subject(&self) -> SubjectId {
        SubjectId::from(self.external_id)
    }

    pub fn into_parts(self) -> (ExternalUserId, Value) {
        (self.external_id, self.profile)
    }
}

/// Caller whose bearer token passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject {
    subject: SubjectId,
}

impl AuthenticatedSubject {
    pub(crate) fn new(subject: SubjectId) -> Self {
        Self { subject }
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }
}
