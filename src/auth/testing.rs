//! Deterministic capability doubles for tests.

#![cfg(test)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use http::HeaderMap;
use serde_json::Value;

use crate::auth::context::VerifiedIdentity;
use crate::auth::extractor::AuthError;
use crate::auth::telegram::IdentityVerifier;
use crate::auth::token::{IssuedToken, JwtTokenIssuer, TokenError, TokenIssuer};
use crate::auth::user_store::{CredentialStore, StoreError, StoreFuture};
use crate::types::{ExternalUserId, SubjectId, TokenAudience, TokenIssuerName};

pub const TEST_SECRET: &[u8] = b"test-signing-key-test-signing-key";

pub fn test_token_issuer() -> JwtTokenIssuer {
    JwtTokenIssuer::new(
        TEST_SECRET,
        TokenIssuerName::new("auth-gateway"),
        TokenAudience::new("api"),
        Duration::from_secs(900),
    )
}

/// Rejects every assertion.
pub struct RejectingVerifier;

impl IdentityVerifier for RejectingVerifier {
    fn verify(&self, _headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError> {
        Err(AuthError::InvalidAssertion("rejected by test double".to_string()))
    }
}

/// Accepts any request and vouches for a fixed identity.
pub struct StaticVerifier {
    external_id: ExternalUserId,
    profile: Value,
}

impl StaticVerifier {
    pub fn new(external_id: i64, profile: Value) -> Self {
        Self {
            external_id: ExternalUserId::new(external_id),
            profile,
        }
    }
}

impl IdentityVerifier for StaticVerifier {
    fn verify(&self, _headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError> {
        Ok(VerifiedIdentity::new(
            self.external_id,
            self.profile.clone(),
            Utc::now(),
        ))
    }
}

/// Wraps a store and counts calls per operation.
pub struct CountingStore<S> {
    inner: S,
    upserts: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            upserts: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl<S: CredentialStore> CredentialStore for CountingStore<S> {
    fn upsert(&self, external_id: ExternalUserId, profile: Value) -> StoreFuture<'_, ()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(external_id, profile)
    }

    fn get_profile(&self, external_id: ExternalUserId) -> StoreFuture<'_, Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_profile(external_id)
    }
}

/// Fails every call as an unreachable database would.
pub struct FailingStore;

impl CredentialStore for FailingStore {
    fn upsert(&self, _external_id: ExternalUserId, _profile: Value) -> StoreFuture<'_, ()> {
        Box::pin(async { Err(StoreError::Database("connection refused".to_string())) })
    }

    fn get_profile(&self, _external_id: ExternalUserId) -> StoreFuture<'_, Option<Value>> {
        Box::pin(async { Err(StoreError::Database("connection refused".to_string())) })
    }
}

/// Wraps an issuer and counts calls per operation.
pub struct CountingIssuer<T> {
    inner: T,
    issued: AtomicUsize,
    validated: AtomicUsize,
}

impl<T> CountingIssuer<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            issued: AtomicUsize::new(0),
            validated: AtomicUsize::new(0),
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn validated(&self) -> usize {
        self.validated.load(Ordering::SeqCst)
    }
}

impl<T: TokenIssuer> TokenIssuer for CountingIssuer<T> {
    fn issue(&self, subject: &SubjectId) -> Result<IssuedToken, TokenError> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        self.inner.issue(subject)
    }

    fn validate(&self, token: &str) -> Result<SubjectId, TokenError> {
        self.validated.fetch_add(1, Ordering::SeqCst);
        self.inner.validate(token)
    }
}

/// Fails every signing operation.
pub struct FailingIssuer;

impl TokenIssuer for FailingIssuer {
    fn issue(&self, _subject: &SubjectId) -> Result<IssuedToken, TokenError> {
        Err(TokenError::Signing("signing key unavailable".to_string()))
    }

    fn validate(&self, _token: &str) -> Result<SubjectId, TokenError> {
        Err(TokenError::Invalid("signing key unavailable".to_string()))
    }
}
