// HTTP routes for the gateway

mod error;

pub use error::ApiError;

use axum::{
    Router,
    extract::{FromRef, State},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthExtractor, AuthenticatedSubject, CredentialStore, IdentityVerifier, TokenIssuer,
    VerifiedIdentity,
};
use crate::orchestrator::{LoginOutcome, ProfileQuery, SessionOrchestrator};

/// Shared, read-only handles used by every request.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthExtractor>,
    pub sessions: Arc<SessionOrchestrator>,
    pub profiles: Arc<ProfileQuery>,
}

impl AppState {
    /// Wire the three capabilities into the request-handling components.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        verifier: Arc<dyn IdentityVerifier>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            auth: Arc::new(AuthExtractor::new(verifier, tokens.clone())),
            sessions: Arc::new(SessionOrchestrator::new(store.clone(), tokens)),
            profiles: Arc::new(ProfileQuery::new(store)),
        }
    }
}

impl FromRef<AppState> for Arc<AuthExtractor> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/", post(login))
        .route("/me", get(me))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    ok: bool,
    #[serde(flatten)]
    outcome: LoginOutcome,
}

/// Login with a verified provider assertion.
///
/// The `VerifiedIdentity` extractor is the gate: without a valid assertion
/// this body never runs and the caller gets 401.
async fn login(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
) -> Result<Json<LoginResponse>, ApiError> {
    let outcome = state.sessions.login(identity).await?;
    Ok(Json(LoginResponse { ok: true, outcome }))
}

/// Return the caller's stored profile document.
async fn me(
    State(state): State<AppState>,
    caller: AuthenticatedSubject,
) -> Result<Json<Value>, ApiError> {
    let profile = state.profiles.profile(&caller).await?;
    Ok(Json(profile))
}
