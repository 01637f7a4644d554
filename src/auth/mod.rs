//! Authentication and identity module.
//!
//! Three capabilities meet here:
//!
//! - **Identity verification**: turns a Telegram Mini App assertion into a
//!   [`VerifiedIdentity`] ([`IdentityVerifier`], [`TelegramInitDataVerifier`])
//! - **Token issuance**: mints and validates bearer tokens
//!   ([`TokenIssuer`], [`JwtTokenIssuer`])
//! - **Credential storage**: one record per provider identity
//!   ([`CredentialStore`], [`UserStore`])
//!
//! ## Security Model
//!
//! - Unverified request data never reaches the orchestrator: handlers receive
//!   identities only through the extractors in [`extractor`]
//! - The subject of a profile read always comes from a validated token
//! - Rejection reasons are logged, never returned to the caller

mod context;
pub mod extractor;
pub mod telegram;
pub mod token;
mod user_store;

pub(crate) mod testing;

pub use context::{AuthenticatedSubject, VerifiedIdentity};
pub use extractor::{AuthError, AuthExtractor};
pub use telegram::{DEFAULT_MAX_AGE_SECONDS, IdentityVerifier, TelegramInitDataVerifier};
pub use token::{
    DEFAULT_ACCESS_TTL_SECONDS, IssuedToken, JwtTokenIssuer, SessionClaims, TokenError,
    TokenIssuer,
};
pub use user_store::{CredentialStore, StoreError, StoreFuture, UserStore};
