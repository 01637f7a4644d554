//! Telegram Mini App init-data verification.
//!
//! A Mini App login carries the init data string Telegram handed to the web
//! app, in an `Authorization: tma <initData>` header. The data is signed with
//! a key derived from the bot token:
//!
//! ```text
//! secret_key = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//! hash       = hex(HMAC_SHA256(key = secret_key, msg = data_check_string))
//! ```
//!
//! where `data_check_string` is every received `key=value` pair except
//! `hash`, sorted by key and joined with `\n`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::HeaderMap;
use http::header::AUTHORIZATION;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::auth::context::VerifiedIdentity;
use crate::auth::extractor::AuthError;
use crate::types::ExternalUserId;

type HmacSha256 = Hmac<Sha256>;

/// Authorization scheme carrying Mini App init data.
pub const INIT_DATA_SCHEME: &str = "tma";

/// Default maximum age of an accepted assertion (24 hours).
pub const DEFAULT_MAX_AGE_SECONDS: u64 = 86_400;

/// Tolerated clock skew for assertions dated in the future.
const MAX_FUTURE_SKEW_SECONDS: i64 = 60;

const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

/// Validates an inbound identity assertion.
///
/// Implementations decide every rejection policy (signature, freshness,
/// replay). Callers treat any `Err` as a plain authentication failure.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError>;
}

/// Verifies Telegram Mini App init data against the bot token.
pub struct TelegramInitDataVerifier {
    secret_key: Vec<u8>,
    max_age: Duration,
}

impl TelegramInitDataVerifier {
    /// Derive the signing secret from the bot token.
    pub fn new(bot_token: &str, max_age: Duration) -> Result<Self, AuthError> {
        let secret_key = hmac_sha256(WEB_APP_DATA_KEY, bot_token.as_bytes())?;
        Ok(Self {
            secret_key,
            max_age,
        })
    }

    /// Verify a raw init data string as of `now`.
    pub fn verify_init_data(
        &self,
        init_data: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedIdentity, AuthError> {
        let mut fields = BTreeMap::new();
        for (key, value) in url::form_urlencoded::parse(init_data.as_bytes()) {
            if fields.insert(key.into_owned(), value.into_owned()).is_some() {
                return Err(AuthError::InvalidAssertion("duplicate field".to_string()));
            }
        }

        let hash = fields
            .remove("hash")
            .ok_or_else(|| AuthError::InvalidAssertion("missing hash".to_string()))?;
        let received = hex::decode(&hash)
            .map_err(|_| AuthError::InvalidAssertion("malformed hash".to_string()))?;

        let data_check_string = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let mut mac = HmacSha256::new_from_slice(&self.secret_key)
            .map_err(|e| AuthError::InvalidAssertion(e.to_string()))?;
        mac.update(data_check_string.as_bytes());
        mac.verify_slice(&received)
            .map_err(|_| AuthError::InvalidAssertion("signature mismatch".to_string()))?;

        let auth_date = fields
            .get("auth_date")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| AuthError::InvalidAssertion("missing or invalid auth_date".to_string()))?;

        let age = now.signed_duration_since(auth_date);
        if age.num_seconds() < -MAX_FUTURE_SKEW_SECONDS {
            return Err(AuthError::InvalidAssertion("auth_date in the future".to_string()));
        }
        if age.num_seconds() > self.max_age.as_secs() as i64 {
            return Err(AuthError::AssertionExpired);
        }

        let user = fields
            .get("user")
            .ok_or_else(|| AuthError::InvalidAssertion("missing user".to_string()))?;
        let profile: Value = serde_json::from_str(user)
            .map_err(|_| AuthError::InvalidAssertion("malformed user".to_string()))?;
        let external_id = profile
            .get("id")
            .and_then(Value::as_i64)
            .map(ExternalUserId::new)
            .ok_or_else(|| AuthError::InvalidAssertion("user has no integer id".to_string()))?;

        debug!(external_id = %external_id, "Telegram init data verified");

        Ok(VerifiedIdentity::new(external_id, profile, auth_date))
    }
}

impl IdentityVerifier for TelegramInitDataVerifier {
    fn verify(&self, headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError> {
        let init_data = init_data_from_headers(headers)?;
        self.verify_init_data(init_data, Utc::now())
    }
}

/// Pull the init data out of `Authorization: tma <initData>`.
fn init_data_from_headers(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated)?
        .to_str()
        .map_err(|_| AuthError::InvalidAssertion("non-ASCII authorization header".to_string()))?;

    let (scheme, data) = value.split_once(' ').ok_or(AuthError::Unauthenticated)?;
    if !scheme.eq_ignore_ascii_case(INIT_DATA_SCHEME) || data.trim().is_empty() {
        return Err(AuthError::Unauthenticated);
    }

    Ok(data.trim())
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AuthError::InvalidAssertion(format!("signing key rejected: {}", e)))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build init data signed for `bot_token`, the way Telegram would.
#[cfg(test)]
pub(crate) fn signed_init_data(bot_token: &str, user: &Value, auth_date: i64) -> String {
    let user = user.to_string();
    let auth_date = auth_date.to_string();
    let mut fields = BTreeMap::new();
    fields.insert("auth_date", auth_date.as_str());
    fields.insert("query_id", "AAHdF6IQAAAAAN0XohDhrOrc");
    fields.insert("user", user.as_str());

    let data_check_string = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n");
    let secret_key = hmac_sha256(WEB_APP_DATA_KEY, bot_token.as_bytes()).unwrap();
    let hash = hex::encode(hmac_sha256(&secret_key, data_check_string.as_bytes()).unwrap());

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter())
        .append_pair("hash", &hash)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    const BOT_TOKEN: &str = "123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11";

    fn verifier() -> TelegramInitDataVerifier {
        TelegramInitDataVerifier::new(BOT_TOKEN, Duration::from_secs(DEFAULT_MAX_AGE_SECONDS))
            .unwrap()
    }

    fn user() -> Value {
        json!({"id": 279058397, "first_name": "Vladislav", "username": "vdkfrost", "language_code": "ru"})
    }

    #[test]
    fn test_valid_init_data_accepted() {
        let now = Utc::now();
        let data = signed_init_data(BOT_TOKEN, &user(), now.timestamp());

        let identity = verifier().verify_init_data(&data, now).unwrap();
        assert_eq!(identity.external_id().get(), 279058397);
        assert_eq!(identity.profile(), &user());
        assert_eq!(identity.auth_date().timestamp(), now.timestamp());
    }

    #[test]
    fn test_wrong_bot_token_rejected() {
        let now = Utc::now();
        let data = signed_init_data("999:other-bot", &user(), now.timestamp());

        let err = verifier().verify_init_data(&data, now).unwrap_err();
        assert!(matches!(err, AuthError::InvalidAssertion(_)));
    }

    #[test]
    fn test_tampered_field_rejected() {
        let now = Utc::now();
        let data = signed_init_data(BOT_TOKEN, &user(), now.timestamp());
        let tampered = data.replace("Vladislav", "Mallory");
        assert_ne!(data, tampered);

        assert!(verifier().verify_init_data(&tampered, now).is_err());
    }

    #[test]
    fn test_missing_hash_rejected() {
        let now = Utc::now();
        let data = signed_init_data(BOT_TOKEN, &user(), now.timestamp());
        let without_hash: String = data
            .split('&')
            .filter(|pair| !pair.starts_with("hash="))
            .collect::<Vec<_>>()
            .join("&");

        let err = verifier().verify_init_data(&without_hash, now).unwrap_err();
        assert!(matches!(err, AuthError::InvalidAssertion(_)));
    }

    #[test]
    fn test_stale_assertion_rejected() {
        let now = Utc::now();
        let signed_at = now.timestamp() - DEFAULT_MAX_AGE_SECONDS as i64 - 1;
        let data = signed_init_data(BOT_TOKEN, &user(), signed_at);

        let err = verifier().verify_init_data(&data, now).unwrap_err();
        assert!(matches!(err, AuthError::AssertionExpired));
    }

    #[test]
    fn test_future_assertion_rejected() {
        let now = Utc::now();
        let data = signed_init_data(BOT_TOKEN, &user(), now.timestamp() + 3600);

        assert!(verifier().verify_init_data(&data, now).is_err());
    }

    #[test]
    fn test_user_without_id_rejected() {
        let now = Utc::now();
        let data = signed_init_data(BOT_TOKEN, &json!({"first_name": "NoId"}), now.timestamp());

        let err = verifier().verify_init_data(&data, now).unwrap_err();
        assert!(matches!(err, AuthError::InvalidAssertion(_)));
    }

    #[test]
    fn test_headers_require_tma_scheme() {
        let now = Utc::now();
        let data = signed_init_data(BOT_TOKEN, &user(), now.timestamp());

        let mut headers = HeaderMap::new();
        assert!(matches!(
            verifier().verify(&headers),
            Err(AuthError::Unauthenticated)
        ));

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", data)).unwrap(),
        );
        assert!(verifier().verify(&headers).is_err());

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("tma {}", data)).unwrap(),
        );
        let identity = verifier().verify(&headers).unwrap();
        assert_eq!(identity.external_id().get(), 279058397);
    }

    #[test]
    fn test_key_derivation_handles_any_token_length() {
        // Keys longer than the SHA-256 block are hashed down, empty keys are padded.
        let long_token = format!("123456:{}", "x".repeat(200));
        for token in ["", "1:a", long_token.as_str()] {
            let key = hmac_sha256(WEB_APP_DATA_KEY, token.as_bytes()).unwrap();
            assert_eq!(key.len(), 32);
            assert!(hmac_sha256(&key, b"auth_date=1").is_ok());
        }

        let now = Utc::now();
        let verifier =
            TelegramInitDataVerifier::new(&long_token, Duration::from_secs(60)).unwrap();
        let data = signed_init_data(&long_token, &user(), now.timestamp());
        assert!(verifier.verify_init_data(&data, now).is_ok());
        assert!(verifier.verify_init_data(&signed_init_data(BOT_TOKEN, &user(), now.timestamp()), now).is_err());
    }
}
