//! User storage keyed by provider identity.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::db::{DbPool, PoolClosed, UserRecord};
use crate::types::ExternalUserId;

/// Boxed future returned by [`CredentialStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable mapping from an external identity to its latest profile.
///
/// Implementations must make `upsert` safe under arbitrary concurrent calls
/// for the same key, relying on the store's own conflict resolution.
pub trait CredentialStore: Send + Sync {
    /// Insert the identity, or replace its profile and refresh `updated_at`.
    /// `created_at` is only ever written by the first insert.
    fn upsert(&self, external_id: ExternalUserId, profile: Value) -> StoreFuture<'_, ()>;

    /// Read the stored profile; `None` when the identity has never logged in.
    fn get_profile(&self, external_id: ExternalUserId) -> StoreFuture<'_, Option<Value>>;
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// The pool has been closed
    Unavailable,
    /// The database rejected or failed the query
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "Storage unavailable"),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<surrealdb::Error> for StoreError {
    fn from(e: surrealdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<PoolClosed> for StoreError {
    fn from(_: PoolClosed) -> Self {
        Self::Unavailable
    }
}

/// Upper bound on commits tried for one upsert.
const MAX_UPSERT_ATTEMPTS: u32 = 32;

/// Whether a failed write lost a commit race and can simply be re-run.
///
/// Covers the retryable transaction conflict and the unique index tripping
/// when two first inserts of the same record race.
fn is_write_conflict(message: &str) -> bool {
    message.contains("can be retried") || message.contains("already contains")
}

/// SurrealDB-backed user store.
#[derive(Clone)]
pub struct UserStore {
    pool: DbPool,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Insert or update the user keyed by `external_id` in one statement.
    ///
    /// Writers racing on the same record can lose the optimistic commit; the
    /// statement is re-run for them until it lands, so every call converges.
    pub async fn upsert_user(
        &self,
        external_id: ExternalUserId,
        profile: Value,
    ) -> Result<(), StoreError> {
        let query = r#"
            UPSERT type::thing("users", $external_id) SET
                external_id = $external_id,
                profile = $profile
            RETURN NONE
        "#;

        let mut attempt = 1;
        loop {
            let result = {
                let db = self.pool.acquire().await?;
                db.query(query)
                    .bind(("external_id", external_id.get()))
                    .bind(("profile", profile.clone()))
                    .await
                    .and_then(|res| res.check())
            };

            match result {
                Ok(_) => {
                    debug!(external_id = %external_id, attempt, "Upserted user");
                    return Ok(());
                }
                Err(e) if attempt < MAX_UPSERT_ATTEMPTS && is_write_conflict(&e.to_string()) => {
                    debug!(external_id = %external_id, attempt, "Upsert conflicted, retrying");
                    tokio::time::sleep(Duration::from_millis(u64::from(attempt.min(10)))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Get only the profile document for a user.
    pub async fn get_user_profile(
        &self,
        external_id: ExternalUserId,
    ) -> Result<Option<Value>, StoreError> {
        let query = r#"SELECT VALUE profile FROM type::thing("users", $external_id)"#;

        let db = self.pool.acquire().await?;
        let mut res = db
            .query(query)
            .bind(("external_id", external_id.get()))
            .await?;

        let profile: Option<Value> = res.take(0)?;
        Ok(profile)
    }

    /// Get the full record, timestamps included.
    pub async fn get_user(
        &self,
        external_id: ExternalUserId,
    ) -> Result<Option<UserRecord>, StoreError> {
        let query = r#"SELECT * FROM type::thing("users", $external_id)"#;

        let db = self.pool.acquire().await?;
        let mut res = db
            .query(query)
            .bind(("external_id", external_id.get()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }
}

impl CredentialStore for UserStore {
    fn upsert(&self, external_id: ExternalUserId, profile: Value) -> StoreFuture<'_, ()> {
        Box::pin(self.upsert_user(external_id, profile))
    }

    fn get_profile(&self, external_id: ExternalUserId) -> StoreFuture<'_, Option<Value>> {
        Box::pin(self.get_user_profile(external_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, ensure_schema};
    use serde_json::json;
    use std::time::Duration;

    async fn setup_test_store() -> UserStore {
        let pool = DbPool::connect(&DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&pool.acquire().await.unwrap()).await.unwrap();
        UserStore::new(pool)
    }

    async fn count_users(store: &UserStore) -> usize {
        let db = store.pool().acquire().await.unwrap();
        let mut res = db.query("SELECT * FROM users").await.unwrap();
        let users: Vec<UserRecord> = res.take(0).unwrap();
        users.len()
    }

    #[tokio::test]
    async fn test_upsert_creates_user() {
        let store = setup_test_store().await;
        let id = ExternalUserId::new(7);

        store.upsert(id, json!({"name": "A"})).await.unwrap();

        let user = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.external_id, 7);
        assert_eq!(user.profile, json!({"name": "A"}));
        assert!(user.created_at.is_some());
        assert!(user.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_get_profile_missing_user() {
        let store = setup_test_store().await;
        let profile = store.get_profile(ExternalUserId::new(404)).await.unwrap();
        assert!(profile.is_none());
        assert!(store.get_user(ExternalUserId::new(404)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distinct_identities_distinct_records() {
        let store = setup_test_store().await;

        store.upsert(ExternalUserId::new(1), json!({"name": "one"})).await.unwrap();
        store.upsert(ExternalUserId::new(2), json!({"name": "two"})).await.unwrap();

        assert_eq!(count_users(&store).await, 2);
        assert_eq!(
            store.get_profile(ExternalUserId::new(1)).await.unwrap(),
            Some(json!({"name": "one"}))
        );
        assert_eq!(
            store.get_profile(ExternalUserId::new(2)).await.unwrap(),
            Some(json!({"name": "two"}))
        );
    }

    #[tokio::test]
    async fn test_repeat_upsert_keeps_created_at_and_advances_updated_at() {
        let store = setup_test_store().await;
        let id = ExternalUserId::new(42);

        store.upsert(id, json!({"name": "before"})).await.unwrap();
        let first = store.get_user(id).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        store.upsert(id, json!({"name": "after"})).await.unwrap();
        let second = store.get_user(id).await.unwrap().unwrap();

        assert_eq!(count_users(&store).await, 1);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.profile, json!({"name": "after"}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_converge_to_one_record() {
        let store = setup_test_store().await;
        let id = ExternalUserId::new(99);

        for round in 0..5 {
            let mut handles = Vec::new();
            for n in 0..16 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.upsert(id, json!({"round": round, "n": n})).await
                }));
            }

            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            assert_eq!(count_users(&store).await, 1);
            let profile = store.get_profile(id).await.unwrap().unwrap();
            assert_eq!(profile["round"], round);
        }

        let user = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.external_id, 99);
        assert!(user.created_at <= user.updated_at);
    }

    #[test]
    fn test_write_conflict_classification() {
        assert!(is_write_conflict(
            "Failed to commit transaction due to a read or write conflict. \
             This transaction can be retried"
        ));
        assert!(is_write_conflict(
            "Database index `users_external_id` already contains 7, with record `users:7`"
        ));
        assert!(!is_write_conflict("Found 'abc' for field `external_id`, but expected a int"));
    }

    #[tokio::test]
    async fn test_nested_profile_round_trips() {
        let store = setup_test_store().await;
        let id = ExternalUserId::new(5);
        let profile = json!({
            "id": 5,
            "first_name": "Ada",
            "username": "ada",
            "is_premium": true,
            "photo": {"small": "a.jpg", "sizes": [1, 2, 3]}
        });

        store.upsert(id, profile.clone()).await.unwrap();
        assert_eq!(store.get_profile(id).await.unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn test_closed_pool_surfaces_unavailable() {
        let store = setup_test_store().await;
        store.pool().close();

        let err = store
            .upsert(ExternalUserId::new(1), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable));
    }
}
