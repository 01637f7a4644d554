use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{RecordId, sql::Datetime};
use tracing::info;

use crate::db::Db;

/// Persisted user record keyed by the provider's user id.
///
/// The record id is `users:<external_id>`, so the key itself enforces one
/// record per identity; the UNIQUE index on `external_id` backs that up for
/// anything writing outside [`crate::auth::UserStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database identifier
    pub id: RecordId,
    /// Telegram user id
    pub external_id: i64,
    /// Latest profile snapshot reported by the provider
    pub profile: Value,
    /// First successful login; never rewritten
    pub created_at: Option<Datetime>,
    /// Most recent successful login
    pub updated_at: Option<Datetime>,
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    // `created_at` keeps its previous value on every write after the first;
    // `updated_at` is recomputed on every write.
    let schema = r#"
        DEFINE TABLE IF NOT EXISTS users SCHEMALESS;
        DEFINE FIELD IF NOT EXISTS external_id ON TABLE users TYPE int;
        DEFINE FIELD IF NOT EXISTS profile ON TABLE users TYPE object;
        DEFINE FIELD IF NOT EXISTS created_at ON TABLE users VALUE $before OR time::now();
        DEFINE FIELD IF NOT EXISTS updated_at ON TABLE users VALUE time::now();
        DEFINE INDEX IF NOT EXISTS users_external_id ON TABLE users COLUMNS external_id UNIQUE;
    "#;

    db.query(schema).await?.check()?;
    info!("Database schema initialized successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection};

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let db = create_connection(&DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        ensure_schema(&db).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rejected_by_index() {
        let db = create_connection(&DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();

        db.query("CREATE users:1 SET external_id = 1, profile = {}")
            .await
            .unwrap()
            .check()
            .unwrap();

        let dup = db
            .query("CREATE users:2 SET external_id = 1, profile = {}")
            .await
            .unwrap()
            .check();
        assert!(dup.is_err());
    }
}
