use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info};

pub type Db = Surreal<Any>;

/// Upper bound on concurrently checked-out storage handles.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Number of handles exercised at startup before traffic is accepted.
pub const DEFAULT_MIN_CONNECTIONS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_connections: usize,
    pub min_connections: usize,
}

impl DatabaseConfig {
    /// In-memory database, used by tests and local runs.
    pub fn memory() -> Self {
        Self {
            url: "memory".to_string(),
            namespace: "auth".to_string(),
            database: "gateway".to_string(),
            username: None,
            password: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
        }
    }
}

pub async fn create_connection(config: &DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url.clone()).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await?;
    }

    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await?;

    Ok(db)
}

/// Bounded access to the shared database client.
///
/// The SurrealDB client multiplexes requests over one connection, so the pool
/// bounds concurrency with a semaphore instead of owning sockets. A checked-out
/// [`PooledDb`] returns its permit when dropped, whatever the call outcome was.
#[derive(Clone)]
pub struct DbPool {
    db: Db,
    permits: Arc<Semaphore>,
    max_connections: usize,
}

impl DbPool {
    pub fn new(db: Db, max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            db,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Connect, then exercise `min_connections` handles so that an unreachable
    /// store is reported before the listener is bound.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db = create_connection(config).await?;
        let pool = Self::new(db, config.max_connections);
        pool.warm(config.min_connections).await?;
        info!(
            max_connections = pool.max_connections,
            min_connections = config.min_connections,
            "Connected to database at {}",
            config.url
        );
        Ok(pool)
    }

    async fn warm(&self, count: usize) -> Result<()> {
        for n in 0..count.min(self.max_connections) {
            let conn = self.acquire().await?;
            conn.health().await?;
            debug!("Warm check {} passed", n + 1);
        }
        Ok(())
    }

    /// Check out a handle, waiting while all permits are in use.
    pub async fn acquire(&self) -> Result<PooledDb<'_>, PoolClosed> {
        let permit = self.permits.acquire().await.map_err(|_| PoolClosed)?;
        Ok(PooledDb {
            db: &self.db,
            _permit: permit,
        })
    }

    /// Permits not currently checked out.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Refuse further checkouts. In-flight holders keep their handles.
    pub fn close(&self) {
        self.permits.close();
        info!("Database pool closed");
    }
}

/// A checked-out database handle.
pub struct PooledDb<'a> {
    db: &'a Db,
    _permit: SemaphorePermit<'a>,
}

impl Deref for PooledDb<'_> {
    type Target = Db;

    fn deref(&self) -> &Db {
        self.db
    }
}

/// Returned by [`DbPool::acquire`] after [`DbPool::close`].
#[derive(Debug, Clone, Copy)]
pub struct PoolClosed;

impl std::fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "database pool is closed")
    }
}

impl std::error::Error for PoolClosed {}
