//! Startup configuration.
//!
//! Every setting comes from a CLI flag or its environment variable. The raw
//! arguments are validated once into a [`GatewayConfig`]; nothing reads the
//! environment after that.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Args;

use crate::auth::{
    DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_MAX_AGE_SECONDS, JwtTokenIssuer, TelegramInitDataVerifier,
};
use crate::db::{DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS, DatabaseConfig};
use crate::server::{DEFAULT_SHUTDOWN_TIMEOUT_SECONDS, normalize_listen_addr};
use crate::types::{TokenAudience, TokenIssuerName};

/// `JWT_ACCESS_TTL` is configured in whole minutes.
pub const DEFAULT_ACCESS_TTL_MINUTES: u64 = DEFAULT_ACCESS_TTL_SECONDS / 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting has no value
    Missing(&'static str),
    /// A setting has a value that cannot be used
    Invalid { name: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(name) => write!(f, "{} is required", name),
            Self::Invalid { name, reason } => write!(f, "{} is invalid: {}", name, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}

/// Storage connection settings, shared by `serve` and `init`.
#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// SurrealDB endpoint, e.g. ws://localhost:8000 or memory
    #[arg(long, env = "SURREALDB_URL")]
    pub db_url: Option<String>,
    #[arg(long, env = "SURREALDB_NAMESPACE", default_value = "auth")]
    pub db_namespace: String,
    #[arg(long, env = "SURREALDB_DATABASE", default_value = "gateway")]
    pub db_database: String,
    #[arg(long, env = "SURREALDB_USERNAME")]
    pub db_username: Option<String>,
    #[arg(long, env = "SURREALDB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,
    /// Maximum concurrent storage operations
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub db_max_connections: usize,
    /// Storage health checks run before serving
    #[arg(long, env = "DB_MIN_CONNECTIONS", default_value_t = DEFAULT_MIN_CONNECTIONS)]
    pub db_min_connections: usize,
}

impl DatabaseArgs {
    pub fn to_config(&self) -> Result<DatabaseConfig, ConfigError> {
        let url = required("SURREALDB_URL", self.db_url.as_deref())?;
        if self.db_max_connections == 0 {
            return Err(invalid("DB_MAX_CONNECTIONS", "must be greater than zero"));
        }
        if self.db_min_connections > self.db_max_connections {
            return Err(invalid(
                "DB_MIN_CONNECTIONS",
                format!("must not exceed DB_MAX_CONNECTIONS ({})", self.db_max_connections),
            ));
        }
        if self.db_username.is_some() != self.db_password.is_some() {
            return Err(invalid(
                "SURREALDB_USERNAME",
                "username and password must be set together",
            ));
        }

        Ok(DatabaseConfig {
            url: url.to_string(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_username.clone(),
            password: self.db_password.clone(),
            max_connections: self.db_max_connections,
            min_connections: self.db_min_connections,
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Listen address; `:8081` means all interfaces
    #[arg(long, env = "SERVER_ADDR", default_value = ":8081")]
    pub addr: String,
    /// Seconds to drain in-flight requests on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECONDS", default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECONDS)]
    pub shutdown_timeout_seconds: u64,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[arg(long, env = "JWT_ISSUER", default_value = "auth-gateway")]
    pub jwt_issuer: String,
    #[arg(long, env = "JWT_AUDIENCE", default_value = "api")]
    pub jwt_audience: String,
    /// Access token lifetime in minutes
    #[arg(long, env = "JWT_ACCESS_TTL", default_value_t = DEFAULT_ACCESS_TTL_MINUTES)]
    pub jwt_access_ttl: u64,
    /// HS256 signing key, standard base64
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,
    /// Oldest accepted init data, in seconds
    #[arg(
        long = "telegram-max-age-seconds",
        env = "TELEGRAM_INIT_DATA_MAX_AGE_SECONDS",
        default_value_t = DEFAULT_MAX_AGE_SECONDS
    )]
    pub telegram_max_age_seconds: u64,
}

/// Validated settings for the `serve` command.
#[derive(Clone)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub shutdown_grace: Duration,
    pub database: DatabaseConfig,
    pub jwt_issuer: TokenIssuerName,
    pub jwt_audience: TokenAudience,
    pub access_ttl: Duration,
    signing_key: Vec<u8>,
    bot_token: String,
    pub init_data_max_age: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("listen_addr", &self.listen_addr)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("database_url", &self.database.url)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("access_ttl", &self.access_ttl)
            .field("init_data_max_age", &self.init_data_max_age)
            .finish_non_exhaustive()
    }
}

impl GatewayConfig {
    pub fn from_args(args: &ServeArgs) -> Result<Self, ConfigError> {
        let listen_addr = args.addr.trim();
        if listen_addr.is_empty() {
            return Err(ConfigError::Missing("SERVER_ADDR"));
        }

        let database = args.database.to_config()?;

        let secret_b64 = required("JWT_SECRET", args.jwt_secret.as_deref())?;
        let signing_key = STANDARD
            .decode(secret_b64.trim())
            .map_err(|e| invalid("JWT_SECRET", e.to_string()))?;
        if signing_key.is_empty() {
            return Err(invalid("JWT_SECRET", "decodes to an empty key"));
        }

        let bot_token = required("TELEGRAM_BOT_TOKEN", args.telegram_bot_token.as_deref())?;
        let jwt_issuer = required("JWT_ISSUER", Some(args.jwt_issuer.as_str()))?;
        let jwt_audience = required("JWT_AUDIENCE", Some(args.jwt_audience.as_str()))?;

        Ok(Self {
            listen_addr: normalize_listen_addr(listen_addr),
            shutdown_grace: positive_seconds(
                "SHUTDOWN_TIMEOUT_SECONDS",
                args.shutdown_timeout_seconds,
            )?,
            database,
            jwt_issuer: TokenIssuerName::new(jwt_issuer),
            jwt_audience: TokenAudience::new(jwt_audience),
            access_ttl: positive_minutes("JWT_ACCESS_TTL", args.jwt_access_ttl)?,
            signing_key,
            bot_token: bot_token.to_string(),
            init_data_max_age: positive_seconds(
                "TELEGRAM_INIT_DATA_MAX_AGE_SECONDS",
                args.telegram_max_age_seconds,
            )?,
        })
    }

    pub fn token_issuer(&self) -> JwtTokenIssuer {
        JwtTokenIssuer::new(
            &self.signing_key,
            self.jwt_issuer.clone(),
            self.jwt_audience.clone(),
            self.access_ttl,
        )
    }

    pub fn identity_verifier(&self) -> Result<TelegramInitDataVerifier, ConfigError> {
        TelegramInitDataVerifier::new(&self.bot_token, self.init_data_max_age)
            .map_err(|e| invalid("TELEGRAM_BOT_TOKEN", e.to_string()))
    }
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, ConfigError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn positive_seconds(name: &'static str, seconds: u64) -> Result<Duration, ConfigError> {
    if seconds == 0 {
        return Err(invalid(name, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}

fn positive_minutes(name: &'static str, minutes: u64) -> Result<Duration, ConfigError> {
    let seconds = minutes
        .checked_mul(60)
        .ok_or_else(|| invalid(name, "too large"))?;
    positive_seconds(name, seconds)
}
