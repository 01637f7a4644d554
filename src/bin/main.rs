use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use tg_auth_gateway::{
    DatabaseArgs, GatewayConfig, ServeArgs, Server, ShutdownOutcome, build_app,
    create_connection, ensure_schema, shutdown_signal,
};

#[derive(Parser)]
#[command(name = "tg-auth-gateway")]
#[command(about = "Telegram login gateway issuing short-lived JWTs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the login and profile API
    Serve(ServeArgs),
    /// Apply the database schema and exit
    Init(DatabaseArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tg_auth_gateway=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = GatewayConfig::from_args(&args)?;
            info!(
                "Starting gateway on {} (issuer={}, audience={}, ttl={}s)",
                config.listen_addr,
                config.jwt_issuer,
                config.jwt_audience,
                config.access_ttl.as_secs()
            );
            info!("Using database url: {}", config.database.url);

            let (router, pool) = build_app(&config).await?;
            let server = Server::bind(&config.listen_addr).await?;

            let outcome = server
                .run(router, shutdown_signal(), config.shutdown_grace)
                .await?;
            if outcome == ShutdownOutcome::Forced {
                warn!(
                    "Forced shutdown after {}s grace period",
                    config.shutdown_grace.as_secs()
                );
            }

            pool.close();
        }
        Commands::Init(args) => {
            let db_config = args.to_config()?;
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = create_connection(&db_config).await?;
            ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
    }

    Ok(())
}
