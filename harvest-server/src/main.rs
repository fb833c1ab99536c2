//! # Harvest Server
//!
//! Coordination server for a fleet of download workers harvesting a
//! rate-limited public court registry.
//!
//! - **Task leasing**: row-lock-and-skip claims, at most one worker per task
//! - **Worker fleet**: registration, heartbeat liveness, statistics
//! - **Document registry**: dedup, metadata merge, region classification
//! - **Recovery**: timeout-based stale-task sweep, no worker cooperation
//!   required
//!
//! Built on axum over PostgreSQL, with Redis as an optional read cache.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harvest_core::{CourtClassifier, Database, RedisCache};
use harvest_server::notify::{NoopNotifier, Notify, WebhookNotifier};
use harvest_server::{AppState, Config, create_app, sweep};

#[derive(Parser, Debug)]
#[command(name = "harvest-server")]
#[command(about = "Coordination server for court-registry download workers")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply database migrations and exit
    Migrate,
    /// Reset tasks stuck in_progress past the timeout, then exit
    ResetStale,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(port) = cli.serve.port {
        config.server_port = port;
    }
    if let Some(host) = cli.serve.host.clone() {
        config.server_host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Some(Command::Migrate) => run_migrate(&config).await,
        Some(Command::ResetStale) => run_reset_stale(&config).await,
        None => run_server(config).await,
    }
}

async fn connect_database(config: &Config) -> anyhow::Result<Database> {
    Database::connect(
        &config.database_url,
        config.db_pool_min_connections,
        config.db_pool_max_connections,
    )
    .await
    .context("failed to connect to PostgreSQL")
}

async fn run_migrate(config: &Config) -> anyhow::Result<()> {
    let db = connect_database(config).await?;
    db.run_migrations().await?;
    Ok(())
}

async fn run_reset_stale(config: &Config) -> anyhow::Result<()> {
    let db = connect_database(config).await?;
    let reset = db.tasks().reset_stale(config.task_timeout()).await?;
    info!("Reset {} stale tasks", reset);
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);

    let db = connect_database(&config).await?;
    db.run_migrations().await?;

    let cache = build_cache(&config).await;

    let notifier: Arc<dyn Notify> = match &config.notify_webhook_url {
        Some(url) => {
            info!("Operator notifications posting to {}", url);
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => Arc::new(NoopNotifier),
    };

    let state = AppState::new(
        db,
        cache,
        config.clone(),
        Arc::new(CourtClassifier),
        notifier,
    );

    sweep::spawn_sweep(state.clone());

    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid server host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

/// Connect the cache when enabled and configured. Startup never fails on
/// an unreachable Redis; the server just runs uncached.
async fn build_cache(config: &Config) -> Option<RedisCache> {
    if !config.cache_enabled {
        info!("Cache disabled by configuration");
        return None;
    }
    let url = config.redis_url.as_ref()?;
    match RedisCache::new(url).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Redis unavailable, continuing without cache: {e}");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install shutdown handler: {e}");
    } else {
        info!("Shutdown signal received");
    }
}
