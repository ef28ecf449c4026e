//! Tokenward server binary.
//!
//! Loads token configuration from the environment (a missing or malformed
//! signing key aborts startup), selects a principal store and serves the
//! authentication API.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokenward_api::{AppState, config::ApiConfig};
use tokenward_core::auth::{AuthService, BcryptCredentials};
use tokenward_core::config::AuthConfig;
use tokenward_core::store::{MemoryPrincipalStore, PgPrincipalStore, PrincipalStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "tokenward_server", about = "Tokenward authentication server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3100")]
    bind: String,

    /// PostgreSQL connection URL. Without it principals live in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Send the refresh-token cookie without the `Secure` attribute
    /// (plain-HTTP development only).
    #[arg(long, default_value_t = false)]
    insecure_cookies: bool,
}

impl Args {
    /// Layer command-line flags over the environment configuration.
    fn api_config(&self, mut config: ApiConfig) -> ApiConfig {
        config.bind_addr = self.bind.clone();
        if let Some(url) = self.database_url.as_ref().filter(|url| !url.is_empty()) {
            config.database_url = Some(url.clone());
        }
        if self.insecure_cookies {
            config.cookie_secure = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,tokenward_api=debug,tokenward_core=debug,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();

    // Fatal: never start without a usable signing key.
    let auth_config = AuthConfig::from_env()?;
    info!(
        issuer = %auth_config.issuer,
        audience = %auth_config.audience,
        access_token_minutes = auth_config.access_token_minutes,
        refresh_token_days = auth_config.refresh_token_days,
        "token configuration loaded"
    );

    let config = args.api_config(ApiConfig::from_env());

    let store: Arc<dyn PrincipalStore> = match &config.database_url {
        Some(url) => {
            info!(max_connections = args.max_connections, "connecting to PostgreSQL");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(std::time::Duration::from_secs(30))
                .connect(url)
                .await?;

            info!("running database migrations");
            tokenward_core::migrate::migrate(&pool).await?;
            Arc::new(PgPrincipalStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, principals are kept in memory");
            Arc::new(MemoryPrincipalStore::new())
        }
    };

    let auth = AuthService::new(&auth_config, store, Arc::new(BcryptCredentials::default()))?;

    let app = tokenward_api::router(AppState {
        auth,
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
            }
            shutdown.cancel();
        }
    });

    info!(addr = %local_addr, version = tokenward_core::version(), "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
