//! Insurance Portal API Server

mod auth;
mod db;
mod error;
mod routes;
mod workers;

use anyhow::Context;
use ins_core::{AccountService, AccountStore, ContractService, ContractStore, Renderer, Uploads};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers
pub struct AppState {
    pub accounts: AccountService,
    pub contracts: ContractService,
    pub uploads: Uploads,
    pub config: AppConfig,
}

impl AppState {
    pub fn new<S>(config: AppConfig, store: Arc<S>) -> Self
    where
        S: AccountStore + ContractStore + 'static,
    {
        let uploads = Uploads::new(&config.upload_dir);
        let renderer =
            Renderer::new(&config.upload_dir).with_logo(config.logo_path.clone().map(PathBuf::from));

        Self {
            accounts: AccountService::new(store.clone(), uploads.clone()),
            contracts: ContractService::new(store.clone(), store, renderer, uploads.clone()),
            uploads,
            config,
        }
    }
}

/// Application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Token signing secret. Only required once a token is issued or checked.
    pub jwt_secret: Option<String>,
    pub upload_dir: String,
    pub logo_path: Option<String>,
    pub bind_addr: String,
    pub max_upload_size: usize,
    pub token_ttl_hours: i64,
    pub expiry_sweep_secs: u64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/insurance_portal".to_string()),
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            logo_path: std::env::var("LOGO_PATH").ok(),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            max_upload_size: env_or("MAX_UPLOAD_SIZE", 10 * 1024 * 1024), // 10MB
            token_ttl_hours: env_or("TOKEN_TTL_HOURS", 240),
            expiry_sweep_secs: env_or("EXPIRY_SWEEP_SECS", 3600),
            admin_email: std::env::var("ADMIN_EMAIL").ok(),
            admin_password: std::env::var("ADMIN_PASSWORD").ok(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ins_api=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Insurance Portal API Server");

    let config = AppConfig::default();
    if config.jwt_secret.is_none() {
        warn!("JWT_SECRET is not set; login and authenticated routes will fail");
    }

    // Connect to database
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("Failed to run migrations")?;

    info!("Database migrations complete");

    let store = Arc::new(db::PgStore::new(db));
    let state = Arc::new(AppState::new(config, store));

    state
        .uploads
        .ensure_dir()
        .await
        .context("Failed to create upload directory")?;

    if let (Some(email), Some(password)) = (&state.config.admin_email, &state.config.admin_password) {
        if state.accounts.ensure_admin(email, password).await? {
            info!("Bootstrap admin {} created", email);
        }
    }

    // Expire contracts in the background
    let sweep_every = Duration::from_secs(state.config.expiry_sweep_secs.max(1));
    tokio::spawn(workers::run_expiry_sweep(state.clone(), sweep_every));

    let addr = state.config.bind_addr.clone();
    let app = routes::app(state);

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
