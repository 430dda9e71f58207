use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kitchen_log::api::{create_router, AppState};
use kitchen_log::config::{AppConfig, ScanConfig};
use kitchen_log::db;
use kitchen_log::gemini::GeminiClient;
use kitchen_log::import::import_catalog_file;
use kitchen_log::scan::ReceiptScanner;

/// LOG_FORMAT=json switches to JSON lines; RUST_LOG filters (default "info")
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting Kitchen Log");

    let config = AppConfig::from_env()?;
    let scan_config = ScanConfig::from_env()?;

    if scan_config.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; receipt scanning will fail upstream");
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    db::init_database_schema(&pool)
        .await
        .context("Failed to initialize database schema")?;

    if let Some(path) = &config.import_path {
        if path.exists() {
            let summary = import_catalog_file(&pool, path).await?;
            info!(
                created = summary.created,
                existing = summary.existing,
                skipped = summary.skipped,
                "Ingredient catalog ready"
            );
        } else {
            warn!(path = %path.display(), "Ingredient import file not found, skipping import");
        }
    }

    let model = Arc::new(GeminiClient::new(&scan_config));
    let scanner = ReceiptScanner::new(model, scan_config);
    let app = create_router(AppState::new(pool, scanner));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
