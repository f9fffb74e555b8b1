use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cinema_booking::{
    config::{Config, LogFormat},
    database::Database,
    router, AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_tracing(config: &Config) {
    let registry = tracing_subscriber::registry().with(EnvFilter::new(&config.app.rust_log));

    match config.app.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    info!(environment = %config.app.environment, "starting cinema booking API");

    // Connect to the database
    let db = Database::new(
        &config.database.url,
        config.database.pool_size,
        config.database.statement_timeout_ms,
    )
    .await
    .context("failed to connect to database")?;
    info!("database connected");

    db.run_migrations().await.context("failed to run migrations")?;

    let state = AppState::new(config.clone(), Arc::new(db));
    state
        .users
        .ensure_admin(&config.admin)
        .await
        .context("failed to seed admin user")?;

    let app = router(state);

    let host: std::net::IpAddr = config
        .app
        .host
        .parse()
        .with_context(|| format!("invalid HOST {}", config.app.host))?;
    let addr = SocketAddr::from((host, config.app.port));
    info!("server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
