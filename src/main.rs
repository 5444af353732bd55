use anyhow::Context;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use event_booking::{config::Config, controllers, database::Database, store::PgStore, AppState};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting event booking API");

    // Connect to the database
    let db = Database::new(&config.database.url, config.database.pool_size)
        .await
        .context("failed to connect to database")?;
    info!("Database connected");

    // Run migrations
    db.run_migrations()
        .await
        .context("failed to run migrations")?;

    // The authoritative seat counters live in Postgres; every worker process
    // sharing this database stays correct.
    let store = Arc::new(PgStore::new(db.pool.clone()));
    let state = AppState::from_store(config.clone(), store);

    let app = controllers::router(state);

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("invalid HOST/PORT bind address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app.into_make_service())
        .await
        .context("server error")?;
    Ok(())
}
