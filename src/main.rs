use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dealtracker::config::Config;
use dealtracker::dedup::DedupConfig;
use dealtracker::registry::Registry;
use dealtracker::scheduler::{IngestScheduler, Pipeline};
use dealtracker::store::{ItemStore, PgItemStore};
use dealtracker::{db, routes};

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(pool: PgPool) -> impl IntoResponse {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&pool).await;
    match result {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dealtracker=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        tracing::info!("Migrations complete");
    }

    let registry = Arc::new(Registry::from_file(&config.sources_file)?);
    tracing::info!(
        sources = registry.list_enabled().len(),
        "Loaded source catalog from {}",
        config.sources_file
    );

    let store: Arc<dyn ItemStore> = Arc::new(PgItemStore::new(pool.clone()));
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch_timeout_secs))
        .user_agent(concat!("dealtracker/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let pipeline = Arc::new(Pipeline::new(
        registry,
        store,
        DedupConfig {
            window_days: config.dedup_window_days,
            discovery_threshold: config.dedup_discovery_threshold,
            acceptance_threshold: config.dedup_acceptance_threshold,
        },
        http,
        Duration::from_secs(config.fetch_timeout_secs),
    ));

    let scheduler = IngestScheduler::new(pipeline.clone()).await?;
    if config.scheduler_enabled {
        let registered = scheduler.register_all().await?;
        scheduler.start().await?;
        tracing::info!(registered, "Recurring ingestion schedules started");
    } else {
        tracing::info!("Scheduler disabled, sources run on manual triggers only");
    }

    let readyz_pool = pool.clone();
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(move || readyz(readyz_pool.clone())))
        .merge(routes::api::router(pipeline))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
