//! Bizsync Server binary.

use std::sync::Arc;

use bizsync_server::adapters::GoogleAdapters;
use bizsync_server::config::Config;
use bizsync_server::db::{self, PgLocalStore, PgSyncLog, PgWatermarkStore};
use bizsync_server::google::{ClientFactory, Endpoints};
use bizsync_server::store::{LocalStore, SyncLogSink, WatermarkStore};
use bizsync_server::sync::{run_schedule, EngineSettings, RetryPolicy, RunRegistry, SyncEngine};
use bizsync_server::{routes, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bizsync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Bizsync Server on {}:{}", config.host, config.port);
    if !config.directory_available() {
        tracing::warn!("directory credentials not configured, sync runs will be skipped");
    }

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Wire the engine
    let mut factory = ClientFactory::new(config.directory.clone());
    if let Some(base_url) = &config.api_base_url {
        tracing::info!("directory APIs served from {}", base_url);
        factory = factory.with_endpoints(Endpoints::all_at(base_url));
    }
    let factory = Arc::new(factory);
    let store: Arc<dyn LocalStore> = Arc::new(PgLocalStore::new(pool.clone()));
    let watermarks: Arc<dyn WatermarkStore> = Arc::new(PgWatermarkStore::new(pool.clone()));
    let log: Arc<dyn SyncLogSink> = Arc::new(PgSyncLog::new(pool));
    let settings = EngineSettings {
        page_size: config.sync.page_size,
        retry: RetryPolicy::new(config.sync.max_attempts, config.sync.retry_base_delay),
    };
    let engine = Arc::new(SyncEngine::new(
        Arc::new(GoogleAdapters::new(factory)),
        store,
        Arc::clone(&watermarks),
        Arc::clone(&log),
        settings,
    ));
    let runs = RunRegistry::new();

    if let Some(schedule) = config.sync.schedule.clone() {
        tokio::spawn(run_schedule(Arc::clone(&engine), runs.clone(), schedule));
    }

    // Build application state
    let state = AppState {
        config: Arc::new(config.clone()),
        engine,
        runs,
        watermarks,
        log,
    };

    // Build router
    let app = routes::app(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
