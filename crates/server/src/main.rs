use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use omnibase_catalog::cache::UsageBudgetedCache;
use omnibase_catalog::import::ImportOrchestrator;
use omnibase_catalog::lookup::Catalog;
use omnibase_catalog::streaming::StreamingAvailabilityClient;
use omnibase_core::clock::{Clock, SystemClock};
use omnibase_server::ai::SettingsCompletionClient;
use omnibase_server::config::ServerConfig;
use omnibase_server::state::{AppState, ServerEvent};
use omnibase_store::Store;
use omnibase_store::backend::FileBackend;
use omnibase_store::repo::settings::SettingsRepo;
use omnibase_store::repo::usage::UsageBudget;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();
    std::fs::create_dir_all(&config.data_dir).context("failed to create data dir")?;
    info!(data_dir = %config.data_dir.display(), region = %config.region, "opening store");

    let store = Store::new(Arc::new(FileBackend::new(config.data_dir.clone())));
    let settings = SettingsRepo::new(store.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let budget = UsageBudget::new(store.clone(), clock.clone(), config.monthly_limit);
    let cache = UsageBudgetedCache::new(store.clone(), budget, clock.clone());
    let provider = Arc::new(StreamingAvailabilityClient::new(
        settings.clone(),
        config.streaming_api_key.clone(),
    ));
    let catalog = Arc::new(Catalog::new(provider, cache, config.region.clone()));
    let importer = Arc::new(
        ImportOrchestrator::new(catalog.clone(), clock.clone()).with_pace(config.import_pace),
    );

    // Event broadcast channel
    let (events_tx, _) = tokio::sync::broadcast::channel::<ServerEvent>(256);

    // Spawn heartbeat emitter
    {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            let mut seq = 0u64;
            loop {
                tokio::time::sleep(Duration::from_secs(30)).await;
                let _ = tx.send(ServerEvent::Heartbeat { seq });
                seq += 1;
            }
        });
    }

    let app_state = AppState {
        store,
        ai: Arc::new(SettingsCompletionClient::new(settings.clone())),
        settings,
        catalog,
        importer,
        clock,
        events: events_tx,
    };

    let app = omnibase_server::routes::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .context("failed to bind")?;
    info!(addr = %config.bind, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
