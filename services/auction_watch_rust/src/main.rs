use anyhow::{Context, Result};
use auction_watch_core::clients::BattleNetClient;
use auction_watch_core::db::{create_pool, DbPoolConfig, NotificationStore, PgNotificationStore};
use auction_watch_core::notify::{NotificationSink, TelegramSink};
use auction_watch_core::providers::{MarketDataProvider, RetryingProvider};
use auction_watch_core::redis::RedisBus;
use auction_watch_core::retry::RetryPolicy;
use auction_watch_rust::{
    admin, Config, CycleStats, DiscoveryConfig, IntervalDiscoverer, PartitionWorker, Scheduler,
    SchedulerConfig,
};
use dotenv::dotenv;
use log::{info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    info!("Starting auction_watch...");

    let config = Config::from_env()?;

    let pool_config =
        DbPoolConfig::from_env_with_defaults(DbPoolConfig::for_workers(config.worker_pool_size));
    let pool = create_pool(&config.database_url, &pool_config).await?;
    let store = PgNotificationStore::new(pool);
    store.create_tables().await?;
    let store: Arc<dyn NotificationStore> = Arc::new(store);
    info!("Connected to database");

    let client = BattleNetClient::new(
        config.bnet_client_id.clone(),
        config.bnet_client_secret.clone(),
    )
    .context("Failed to create Battle.net client")?;
    let provider: Arc<dyn MarketDataProvider> = Arc::new(RetryingProvider::new(
        Arc::new(client),
        RetryPolicy::with_max_attempts(config.provider_max_attempts),
    ));

    let sink: Arc<dyn NotificationSink> =
        Arc::new(TelegramSink::new(config.telegram_bot_token.clone())?);

    let worker = Arc::new(PartitionWorker::new(store.clone(), provider.clone(), sink));
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        worker,
        SchedulerConfig::from(&config),
        Arc::new(CycleStats::new()),
    ));

    match RedisBus::new(&config.redis_url).await {
        Ok(bus) => {
            let listener_scheduler = scheduler.clone();
            tokio::spawn(async move {
                admin::command_listener(bus, listener_scheduler).await;
            });
        }
        Err(e) => warn!("Redis unavailable, check_now commands disabled: {:#}", e),
    }

    let ready =
        IntervalDiscoverer::new(store, provider, DiscoveryConfig::from(&config)).spawn();

    tokio::select! {
        _ = scheduler.run(ready) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, stopping auction_watch");
        }
    }

    Ok(())
}
