use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use ordpool_indexer::application::indexer::{BlockProcessor, Scheduler};
use ordpool_indexer::config::AppConfig;
use ordpool_indexer::domain::services::EnvelopeAnalyser;
use ordpool_indexer::infrastructure::bitcoin::ProviderFactory;
use ordpool_indexer::infrastructure::persistence::{DbPool, RepositoryFactory};
use ordpool_indexer::utils::clock::{SystemClock, TokioSleeper};
use ordpool_indexer::utils::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logger();

    logging::log_info(&format!(
        "Starting ordpool stats indexer v{}",
        env!("CARGO_PKG_VERSION")
    ));

    let config = AppConfig::from_env();

    logging::log_bitcoin_connection_details(
        &config.bitcoin.host,
        &config.bitcoin.port,
        &config.bitcoin.username,
        &config.bitcoin.network,
    );
    logging::log_info(&format!("Esplora fallback: {}", config.esplora.url));

    let db_pool = DbPool::new(&config.database)
        .await
        .context("connecting to the database")?;

    let repositories =
        RepositoryFactory::create_repositories(&db_pool, config.indexer.activity_batch_size);

    let primary = ProviderFactory::create_primary(&config.bitcoin)
        .context("creating Bitcoin Core provider")?;
    let fallback =
        ProviderFactory::create_fallback(&config.esplora).context("creating Esplora provider")?;

    let clock = Arc::new(SystemClock);
    let processor = BlockProcessor::new(
        primary,
        fallback,
        Arc::new(EnvelopeAnalyser::new()),
        Arc::new(repositories.ordpool_stats),
        clock.clone(),
        config.indexer.failover.cooldown,
        config.indexer.first_inscription_height,
    );
    let scheduler = Scheduler::new(
        Arc::new(processor),
        clock,
        config.indexer.scheduler.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            logging::log_error(&format!("Failed to listen for Ctrl+C: {}", e));
            std::future::pending::<()>().await;
        }
        logging::log_info("Shutdown requested, finishing current cycle");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run_forever(&TokioSleeper, shutdown_rx).await;
    Ok(())
}
