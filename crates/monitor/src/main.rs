use std::time::Duration;

use ranap_common::config::Settings;
use ranap_common::db;
use ranap_engine::diagnostics;
use ranap_engine::processor::QueueProcessor;
use ranap_engine::queries::MySqlQueueStore;
use ranap_engine::scheduler::Scheduler;
use ranap_notifier::{TelegramNotifier, WhatsAppNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ranap_monitor=info,ranap_engine=info,ranap_notifier=info,ranap_common=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("Ranap notification monitor starting...");

    // Load configuration
    let settings = Settings::load()?;
    tracing::info!(summary = %settings.summary(), "Configuration summary");

    // Connect to database
    let pool = db::create_pool(&settings.database).await?;

    // Delivery channels, primary first
    let telegram = TelegramNotifier::new(&settings.telegram)?;
    let whatsapp = WhatsAppNotifier::new(&settings.whatsapp, Some(settings.app.footer_text()))?;

    let report = diagnostics::test_connections(&pool, &telegram, &whatsapp).await;
    if !report.all_ok() {
        tracing::warn!(?report, "Some connections unavailable, continuing");
    }

    let processor = QueueProcessor::new(
        MySqlQueueStore::new(pool),
        vec![Box::new(telegram), Box::new(whatsapp)],
    );

    let scheduler = Scheduler::new(Duration::from_secs(settings.app.check_interval));
    let handle = scheduler.handle();

    // Stop the loop on Ctrl+C
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Received shutdown signal, stopping gracefully...");
        handle.stop();
    });

    let cycles = scheduler.run(&processor).await;

    tracing::info!(cycles, "Ranap notification monitor stopped.");
    Ok(())
}
