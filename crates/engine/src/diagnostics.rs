//! Startup connectivity checks.
//!
//! Purely informational: a failed check is logged and reported, never fatal.

use sqlx::MySqlPool;

use ranap_common::db;
use ranap_notifier::{Notifier, TelegramNotifier, WhatsAppNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionReport {
    pub database: bool,
    pub telegram: bool,
    /// WhatsApp has no health endpoint; only the enabled flag is reported.
    pub whatsapp_enabled: bool,
}

impl ConnectionReport {
    pub fn all_ok(&self) -> bool {
        self.database && self.telegram && self.whatsapp_enabled
    }
}

/// Check the database and Telegram, and report the WhatsApp channel state.
pub async fn test_connections(
    pool: &MySqlPool,
    telegram: &TelegramNotifier,
    whatsapp: &WhatsAppNotifier,
) -> ConnectionReport {
    tracing::info!("Testing connections");

    let database = db::ping(pool).await;
    if database {
        tracing::info!("Database connection OK");
    } else {
        tracing::error!("Database connection failed");
    }

    let telegram_ok = if !telegram.is_enabled() {
        tracing::warn!("Telegram notification disabled");
        false
    } else if telegram.test_connection().await {
        tracing::info!("Telegram connection OK");
        true
    } else {
        tracing::error!("Telegram connection failed");
        false
    };

    let whatsapp_enabled = whatsapp.is_enabled();
    if whatsapp_enabled {
        tracing::info!("WhatsApp notification enabled");
    } else {
        tracing::warn!("WhatsApp notification disabled");
    }

    ConnectionReport {
        database,
        telegram: telegram_ok,
        whatsapp_enabled,
    }
}
