//! Ranap Monitor Diagnostics
//!
//! One-shot operator check of a deployment: prints the resolved configuration
//! (secrets masked), checks the database and Telegram, lists the pending
//! queue without touching it, and optionally sends a sample notification.
//!
//! ## Usage
//!
//! ```bash
//! # Configuration, connectivity and pending queue only
//! cargo run --bin diagnose
//!
//! # Also send a sample message through each channel
//! DIAGNOSE_TELEGRAM_CHAT_ID=123456789 DIAGNOSE_WHATSAPP_NUMBER=081234567890 \
//!   cargo run --bin diagnose
//! ```
//!
//! Queue rows are never updated; the sample message is sent directly to the
//! given addresses.

use ranap_common::config::Settings;
use ranap_common::db;
use ranap_common::types::{NotificationRecord, NotificationType, Sex};
use ranap_engine::diagnostics;
use ranap_engine::queries::MySqlQueueStore;
use ranap_notifier::message;
use ranap_notifier::whatsapp::normalize_phone;
use ranap_notifier::{Notifier, TelegramNotifier, WhatsAppNotifier};

const RULE: &str = "──────────────────────────────────────────────────────────────";

fn status(ok: bool) -> &'static str {
    if ok { "OK" } else { "FAILED" }
}

fn env_address(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Synthetic admission addressed to the operator-supplied contacts.
fn sample_record(
    telegram_id: Option<String>,
    whatsapp_number: Option<String>,
) -> NotificationRecord {
    let now = message::wib_now();
    NotificationRecord {
        id: 0,
        admission_ref: "DIAGNOSE/0000".to_string(),
        notification_type: NotificationType::NewPatientDpjp,
        created_at: now,
        room_code: "TEST".to_string(),
        ward_code: "TEST".to_string(),
        ward_name: "Uji Coba".to_string(),
        diagnosis: Some("Pesan uji coba, abaikan".to_string()),
        admitted_at: Some(now),
        medical_record_no: "000000".to_string(),
        patient_name: "PASIEN UJI COBA".to_string(),
        sex: Sex::Unknown,
        doctor_name: "Operator".to_string(),
        telegram_id,
        whatsapp_number,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ranap_engine=info,ranap_notifier=info,ranap_common=info".into()
            }),
        )
        .init();

    let settings = Settings::load()?;

    println!();
    println!("Ranap Monitor Diagnostics");
    println!("{}", RULE);
    println!("{}", settings.summary());
    println!();

    let telegram = TelegramNotifier::new(&settings.telegram)?;
    let whatsapp = WhatsAppNotifier::new(&settings.whatsapp, Some(settings.app.footer_text()))?;

    println!("  ── Connections ───────────────────────────────────────────");
    let pool = match db::create_pool(&settings.database).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            println!("  Database:           FAILED ({})", e);
            None
        }
    };

    if let Some(pool) = &pool {
        let report = diagnostics::test_connections(pool, &telegram, &whatsapp).await;
        println!("  Database:           {}", status(report.database));
        println!("  Telegram:           {}", status(report.telegram));
        println!(
            "  WhatsApp:           {}",
            if report.whatsapp_enabled { "enabled" } else { "disabled" }
        );
    } else {
        let telegram_ok = telegram.is_enabled() && telegram.test_connection().await;
        println!("  Telegram:           {}", status(telegram_ok));
        println!(
            "  WhatsApp:           {}",
            if whatsapp.is_enabled() { "enabled" } else { "disabled" }
        );
    }
    println!();

    if let Some(pool) = pool {
        println!("  ── Pending Queue ─────────────────────────────────────────");
        let store = MySqlQueueStore::new(pool);
        match store.try_fetch_batch().await {
            Ok(batch) if batch.records.is_empty() && batch.rejected.is_empty() => {
                println!("  No pending notifications")
            }
            Ok(batch) => {
                for r in &batch.records {
                    println!(
                        "  #{:<6} {:<20} {:<18} {:<24} tg={} wa={}",
                        r.id,
                        r.notification_type.to_string(),
                        r.admission_ref,
                        r.doctor_name,
                        if r.telegram_chat_id().is_some() { "yes" } else { "no" },
                        if r.whatsapp_address().is_some() { "yes" } else { "no" },
                    );
                }
                for rejected in &batch.rejected {
                    println!("  #{:<6} UNREADABLE: {}", rejected.id, rejected.error);
                }
            }
            Err(e) => println!("  Query failed: {}", e),
        }
        println!();
    }

    let telegram_target = env_address("DIAGNOSE_TELEGRAM_CHAT_ID");
    let whatsapp_target = env_address("DIAGNOSE_WHATSAPP_NUMBER");
    if telegram_target.is_some() || whatsapp_target.is_some() {
        println!("  ── Sample Notification ───────────────────────────────────");
        let record = sample_record(telegram_target, whatsapp_target);

        if let Some(chat_id) = record.telegram_chat_id() {
            match telegram.try_send(&record).await {
                Ok(()) => println!("  Telegram -> {}:  sent", chat_id),
                Err(e) => println!("  Telegram -> {}:  {}", chat_id, e),
            }
        }
        if let Some(number) = record.whatsapp_address() {
            let receiver = normalize_phone(number);
            match whatsapp.try_send(&record).await {
                Ok(()) => println!("  WhatsApp -> {}:  sent", receiver),
                Err(e) => println!("  WhatsApp -> {}:  {}", receiver, e),
            }
        }
        println!();
    }

    println!("{}", RULE);
    Ok(())
}
