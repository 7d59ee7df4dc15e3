//! Notification queue processing.
//!
//! Each cycle:
//! 1. Fetches up to ten pending notifications, oldest first
//! 2. Tries every channel in order for each notification, one after another
//! 3. Reduces the channel results: any success means `sent`
//! 4. Writes `sent` or `failed` (with a reason) back to the queue row
//!
//! A panicking channel counts as a failed attempt on that channel, and a
//! panic anywhere in a record's delivery marks only that record as failed.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;

use ranap_common::types::{Channel, NotificationRecord, QueueOutcome};
use ranap_notifier::Notifier;

use crate::panic_message;
use crate::queries::NotificationStore;
use crate::scheduler::PollJob;

/// Counts for one processing cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetched: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Drives pending notifications through the configured channels.
pub struct QueueProcessor<S> {
    store: S,
    channels: Vec<Box<dyn Notifier>>,
}

impl<S: NotificationStore> QueueProcessor<S> {
    /// `channels` are attempted in the given order for every record.
    pub fn new(store: S, channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { store, channels }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process one batch of pending notifications.
    pub async fn process_queue(&self) -> CycleSummary {
        tracing::info!("Checking notification queue");

        let pending = self.store.fetch_pending().await;
        if pending.is_empty() {
            tracing::info!("No pending notifications");
            return CycleSummary::default();
        }

        tracing::info!(count = pending.len(), "Found pending notifications");

        let mut summary = CycleSummary {
            fetched: pending.len(),
            ..Default::default()
        };

        for record in &pending {
            match self.process_record(record).await {
                QueueOutcome::Sent => summary.sent += 1,
                QueueOutcome::Failed(_) => summary.failed += 1,
            }
        }

        summary
    }

    /// Deliver one notification and persist its terminal status.
    pub async fn process_record(&self, record: &NotificationRecord) -> QueueOutcome {
        let outcome = match AssertUnwindSafe(self.deliver(record)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(&*payload);
                tracing::error!(
                    notification_id = record.id,
                    error = %message,
                    "Error processing notification"
                );
                QueueOutcome::Failed(message)
            }
        };

        self.store.update_status(record.id, &outcome).await;
        outcome
    }

    async fn deliver(&self, record: &NotificationRecord) -> QueueOutcome {
        tracing::info!(
            notification_id = record.id,
            patient = %record.patient_name,
            notification_type = %record.notification_type,
            "Processing notification"
        );

        let mut results = Vec::with_capacity(self.channels.len());
        for notifier in &self.channels {
            let sent = self.attempt(notifier.as_ref(), record).await;
            results.push((notifier.channel(), sent));
        }

        let delivered = results.iter().any(|(_, sent)| *sent);
        let channels = results
            .iter()
            .map(|(channel, sent)| format!("{}={}", channel, if *sent { "ok" } else { "failed" }))
            .collect::<Vec<_>>()
            .join(" ");

        if delivered {
            tracing::info!(notification_id = record.id, %channels, "Notification sent");
            QueueOutcome::Sent
        } else {
            let reason = failure_reason(record);
            tracing::error!(
                notification_id = record.id,
                %channels,
                reason = %reason,
                "Notification failed on every channel"
            );
            QueueOutcome::Failed(reason)
        }
    }

    /// One channel attempt. Never propagates a failure.
    async fn attempt(&self, notifier: &dyn Notifier, record: &NotificationRecord) -> bool {
        let channel = notifier.channel();

        if record.address_for(channel).is_none() {
            tracing::warn!(
                notification_id = record.id,
                %channel,
                doctor = %record.doctor_name,
                "Physician has no address for channel"
            );
            return false;
        }

        match AssertUnwindSafe(notifier.send_patient_notification(record))
            .catch_unwind()
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(notification_id = record.id, %channel, "Channel send failed");
                false
            }
            Err(payload) => {
                tracing::error!(
                    notification_id = record.id,
                    %channel,
                    error = %panic_message(&*payload),
                    "Channel send error"
                );
                false
            }
        }
    }
}

/// Explain why no channel delivered, based on which addresses are on file.
pub fn failure_reason(record: &NotificationRecord) -> String {
    let has_telegram = record.address_for(Channel::Telegram).is_some();
    let has_whatsapp = record.address_for(Channel::WhatsApp).is_some();

    match (has_telegram, has_whatsapp) {
        (false, false) => "Doctor has no Telegram ID or WhatsApp number",
        (false, true) => "Doctor has no Telegram ID, WhatsApp send failed",
        (true, false) => "Doctor has no WhatsApp number, Telegram send failed",
        (true, true) => "Failed to send via both Telegram and WhatsApp",
    }
    .to_string()
}

#[async_trait]
impl<S: NotificationStore> PollJob for QueueProcessor<S> {
    async fn run_cycle(&self) -> anyhow::Result<()> {
        let summary = self.process_queue().await;
        if summary.fetched > 0 {
            tracing::info!(
                fetched = summary.fetched,
                sent = summary.sent,
                failed = summary.failed,
                "Queue cycle complete"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;
    use ranap_common::types::{NotificationType, Sex};

    use super::*;

    /// In-memory queue that records every status write.
    #[derive(Default)]
    struct FakeStore {
        pending: Mutex<Vec<NotificationRecord>>,
        updates: Mutex<Vec<(i64, QueueOutcome)>>,
    }

    impl FakeStore {
        fn with(records: Vec<NotificationRecord>) -> Self {
            Self {
                pending: Mutex::new(records),
                updates: Mutex::new(Vec::new()),
            }
        }

        fn updates(&self) -> Vec<(i64, QueueOutcome)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationStore for FakeStore {
        async fn fetch_pending(&self) -> Vec<NotificationRecord> {
            self.pending.lock().unwrap().clone()
        }

        async fn update_status(&self, id: i64, outcome: &QueueOutcome) {
            self.pending.lock().unwrap().retain(|r| r.id != id);
            self.updates.lock().unwrap().push((id, outcome.clone()));
        }
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Panic,
    }

    struct FakeNotifier {
        channel: Channel,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        fn channel(&self) -> Channel {
            self.channel
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn send_patient_notification(&self, _record: &NotificationRecord) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => true,
                Behavior::Fail => false,
                Behavior::Panic => panic!("provider client exploded"),
            }
        }
    }

    /// Telegram channel that panics the first time it is asked which channel it is.
    #[derive(Default)]
    struct TrippingNotifier {
        tripped: AtomicBool,
    }

    #[async_trait]
    impl Notifier for TrippingNotifier {
        fn channel(&self) -> Channel {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                panic!("channel registry corrupted");
            }
            Channel::Telegram
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn send_patient_notification(&self, _record: &NotificationRecord) -> bool {
            true
        }
    }

    /// Returns the notifier and a handle to its call counter.
    fn notifier(channel: Channel, behavior: Behavior) -> (Box<dyn Notifier>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let notifier = FakeNotifier {
            channel,
            behavior,
            calls: calls.clone(),
        };
        (Box::new(notifier), calls)
    }

    fn record(id: i64, telegram: Option<&str>, whatsapp: Option<&str>) -> NotificationRecord {
        let at = NaiveDate::from_ymd_opt(2025, 3, 14)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap();
        NotificationRecord {
            id,
            admission_ref: format!("2025/03/14/{:06}", id),
            notification_type: NotificationType::NewPatientDpjp,
            created_at: at,
            room_code: "VIP01".to_string(),
            ward_code: "B01".to_string(),
            ward_name: "Melati".to_string(),
            diagnosis: None,
            admitted_at: Some(at),
            medical_record_no: "000456".to_string(),
            patient_name: "Budi".to_string(),
            sex: Sex::Male,
            doctor_name: "dr. Sari".to_string(),
            telegram_id: telegram.map(str::to_string),
            whatsapp_number: whatsapp.map(str::to_string),
        }
    }

    fn failed(reason: &str) -> QueueOutcome {
        QueueOutcome::Failed(reason.to_string())
    }

    fn processor(
        store: FakeStore,
        telegram: Behavior,
        whatsapp: Behavior,
    ) -> (QueueProcessor<FakeStore>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let (tg, tg_calls) = notifier(Channel::Telegram, telegram);
        let (wa, wa_calls) = notifier(Channel::WhatsApp, whatsapp);
        (QueueProcessor::new(store, vec![tg, wa]), tg_calls, wa_calls)
    }

    #[tokio::test]
    async fn test_empty_queue_is_noop() {
        let (processor, tg, wa) =
            processor(FakeStore::default(), Behavior::Succeed, Behavior::Succeed);

        let summary = processor.process_queue().await;
        assert_eq!(summary, CycleSummary::default());
        assert!(processor.store().updates().is_empty());
        assert_eq!(tg.load(Ordering::SeqCst), 0);
        assert_eq!(wa.load(Ordering::SeqCst), 0);

        // Running again stays a no-op
        processor.process_queue().await;
        assert!(processor.store().updates().is_empty());
    }

    #[tokio::test]
    async fn test_no_addresses_fails_without_calls() {
        let store = FakeStore::with(vec![record(1, None, None)]);
        let (processor, tg, wa) = processor(store, Behavior::Succeed, Behavior::Succeed);

        let summary = processor.process_queue().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(
            processor.store().updates(),
            vec![(1, failed("Doctor has no Telegram ID or WhatsApp number"))]
        );
        assert_eq!(tg.load(Ordering::SeqCst), 0);
        assert_eq!(wa.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_placeholder_whatsapp_number_counts_as_missing() {
        let store = FakeStore::with(vec![record(1, None, Some("-"))]);
        let (processor, tg, wa) = processor(store, Behavior::Succeed, Behavior::Succeed);

        let summary = processor.process_queue().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(
            processor.store().updates(),
            vec![(1, failed("Doctor has no Telegram ID or WhatsApp number"))]
        );
        assert_eq!(tg.load(Ordering::SeqCst), 0);
        assert_eq!(wa.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_channel_success_is_sent() {
        let store = FakeStore::with(vec![
            record(1, Some("555001"), None),
            record(2, Some("555002"), Some("0857")),
        ]);
        let (processor, tg, wa) = processor(store, Behavior::Succeed, Behavior::Fail);

        let summary = processor.process_queue().await;
        assert_eq!((summary.fetched, summary.sent, summary.failed), (2, 2, 0));
        assert_eq!(
            processor.store().updates(),
            vec![(1, QueueOutcome::Sent), (2, QueueOutcome::Sent)]
        );
        assert_eq!(tg.load(Ordering::SeqCst), 2);
        // Only record 2 has a WhatsApp number
        assert_eq!(wa.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_secondary_success_after_primary_failure() {
        let store = FakeStore::with(vec![record(3, Some("555003"), Some("0857"))]);
        let (processor, tg, wa) = processor(store, Behavior::Fail, Behavior::Succeed);

        assert_eq!(processor.process_queue().await.sent, 1);
        assert_eq!(tg.load(Ordering::SeqCst), 1);
        assert_eq!(wa.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_reason_reflects_addresses() {
        let store = FakeStore::with(vec![
            record(1, Some("555001"), Some("0857")),
            record(2, None, Some("0857")),
            record(3, Some("555003"), None),
        ]);
        let (processor, _, _) = processor(store, Behavior::Fail, Behavior::Fail);

        let summary = processor.process_queue().await;
        assert_eq!(summary.failed, 3);
        assert_eq!(
            processor.store().updates(),
            vec![
                (1, failed("Failed to send via both Telegram and WhatsApp")),
                (2, failed("Doctor has no Telegram ID, WhatsApp send failed")),
                (3, failed("Doctor has no WhatsApp number, Telegram send failed")),
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_panic_does_not_stop_next_channel() {
        let store = FakeStore::with(vec![record(1, Some("555001"), Some("0857"))]);
        let (processor, tg, wa) = processor(store, Behavior::Panic, Behavior::Succeed);

        let summary = processor.process_queue().await;
        assert_eq!(summary.sent, 1);
        assert_eq!(tg.load(Ordering::SeqCst), 1);
        assert_eq!(wa.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_channels_do_not_stop_batch() {
        let store = FakeStore::with(vec![
            record(1, Some("555001"), Some("0857")),
            record(2, Some("555002"), Some("0858")),
        ]);
        let (processor, tg, wa) = processor(store, Behavior::Panic, Behavior::Panic);

        let summary = processor.process_queue().await;
        assert_eq!((summary.fetched, summary.sent, summary.failed), (2, 0, 2));
        assert_eq!(tg.load(Ordering::SeqCst), 2);
        assert_eq!(wa.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panic_outside_send_fails_only_that_record() {
        let store = FakeStore::with(vec![
            record(1, Some("555001"), None),
            record(2, Some("555002"), None),
        ]);
        let processor = QueueProcessor::new(store, vec![Box::new(TrippingNotifier::default())]);

        let summary = processor.process_queue().await;
        assert_eq!((summary.fetched, summary.sent, summary.failed), (2, 1, 1));
        assert_eq!(
            processor.store().updates(),
            vec![
                (1, failed("channel registry corrupted")),
                (2, QueueOutcome::Sent),
            ]
        );
        assert!(processor.store().pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processed_records_leave_pending_set() {
        let store = FakeStore::with(vec![record(1, Some("555001"), None)]);
        let (processor, _, _) = processor(store, Behavior::Succeed, Behavior::Succeed);

        assert_eq!(processor.process_queue().await.fetched, 1);
        assert_eq!(processor.process_queue().await, CycleSummary::default());
        assert_eq!(processor.store().updates().len(), 1);
    }

    #[tokio::test]
    async fn test_run_cycle_never_errors() {
        let store = FakeStore::with(vec![record(1, None, None)]);
        let (processor, _, _) = processor(store, Behavior::Fail, Behavior::Fail);
        assert!(processor.run_cycle().await.is_ok());
    }
}
