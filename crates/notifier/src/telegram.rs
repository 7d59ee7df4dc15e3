//! Telegram Bot API channel (primary).
//!
//! Sends `sendMessage` with `parse_mode = Markdown` to the physician's chat id.
//! Any 2xx response counts as delivered.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use ranap_common::config::TelegramSettings;
use ranap_common::types::{Channel, NotificationRecord};

use crate::message::{self, Markup};
use crate::{Notifier, NotifyError};

/// HTTP timeout for a single `sendMessage` call.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP timeout for the `getMe` startup check.
const IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    enabled: bool,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(NotifyError::Client)?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token: settings.bot_token.clone(),
            enabled: settings.enabled && !settings.bot_token.trim().is_empty(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Deliver the rendered notification for `record`.
    pub async fn try_send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
        if !self.enabled {
            return Err(NotifyError::Disabled(Channel::Telegram));
        }
        let chat_id = record
            .telegram_chat_id()
            .ok_or(NotifyError::MissingAddress(Channel::Telegram))?;

        let text = message::render(record, message::wib_now(), None, Markup::TelegramMarkdown);
        self.send_text(chat_id, &text).await
    }

    /// Send arbitrary Markdown text to `chat_id`.
    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let payload = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "Markdown",
        };

        tracing::debug!(chat_id, "Sending Telegram message");
        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Check the bot identity with `getMe`. Used for startup diagnostics only.
    pub async fn test_connection(&self) -> bool {
        let result = self
            .client
            .get(self.endpoint("getMe"))
            .timeout(IDENTITY_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e.without_url(), "Telegram connection test failed");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send_patient_notification(&self, record: &NotificationRecord) -> bool {
        match self.try_send(record).await {
            Ok(()) => {
                tracing::info!(
                    notification_id = record.id,
                    doctor = %record.doctor_name,
                    patient = %record.patient_name,
                    "Telegram notification sent"
                );
                true
            }
            Err(NotifyError::MissingAddress(_)) => {
                tracing::warn!(
                    notification_id = record.id,
                    doctor = %record.doctor_name,
                    "No Telegram chat id for physician"
                );
                false
            }
            Err(NotifyError::Disabled(_)) => false,
            Err(e) => {
                tracing::error!(
                    notification_id = record.id,
                    doctor = %record.doctor_name,
                    error = %e,
                    "Telegram notification failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::testing::{sample_record, spawn_provider};

    type Seen = Arc<Mutex<Vec<Value>>>;

    fn settings(api_base: &str) -> TelegramSettings {
        TelegramSettings {
            bot_token: "TESTTOKEN".to_string(),
            enabled: true,
            api_base: api_base.to_string(),
        }
    }

    async fn accept(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        seen.lock().unwrap().push(body);
        Json(json!({ "ok": true }))
    }

    async fn provider(status: StatusCode) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let send_message = if status.is_success() {
            post(accept)
        } else {
            post(move || async move { (status, "{\"ok\":false}") })
        };
        let router = Router::new()
            .route("/botTESTTOKEN/sendMessage", send_message)
            .route("/botTESTTOKEN/getMe", get(|| async { Json(json!({ "ok": true })) }))
            .with_state(seen.clone());

        (spawn_provider(router).await, seen)
    }

    #[tokio::test]
    async fn test_send_posts_markdown_message() {
        let (base, seen) = provider(StatusCode::OK).await;
        let notifier = TelegramNotifier::new(&settings(&base)).unwrap();

        assert!(notifier.send_patient_notification(&sample_record()).await);

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["chat_id"], "555001");
        assert_eq!(requests[0]["parse_mode"], "Markdown");
        assert!(
            requests[0]["text"]
                .as_str()
                .unwrap()
                .contains("*Nama Pasien:* Budi Santoso")
        );
    }

    #[tokio::test]
    async fn test_send_escapes_markdown_in_fields() {
        let (base, seen) = provider(StatusCode::OK).await;
        let notifier = TelegramNotifier::new(&settings(&base)).unwrap();
        let mut record = sample_record();
        record.ward_code = "ICU_2".to_string();

        assert!(notifier.send_patient_notification(&record).await);

        let requests = seen.lock().unwrap();
        let text = requests[0]["text"].as_str().unwrap();
        assert!(text.contains("_(Kode: ICU\\_2)_"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure() {
        let (base, _) = provider(StatusCode::BAD_REQUEST).await;
        let notifier = TelegramNotifier::new(&settings(&base)).unwrap();

        let err = notifier.try_send(&sample_record()).await.unwrap_err();
        assert!(matches!(err, NotifyError::HttpStatus { status: 400, .. }));
        assert!(!notifier.send_patient_notification(&sample_record()).await);
    }

    #[tokio::test]
    async fn test_missing_chat_id_skips_request() {
        let (base, seen) = provider(StatusCode::OK).await;
        let notifier = TelegramNotifier::new(&settings(&base)).unwrap();
        let mut record = sample_record();
        record.telegram_id = None;

        assert!(!notifier.send_patient_notification(&record).await);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_channel_skips_request() {
        let (base, seen) = provider(StatusCode::OK).await;
        let mut cfg = settings(&base);
        cfg.enabled = false;
        let notifier = TelegramNotifier::new(&cfg).unwrap();

        assert!(!notifier.is_enabled());
        let err = notifier.try_send(&sample_record()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Disabled(Channel::Telegram)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_failure() {
        // Nothing listens on port 9 locally
        let notifier = TelegramNotifier::new(&settings("http://127.0.0.1:9")).unwrap();
        let err = notifier.try_send(&sample_record()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Request(_)));
        assert!(!err.to_string().contains("TESTTOKEN"));
    }

    #[tokio::test]
    async fn test_connection_check() {
        let (base, _) = provider(StatusCode::OK).await;
        let notifier = TelegramNotifier::new(&settings(&base)).unwrap();
        assert!(notifier.test_connection().await);

        let offline = TelegramNotifier::new(&settings("http://127.0.0.1:9")).unwrap();
        assert!(!offline.test_connection().await);
    }
}
