//! WhatsApp gateway channel (secondary).
//!
//! Posts `{user_code, secret, device_id, receiver, message}` as JSON. A message
//! is delivered only when the gateway answers HTTP 200 with `"success": true`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use ranap_common::config::WhatsAppSettings;
use ranap_common::types::{Channel, NotificationRecord};

use crate::message::{self, Markup};
use crate::{Notifier, NotifyError};

/// Country calling code for Indonesia.
const COUNTRY_CODE: &str = "62";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    user_code: &'a str,
    secret: &'a str,
    device_id: &'a str,
    receiver: &'a str,
    message: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Normalize a stored phone number to the local `0…` form the gateway expects.
///
/// Non-digits are stripped. `62…` becomes `0…`; numbers that already start
/// with `0`, and anything else, pass through as digits.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with('0') {
        digits
    } else if let Some(rest) = digits.strip_prefix(COUNTRY_CODE) {
        format!("0{}", rest)
    } else {
        digits
    }
}

pub struct WhatsAppNotifier {
    client: reqwest::Client,
    api_url: String,
    user_code: String,
    secret: String,
    device_id: String,
    enabled: bool,
    footer: Option<String>,
}

impl WhatsAppNotifier {
    /// Create the notifier. The channel stays disabled unless all three
    /// credentials are present.
    pub fn new(settings: &WhatsAppSettings, footer: Option<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout))
            .build()
            .map_err(NotifyError::Client)?;

        let enabled = settings.enabled && settings.has_credentials();
        if settings.enabled && !enabled {
            tracing::warn!("WhatsApp credentials not configured, channel disabled");
        }

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            user_code: settings.user_code.clone().unwrap_or_default(),
            secret: settings.secret.clone().unwrap_or_default(),
            device_id: settings.device_id.clone().unwrap_or_default(),
            enabled,
            footer,
        })
    }

    /// Deliver the rendered notification for `record`.
    pub async fn try_send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
        if !self.enabled {
            return Err(NotifyError::Disabled(Channel::WhatsApp));
        }
        let receiver = record
            .whatsapp_address()
            .map(normalize_phone)
            .ok_or(NotifyError::MissingAddress(Channel::WhatsApp))?;

        let text = message::render(
            record,
            message::wib_now(),
            self.footer.as_deref(),
            Markup::WhatsApp,
        );
        self.send_text(&receiver, &text).await
    }

    /// Send `text` to an already normalized `receiver`.
    pub async fn send_text(&self, receiver: &str, text: &str) -> Result<(), NotifyError> {
        let payload = SendMessageRequest {
            user_code: &self.user_code,
            secret: &self.secret,
            device_id: &self.device_id,
            receiver,
            message: text,
        };

        tracing::debug!(receiver, "Sending WhatsApp message");
        let response = self.client.post(&self.api_url).json(&payload).send().await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = status.as_u16(), body = %body, "WhatsApp gateway response");

        if status != StatusCode::OK {
            return Err(NotifyError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendMessageResponse = serde_json::from_str(&body).unwrap_or_default();
        if !parsed.success {
            return Err(NotifyError::Rejected(parsed.message.unwrap_or(body)));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
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
                    "WhatsApp notification sent"
                );
                true
            }
            Err(NotifyError::MissingAddress(_)) => {
                tracing::warn!(
                    notification_id = record.id,
                    doctor = %record.doctor_name,
                    "No WhatsApp number for physician"
                );
                false
            }
            Err(NotifyError::Disabled(_)) => false,
            Err(e) => {
                tracing::error!(
                    notification_id = record.id,
                    doctor = %record.doctor_name,
                    error = %e,
                    "WhatsApp notification failed"
                );
                false
            }
        }
    }
}
