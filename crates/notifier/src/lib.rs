//! Notification delivery channels.
//!
//! Each channel renders the admission message for one physician and delivers it
//! over a single external provider:
//! - Telegram Bot API (primary)
//! - WhatsApp gateway (secondary)
//!
//! Delivery failures never escape a channel. They are logged and reported to
//! the caller as `false`.

pub mod message;
pub mod telegram;
pub mod whatsapp;

#[cfg(test)]
mod testing;

use async_trait::async_trait;

use ranap_common::types::{Channel, NotificationRecord};

pub use telegram::TelegramNotifier;
pub use whatsapp::WhatsAppNotifier;

/// Error type for a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// The provider answered with a status the channel does not accept.
    #[error("Provider returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// HTTP 200 but the provider reported the message as not sent.
    #[error("Provider rejected message: {0}")]
    Rejected(String),

    #[error("No {0} address on file for the physician")]
    MissingAddress(Channel),

    #[error("{0} channel is disabled")]
    Disabled(Channel),

    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        // Telegram URLs embed the bot token, keep it out of logs.
        NotifyError::Request(err.without_url())
    }
}

/// A delivery channel for admission notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> Channel;

    /// Whether the channel is administratively enabled.
    fn is_enabled(&self) -> bool;

    /// Render and deliver the notification for `record`.
    ///
    /// Returns `false` without any network call when the channel is disabled
    /// or the physician has no address for it. Transport errors, timeouts and
    /// rejected responses are logged and also yield `false`.
    async fn send_patient_notification(&self, record: &NotificationRecord) -> bool;
}
