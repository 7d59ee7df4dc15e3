use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Why a notification was queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    /// A new inpatient admission with an attending physician (DPJP) assigned.
    NewPatientDpjp,
    /// The attending physician of an existing admission changed.
    DpjpChanged,
    /// Any other value written by the queue producer, kept verbatim.
    Other(String),
}

impl NotificationType {
    pub fn from_db(value: &str) -> Self {
        match value.trim() {
            "new_patient_dpjp" => NotificationType::NewPatientDpjp,
            "dpjp_changed" => NotificationType::DpjpChanged,
            other => NotificationType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::NewPatientDpjp => write!(f, "new_patient_dpjp"),
            NotificationType::DpjpChanged => write!(f, "dpjp_changed"),
            NotificationType::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Patient sex, decoded from the single-letter `jk` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    /// `L` (laki-laki) and `P` (perempuan); everything else is unknown.
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_ascii_uppercase()).as_deref() {
            Some("L") => Sex::Male,
            Some("P") => Sex::Female,
            _ => Sex::Unknown,
        }
    }

    /// Display label used in outgoing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Sex::Male => "Laki-laki",
            Sex::Female => "Perempuan",
            Sex::Unknown => "Tidak Diketahui",
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Notification queue status, stored as text in `notification_queue.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// External messaging channel used to reach a physician.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Telegram,
    WhatsApp,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Telegram => write!(f, "telegram"),
            Channel::WhatsApp => write!(f, "whatsapp"),
        }
    }
}

/// Terminal result of processing one queue row, reduced across all channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    Sent,
    Failed(String),
}

impl QueueOutcome {
    pub fn status(&self) -> DeliveryStatus {
        match self {
            QueueOutcome::Sent => DeliveryStatus::Sent,
            QueueOutcome::Failed(_) => DeliveryStatus::Failed,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            QueueOutcome::Sent => None,
            QueueOutcome::Failed(message) => Some(message),
        }
    }
}

/// A pending queue row joined with admission, room, ward, patient and
/// physician context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    /// Admission reference (`no_rawat`).
    pub admission_ref: String,
    pub notification_type: NotificationType,
    pub created_at: NaiveDateTime,
    pub room_code: String,
    pub ward_code: String,
    pub ward_name: String,
    pub diagnosis: Option<String>,
    /// Admission time as local wall-clock time. `None` when the stored value
    /// is NULL or not a valid date.
    pub admitted_at: Option<NaiveDateTime>,
    /// Medical record number (`no_rkm_medis`).
    pub medical_record_no: String,
    pub patient_name: String,
    pub sex: Sex,
    pub doctor_name: String,
    pub telegram_id: Option<String>,
    pub whatsapp_number: Option<String>,
}

impl NotificationRecord {
    /// Telegram chat id of the physician, if one is on file.
    pub fn telegram_chat_id(&self) -> Option<&str> {
        non_blank(self.telegram_id.as_deref())
    }

    /// WhatsApp number of the physician as stored, if one is on file.
    ///
    /// Values without a single digit (`-`, `n/a`) are placeholders and count
    /// as absent.
    pub fn whatsapp_address(&self) -> Option<&str> {
        let number = non_blank(self.whatsapp_number.as_deref())?;
        number.chars().any(|c| c.is_ascii_digit()).then_some(number)
    }

    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Telegram => self.telegram_chat_id(),
            Channel::WhatsApp => self.whatsapp_address(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
