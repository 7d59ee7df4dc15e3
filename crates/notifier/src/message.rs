//! Admission message template shared by all channels.
//!
//! The text uses single-asterisk bold and underscore italics, which both the
//! Telegram `Markdown` parse mode and WhatsApp render. Field values are
//! escaped for Telegram so a stray `_` or `*` cannot break the entity parser.

use std::borrow::Cow;

use chrono::{FixedOffset, NaiveDateTime, Utc};

use ranap_common::types::{NotificationRecord, NotificationType};

/// Local time format used for every timestamp in a message.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M WIB";

/// Western Indonesia Time is UTC+7 with no daylight saving.
const WIB_OFFSET_SECS: i32 = 7 * 3600;

const MISSING: &str = "N/A";

/// Markup dialect of the receiving channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    /// Telegram legacy `Markdown`. Field values are backslash-escaped.
    TelegramMarkdown,
    /// WhatsApp formatting. Field values are inserted as-is.
    WhatsApp,
}

/// Current wall-clock time in WIB.
pub fn wib_now() -> NaiveDateTime {
    let now = Utc::now();
    match FixedOffset::east_opt(WIB_OFFSET_SECS) {
        Some(wib) => now.with_timezone(&wib).naive_local(),
        None => now.naive_utc(),
    }
}

pub fn header(notification_type: &NotificationType) -> &'static str {
    match notification_type {
        NotificationType::NewPatientDpjp => "🏥 *PASIEN BARU RAWAT INAP - DPJP ASSIGNED*",
        NotificationType::DpjpChanged => "🔄 *PERUBAHAN DPJP PASIEN RAWAT INAP*",
        NotificationType::Other(_) => "🏥 *NOTIFIKASI PASIEN RAWAT INAP*",
    }
}

/// Render the admission message for `record`.
///
/// `generated_at` is printed as the trailing notification time. `footer`, when
/// present, is appended as an italic closing line.
pub fn render(
    record: &NotificationRecord,
    generated_at: NaiveDateTime,
    footer: Option<&str>,
    markup: Markup,
) -> String {
    let field = |value: &str| escape(or_missing(value), markup).into_owned();
    let admitted = record
        .admitted_at
        .map(|at| at.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| MISSING.to_string());

    let mut message = format!(
        "{header}\n\
         \n\
         👤 *Nama Pasien:* {patient}\n\
         🚻 *Jenis Kelamin:* {sex}\n\
         📋 *No. Rawat:* {admission}\n\
         📋 *No. Rekam Medis:* {medical_record}\n\
         \n\
         🏠 *Kamar:* {room}\n\
         🏥 *Bangsal:* {ward_name} _(Kode: {ward_code})_\n\
         \n\
         📅 *Tanggal Masuk:* {admitted}\n\
         🩺 *Diagnosa Awal:* {diagnosis}\n\
         👨‍⚕️ *DPJP:* {doctor}\n\
         \n\
         ⏰ Notifikasi: {generated}",
        header = header(&record.notification_type),
        patient = field(&record.patient_name),
        sex = record.sex.label(),
        admission = field(&record.admission_ref),
        medical_record = field(&record.medical_record_no),
        room = field(&record.room_code),
        ward_name = field(&record.ward_name),
        ward_code = field(&record.ward_code),
        diagnosis = field(record.diagnosis.as_deref().unwrap_or_default()),
        doctor = field(&record.doctor_name),
        generated = generated_at.format(TIMESTAMP_FORMAT),
    );

    if let Some(footer) = footer.filter(|f| !f.trim().is_empty()) {
        message.push_str(&format!("\n\n_{}_", footer.trim()));
    }

    message
}

/// Escape the characters Telegram legacy `Markdown` treats as entity markers.
pub fn escape(value: &str, markup: Markup) -> Cow<'_, str> {
    const SPECIAL: [char; 4] = ['_', '*', '`', '['];

    if markup == Markup::WhatsApp || !value.contains(SPECIAL) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

fn or_missing(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() { MISSING } else { value }
}
