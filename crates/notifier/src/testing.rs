//! Shared fixtures for channel tests.

use chrono::NaiveDate;

use ranap_common::types::{NotificationRecord, NotificationType, Sex};

pub fn sample_record() -> NotificationRecord {
    let admitted = NaiveDate::from_ymd_opt(2025, 3, 14)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap();
    NotificationRecord {
        id: 42,
        admission_ref: "2025/03/14/000123".to_string(),
        notification_type: NotificationType::NewPatientDpjp,
        created_at: admitted,
        room_code: "VIP01".to_string(),
        ward_code: "B01".to_string(),
        ward_name: "Melati".to_string(),
        diagnosis: Some("Demam tifoid".to_string()),
        admitted_at: Some(admitted),
        medical_record_no: "000456".to_string(),
        patient_name: "Budi Santoso".to_string(),
        sex: Sex::Male,
        doctor_name: "dr. Sari".to_string(),
        telegram_id: Some("555001".to_string()),
        whatsapp_number: Some("+62 857-5877-9026".to_string()),
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_provider(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
