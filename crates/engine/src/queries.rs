//! Notification queue gateway.
//!
//! Reads pending rows from `notification_queue` joined with the admission,
//! room, ward, patient and physician tables, and writes the delivery outcome
//! back to the queue row.
//!
//! The [`NotificationStore`] methods log database errors and degrade to an
//! empty batch / dropped write, so a database outage shows up as zero
//! processed notifications for that cycle. The `try_*` variants on
//! [`MySqlQueueStore`] return the error instead.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::MySqlRow;
use sqlx::{FromRow, MySqlPool, Row};

use ranap_common::types::{
    DeliveryStatus, NotificationRecord, NotificationType, QueueOutcome, Sex,
};

/// Maximum number of notifications handled per cycle.
pub const PENDING_BATCH_SIZE: i64 = 10;

// Room transfers and co-assigned physicians join into several rows per queue
// id. Within one id the latest room comes first, then the lowest doctor code.
const FETCH_PENDING_SQL: &str = r#"
    SELECT
        CAST(nq.id AS SIGNED)                  AS notification_id,
        nq.no_rawat                            AS no_rawat,
        CAST(nq.notification_type AS CHAR)     AS notification_type,
        CAST(nq.created_at AS DATETIME)        AS notification_time,
        ki.kd_kamar                            AS kd_kamar,
        kr.kd_bangsal                          AS kd_bangsal,
        b.nm_bangsal                           AS nm_bangsal,
        ki.diagnosa_awal                       AS diagnosa_awal,
        CAST(ki.tgl_masuk AS DATETIME)         AS tgl_masuk,
        rp.no_rkm_medis                        AS no_rkm_medis,
        p.nm_pasien                            AS nm_pasien,
        CAST(p.jk AS CHAR)                     AS jk,
        d.nm_dokter                            AS nm_dokter,
        CAST(d.telegram_id AS CHAR)            AS telegram_id,
        CAST(d.whatsapp_number AS CHAR)        AS whatsapp_number
    FROM notification_queue nq
    JOIN kamar_inap  ki ON nq.no_rawat      = ki.no_rawat
    JOIN kamar       kr ON ki.kd_kamar      = kr.kd_kamar
    JOIN bangsal     b  ON kr.kd_bangsal    = b.kd_bangsal
    JOIN reg_periksa rp ON ki.no_rawat      = rp.no_rawat
    JOIN pasien      p  ON rp.no_rkm_medis  = p.no_rkm_medis
    JOIN dpjp_ranap  dr ON ki.no_rawat      = dr.no_rawat
    JOIN dokter      d  ON dr.kd_dokter     = d.kd_dokter
    WHERE nq.status = 'pending'
    ORDER BY
        nq.created_at ASC,
        nq.id ASC,
        ki.tgl_masuk DESC,
        ki.kd_kamar ASC,
        dr.kd_dokter ASC
    LIMIT ?
"#;

/// Persistence seam used by the queue processor.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Up to [`PENDING_BATCH_SIZE`] pending notifications, oldest first.
    /// Empty when nothing is pending or the query fails.
    async fn fetch_pending(&self) -> Vec<NotificationRecord>;

    /// Persist the terminal status of one notification. Failures are logged.
    async fn update_status(&self, id: i64, outcome: &QueueOutcome);
}

/// Raw row of the pending-notification query.
#[derive(Debug, sqlx::FromRow)]
struct PendingRow {
    notification_id: i64,
    no_rawat: String,
    notification_type: Option<String>,
    notification_time: NaiveDateTime,
    kd_kamar: Option<String>,
    kd_bangsal: Option<String>,
    nm_bangsal: Option<String>,
    diagnosa_awal: Option<String>,
    tgl_masuk: Option<NaiveDateTime>,
    no_rkm_medis: Option<String>,
    nm_pasien: Option<String>,
    jk: Option<String>,
    nm_dokter: Option<String>,
    telegram_id: Option<String>,
    whatsapp_number: Option<String>,
}

impl From<PendingRow> for NotificationRecord {
    fn from(row: PendingRow) -> Self {
        NotificationRecord {
            id: row.notification_id,
            admission_ref: row.no_rawat,
            notification_type: NotificationType::from_db(
                row.notification_type.as_deref().unwrap_or_default(),
            ),
            created_at: row.notification_time,
            room_code: row.kd_kamar.unwrap_or_default(),
            ward_code: row.kd_bangsal.unwrap_or_default(),
            ward_name: row.nm_bangsal.unwrap_or_default(),
            diagnosis: row.diagnosa_awal,
            admitted_at: row.tgl_masuk,
            medical_record_no: row.no_rkm_medis.unwrap_or_default(),
            patient_name: row.nm_pasien.unwrap_or_default(),
            sex: Sex::from_code(row.jk.as_deref()),
            doctor_name: row.nm_dokter.unwrap_or_default(),
            telegram_id: row.telegram_id,
            whatsapp_number: row.whatsapp_number,
        }
    }
}

/// A pending queue row that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub id: i64,
    pub error: String,
}

/// Decoded result of one pending-notification query.
#[derive(Debug, Default)]
pub struct PendingBatch {
    pub records: Vec<NotificationRecord>,
    pub rejected: Vec<RejectedRow>,
}

type DecodedRow = (i64, Result<NotificationRecord, String>);

/// Decode one row on its own so a bad row cannot fail the whole batch.
fn decode_row(row: &MySqlRow) -> Option<DecodedRow> {
    match PendingRow::from_row(row) {
        Ok(pending) => Some((pending.notification_id, Ok(pending.into()))),
        Err(e) => match row.try_get::<i64, _>("notification_id") {
            Ok(id) => Some((id, Err(e.to_string()))),
            Err(_) => {
                tracing::error!(error = %e, "Skipping queue row without a readable id");
                None
            }
        },
    }
}

/// Keep the first row of each notification id, in query order.
fn collect_batch(rows: impl IntoIterator<Item = DecodedRow>) -> PendingBatch {
    let mut seen = HashSet::new();
    let mut batch = PendingBatch::default();

    for (id, decoded) in rows {
        if !seen.insert(id) {
            continue;
        }
        match decoded {
            Ok(record) => batch.records.push(record),
            Err(error) => batch.rejected.push(RejectedRow { id, error }),
        }
    }

    batch
}

/// MySQL-backed notification queue.
#[derive(Clone)]
pub struct MySqlQueueStore {
    pool: MySqlPool,
}

impl MySqlQueueStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Fetch and decode the pending batch without modifying any row.
    ///
    /// Rows that fail to decode are returned in [`PendingBatch::rejected`]
    /// instead of failing the query.
    pub async fn try_fetch_batch(&self) -> Result<PendingBatch, sqlx::Error> {
        let rows = sqlx::query(FETCH_PENDING_SQL)
            .bind(PENDING_BATCH_SIZE)
            .fetch_all(&self.pool)
            .await?;

        Ok(collect_batch(rows.iter().filter_map(decode_row)))
    }

    /// Fetch pending notifications, returning database errors to the caller.
    pub async fn try_fetch_pending(&self) -> Result<Vec<NotificationRecord>, sqlx::Error> {
        Ok(self.try_fetch_batch().await?.records)
    }

    /// Write the outcome of one notification.
    ///
    /// `sent` stamps `sent_at`; `failed` increments `retry_count` and stores the
    /// error text. Returns whether a queue row was updated.
    pub async fn try_update_status(
        &self,
        id: i64,
        outcome: &QueueOutcome,
    ) -> Result<bool, sqlx::Error> {
        let result = match outcome {
            QueueOutcome::Sent => {
                sqlx::query(
                    r#"
                    UPDATE notification_queue
                    SET status = ?, sent_at = NOW()
                    WHERE id = ?
                    "#,
                )
                .bind(DeliveryStatus::Sent.to_string())
                .bind(id)
                .execute(&self.pool)
                .await?
            }
            QueueOutcome::Failed(error_message) => {
                sqlx::query(
                    r#"
                    UPDATE notification_queue
                    SET status = ?,
                        retry_count = retry_count + 1,
                        error_message = ?
                    WHERE id = ?
                    "#,
                )
                .bind(DeliveryStatus::Failed.to_string())
                .bind(error_message.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl NotificationStore for MySqlQueueStore {
    async fn fetch_pending(&self) -> Vec<NotificationRecord> {
        match self.try_fetch_batch().await {
            Ok(batch) => {
                for rejected in &batch.rejected {
                    tracing::error!(
                        notification_id = rejected.id,
                        error = %rejected.error,
                        "Undecodable pending notification"
                    );
                    let reason = format!("Invalid queue row: {}", rejected.error);
                    let outcome = QueueOutcome::Failed(reason);
                    self.update_status(rejected.id, &outcome).await;
                }

                tracing::info!(
                    count = batch.records.len(),
                    rejected = batch.rejected.len(),
                    "Fetched pending notifications"
                );
                batch.records
            }
            Err(e) => {
                tracing::error!(error = %e, "Error fetching pending notifications");
                Vec::new()
            }
        }
    }

    async fn update_status(&self, id: i64, outcome: &QueueOutcome) {
        match self.try_update_status(id, outcome).await {
            Ok(true) => {
                tracing::debug!(
                    notification_id = id,
                    status = %outcome.status(),
                    "Queue row updated"
                );
            }
            Ok(false) => {
                tracing::warn!(
                    notification_id = id,
                    status = %outcome.status(),
                    "No queue row matched status update"
                );
            }
            Err(e) => {
                tracing::error!(
                    notification_id = id,
                    status = %outcome.status(),
                    error = %e,
                    "Error updating notification status"
                );
            }
        }
    }
}
