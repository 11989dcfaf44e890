use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;

use crate::Result;
use crate::models::daily_logs::DailyLog;
use crate::models::symptoms::Symptom;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SymptomLogEntry {
    pub id: i64,
    pub daily_log_id: i64,
    pub symptom_id: i64,
    pub time: NaiveTime,
    pub severity: i64,
    pub notes: Option<String>,
}

#[derive(Debug)]
pub struct LogSymptomPayload<'data> {
    pub user_id: i64,
    pub symptom: &'data str,
    pub start_date: NaiveDate,
    /// Inclusive; a multi-day symptom repeats one entry per day.
    pub end_date: Option<NaiveDate>,
    pub time: NaiveTime,
    /// The caller's 1-10 scale.
    pub severity: i64,
    pub notes: Option<&'data str>,
}

impl<'data> LogSymptomPayload<'data> {
    pub fn new(
        user_id: i64,
        symptom: &'data str,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        time: NaiveTime,
        severity: i64,
        notes: Option<&'data str>,
    ) -> Self {
        Self {
            user_id,
            symptom,
            start_date,
            end_date,
            time,
            severity,
            notes,
        }
    }
}

impl SymptomLogEntry {
    /// Find-or-create the symptom type, then insert one entry per day of the
    /// range under that day's log. Returns the new entry ids in date order.
    #[tracing::instrument(
        skip(conn, payload),
        fields(user_id = payload.user_id, symptom = payload.symptom)
    )]
    pub async fn log(conn: &mut SqliteConnection, payload: LogSymptomPayload<'_>) -> Result<Vec<i64>> {
        let symptom = Symptom::find_or_create(&mut *conn, payload.symptom).await?;
        let end = payload.end_date.unwrap_or(payload.start_date);

        let mut ids = Vec::new();
        let mut date = payload.start_date;
        while date <= end {
            let log = DailyLog::find_or_create(&mut *conn, payload.user_id, date).await?;

            let id = sqlx::query(
                "INSERT INTO symptom_log_entries (daily_log_id, symptom_id, time, severity, notes)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(log.id)
            .bind(symptom.id)
            .bind(payload.time)
            .bind(payload.severity)
            .bind(payload.notes)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();
            ids.push(id);

            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        tracing::info!(entries = ids.len(), "logged symptom");
        Ok(ids)
    }

    pub async fn delete(conn: &mut SqliteConnection, user_id: i64, entry_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM symptom_log_entries
             WHERE id = ?
               AND daily_log_id IN (SELECT id FROM daily_logs WHERE user_id = ?)",
        )
        .bind(entry_id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
