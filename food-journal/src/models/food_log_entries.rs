use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;

use crate::Result;
use crate::models::daily_logs::DailyLog;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FoodLogEntry {
    pub id: i64,
    pub daily_log_id: i64,
    pub fdc_id: i64,
    pub time: NaiveTime,
    pub notes: Option<String>,
    pub meal_id: Option<i64>,
}

#[derive(Debug)]
pub struct LogMealPayload<'data> {
    pub user_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<&'data str>,
    pub fdc_ids: &'data [i64],
}

impl<'data> LogMealPayload<'data> {
    pub fn new(
        user_id: i64,
        date: NaiveDate,
        time: NaiveTime,
        notes: Option<&'data str>,
        fdc_ids: &'data [i64],
    ) -> Self {
        Self {
            user_id,
            date,
            time,
            notes,
            fdc_ids,
        }
    }
}

impl FoodLogEntry {
    /// Insert one entry per food under the day's log, grouped by a fresh
    /// meal id. Meal ids are allocated globally, one above the current
    /// maximum.
    #[tracing::instrument(skip(conn, payload), fields(user_id = payload.user_id))]
    pub async fn log_meal(conn: &mut SqliteConnection, payload: LogMealPayload<'_>) -> Result<i64> {
        let log = DailyLog::find_or_create(&mut *conn, payload.user_id, payload.date).await?;

        let max_meal_id: Option<i64> =
            sqlx::query_scalar("SELECT MAX(meal_id) FROM food_log_entries")
                .fetch_one(&mut *conn)
                .await?;
        let meal_id = max_meal_id.unwrap_or(0) + 1;

        for &fdc_id in payload.fdc_ids {
            sqlx::query(
                "INSERT INTO food_log_entries (daily_log_id, fdc_id, time, notes, meal_id)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(log.id)
            .bind(fdc_id)
            .bind(payload.time)
            .bind(payload.notes)
            .bind(meal_id)
            .execute(&mut *conn)
            .await?;
        }

        tracing::info!(%meal_id, foods = payload.fdc_ids.len(), "logged meal");
        Ok(meal_id)
    }

    /// Delete every entry of a meal, scoped to the user's own logs. Returns
    /// the number of rows removed.
    pub async fn delete_meal(
        conn: &mut SqliteConnection,
        user_id: i64,
        meal_id: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM food_log_entries
             WHERE meal_id = ?
               AND daily_log_id IN (SELECT id FROM daily_logs WHERE user_id = ?)",
        )
        .bind(meal_id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut SqliteConnection, user_id: i64, entry_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM food_log_entries
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
