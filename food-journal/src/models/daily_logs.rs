use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;

use crate::Result;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyLog {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
}

impl DailyLog {
    /// One log per (user, calendar date); every entry of a day hangs off it.
    pub async fn find_or_create(
        conn: &mut SqliteConnection,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<DailyLog> {
        sqlx::query(
            "INSERT INTO daily_logs (user_id, date) VALUES (?, ?)
             ON CONFLICT (user_id, date) DO NOTHING",
        )
        .bind(user_id)
        .bind(date)
        .execute(&mut *conn)
        .await?;

        let log = sqlx::query_as::<_, DailyLog>(
            "SELECT id, user_id, date FROM daily_logs WHERE user_id = ? AND date = ?",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(conn)
        .await?;

        Ok(log)
    }
}
