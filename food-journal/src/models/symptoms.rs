use serde::Serialize;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;

use crate::Result;
use crate::error::is_unique_violation;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Symptom {
    pub id: i64,
    pub name: String,
}

impl Symptom {
    /// Symptom types are global and created on first use.
    pub async fn find_or_create(conn: &mut SqliteConnection, name: &str) -> Result<Symptom> {
        let name = name.trim();

        let insert = sqlx::query("INSERT INTO symptoms (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await;

        match insert {
            Ok(_) => {}
            // A concurrent insert of the same name wins the race.
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err.into()),
        }

        let symptom = sqlx::query_as::<_, Symptom>("SELECT id, name FROM symptoms WHERE name = ?")
            .bind(name)
            .fetch_one(conn)
            .await?;

        Ok(symptom)
    }

    /// Case-insensitive substring search over symptom names, ordered by name.
    pub async fn search(
        conn: &mut SqliteConnection,
        query: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Symptom>> {
        let symptoms = sqlx::query_as::<_, Symptom>(
            "SELECT id, name FROM symptoms WHERE name LIKE ? ORDER BY name LIMIT ?",
        )
        .bind(format!("%{query}%"))
        .bind(limit.unwrap_or(-1))
        .fetch_all(conn)
        .await?;

        Ok(symptoms)
    }

    /// Names of every symptom the user has logged at least once.
    pub async fn logged_by_user(conn: &mut SqliteConnection, user_id: i64) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT s.name
             FROM symptoms s
             JOIN symptom_log_entries sle ON s.id = sle.symptom_id
             JOIN daily_logs dl ON sle.daily_log_id = dl.id
             WHERE dl.user_id = ?
             ORDER BY s.name",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        Ok(names)
    }
}
