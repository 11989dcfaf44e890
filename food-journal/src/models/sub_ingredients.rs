use serde::Serialize;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;

use crate::Result;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubIngredient {
    pub id: i64,
    pub ingredient_id: i64,
    pub sub_ingredient: String,
}

impl SubIngredient {
    pub async fn create(conn: &mut SqliteConnection, ingredient_id: i64, name: &str) -> Result<i64> {
        let id = sqlx::query("INSERT INTO sub_ingredients (ingredient_id, sub_ingredient) VALUES (?, ?)")
            .bind(ingredient_id)
            .bind(name.trim())
            .execute(conn)
            .await?
            .last_insert_rowid();

        Ok(id)
    }

    pub async fn for_ingredient(
        conn: &mut SqliteConnection,
        ingredient_id: i64,
    ) -> Result<Vec<SubIngredient>> {
        let subs = sqlx::query_as::<_, SubIngredient>(
            "SELECT id, ingredient_id, sub_ingredient FROM sub_ingredients
             WHERE ingredient_id = ?
             ORDER BY id",
        )
        .bind(ingredient_id)
        .fetch_all(conn)
        .await?;

        Ok(subs)
    }
}
