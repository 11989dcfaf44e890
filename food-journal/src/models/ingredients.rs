use std::collections::HashMap;

use serde::Serialize;
use sqlx::prelude::FromRow;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::Result;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub fdc_id: i64,
    pub ingredient: String,
}

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub fdc_id: i64,
    pub name: String,
    pub sub_ingredients: Vec<String>,
}

impl NewIngredient {
    pub fn new(fdc_id: i64, name: String, sub_ingredients: Vec<String>) -> Self {
        Self {
            fdc_id,
            name,
            sub_ingredients,
        }
    }
}

impl Ingredient {
    pub async fn create(conn: &mut SqliteConnection, fdc_id: i64, name: &str) -> Result<i64> {
        let id = sqlx::query("INSERT INTO ingredients (fdc_id, ingredient) VALUES (?, ?)")
            .bind(fdc_id)
            .bind(name.trim())
            .execute(conn)
            .await?
            .last_insert_rowid();

        Ok(id)
    }

    pub async fn for_food(conn: &mut SqliteConnection, fdc_id: i64) -> Result<Vec<Ingredient>> {
        let ingredients = sqlx::query_as::<_, Ingredient>(
            "SELECT id, fdc_id, ingredient FROM ingredients WHERE fdc_id = ? ORDER BY id",
        )
        .bind(fdc_id)
        .fetch_all(conn)
        .await?;

        Ok(ingredients)
    }
}

/// Buffers parsed label rows and writes them in two passes: one bulk insert
/// for ingredients, then one for sub-ingredients once the ingredient ids are
/// known. Rowids are handed out sequentially within a single insert
/// statement, which is what lets the reselect recover the batch's ids.
#[derive(Debug)]
pub struct IngredientBatch {
    capacity: usize,
    pending: Vec<NewIngredient>,
}

impl IngredientBatch {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// Buffer one row, flushing when the batch is full.
    pub async fn push(&mut self, conn: &mut SqliteConnection, row: NewIngredient) -> Result<()> {
        self.pending.push(row);
        if self.pending.len() >= self.capacity {
            self.flush(conn).await?;
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(rows = self.pending.len()))]
    pub async fn flush(&mut self, conn: &mut SqliteConnection) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut insert = QueryBuilder::new("INSERT INTO ingredients (fdc_id, ingredient) ");
        insert.push_values(&self.pending, |mut b, row| {
            b.push_bind(row.fdc_id);
            b.push_bind(&row.name);
        });
        let last_id = insert
            .build()
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();
        let first_id = last_id - (self.pending.len() as i64 - 1);

        let inserted = sqlx::query_as::<_, Ingredient>(
            "SELECT id, fdc_id, ingredient FROM ingredients WHERE id >= ?",
        )
        .bind(first_id)
        .fetch_all(&mut *conn)
        .await?;

        let id_map: HashMap<(i64, &str), i64> = inserted
            .iter()
            .map(|row| ((row.fdc_id, row.ingredient.as_str()), row.id))
            .collect();

        let sub_rows: Vec<(i64, &str)> = self
            .pending
            .iter()
            .flat_map(|row| {
                let id = id_map.get(&(row.fdc_id, row.name.as_str())).copied();
                row.sub_ingredients
                    .iter()
                    .filter_map(move |sub| id.map(|id| (id, sub.as_str())))
            })
            .collect();

        if !sub_rows.is_empty() {
            let mut insert =
                QueryBuilder::new("INSERT INTO sub_ingredients (ingredient_id, sub_ingredient) ");
            insert.push_values(&sub_rows, |mut b, (ingredient_id, sub)| {
                b.push_bind(*ingredient_id);
                b.push_bind(*sub);
            });
            insert.build().execute(&mut *conn).await?;
        }

        tracing::debug!(sub_rows = sub_rows.len(), "flushed ingredient batch");
        self.pending.clear();
        Ok(())
    }
}
