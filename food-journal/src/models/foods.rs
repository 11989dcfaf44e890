use std::collections::HashSet;

use serde::Serialize;
use sqlx::SqliteConnection;
use sqlx::prelude::FromRow;

use crate::Result;
use crate::models::ingredients::Ingredient;
use crate::models::sub_ingredients::SubIngredient;
use crate::parser::parse_ingredients;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Food {
    pub fdc_id: i64,
    pub description: String,
    pub category: Option<String>,
}

#[derive(Debug)]
pub struct CreateFoodPayload<'data> {
    pub description: &'data str,
    pub ingredients: &'data str,
    pub category: Option<&'data str>,
}

impl<'data> CreateFoodPayload<'data> {
    pub fn new(
        description: &'data str,
        ingredients: &'data str,
        category: Option<&'data str>,
    ) -> Self {
        Self {
            description,
            ingredients,
            category,
        }
    }
}

impl Food {
    pub async fn get(conn: &mut SqliteConnection, fdc_id: i64) -> Result<Option<Food>> {
        let food = sqlx::query_as::<_, Food>(
            "SELECT fdc_id, description, category FROM foods WHERE fdc_id = ?",
        )
        .bind(fdc_id)
        .fetch_optional(conn)
        .await?;

        Ok(food)
    }

    pub async fn find_by_description(
        conn: &mut SqliteConnection,
        description: &str,
    ) -> Result<Option<Food>> {
        let food = sqlx::query_as::<_, Food>(
            "SELECT fdc_id, description, category FROM foods WHERE description = ?",
        )
        .bind(description)
        .fetch_optional(conn)
        .await?;

        Ok(food)
    }

    /// Find-or-create by exact description. On create, the raw label is
    /// parsed and every (ingredient, sub-ingredients) pair is persisted.
    #[tracing::instrument(skip(conn, payload), fields(description = payload.description))]
    pub async fn create(conn: &mut SqliteConnection, payload: CreateFoodPayload<'_>) -> Result<i64> {
        let description = payload.description.trim();

        if let Some(existing) = Self::find_by_description(&mut *conn, description).await? {
            tracing::debug!(fdc_id = existing.fdc_id, "food already exists");
            return Ok(existing.fdc_id);
        }

        let fdc_id = sqlx::query("INSERT INTO foods (description, category) VALUES (?, ?)")
            .bind(description)
            .bind(payload.category)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

        for parsed in parse_ingredients(payload.ingredients) {
            let ingredient_id = Ingredient::create(&mut *conn, fdc_id, &parsed.name).await?;
            for sub in &parsed.sub_ingredients {
                SubIngredient::create(&mut *conn, ingredient_id, sub).await?;
            }
        }

        tracing::info!(%fdc_id, "created food");
        Ok(fdc_id)
    }

    /// A saved meal combination: a food whose top-level ingredients are the
    /// distinct ingredient names of its components, in first-seen order.
    #[tracing::instrument(skip(conn, component_ids))]
    pub async fn create_combo(
        conn: &mut SqliteConnection,
        name: &str,
        component_ids: &[i64],
    ) -> Result<i64> {
        let name = name.trim();

        if let Some(existing) = Self::find_by_description(&mut *conn, name).await? {
            tracing::debug!(fdc_id = existing.fdc_id, "combo already exists");
            return Ok(existing.fdc_id);
        }

        let fdc_id = sqlx::query("INSERT INTO foods (description, category) VALUES (?, ?)")
            .bind(name)
            .bind("Custom Meal")
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

        let mut seen = HashSet::new();
        for &component in component_ids {
            for ingredient in Ingredient::for_food(&mut *conn, component).await? {
                if seen.insert(ingredient.ingredient.clone()) {
                    Ingredient::create(&mut *conn, fdc_id, &ingredient.ingredient).await?;
                }
            }
        }

        Ok(fdc_id)
    }

    /// Cascades through sub-ingredients and ingredients before the food row.
    pub async fn remove(conn: &mut SqliteConnection, fdc_id: i64) -> Result<()> {
        sqlx::query(
            "DELETE FROM sub_ingredients
             WHERE ingredient_id IN (SELECT id FROM ingredients WHERE fdc_id = ?)",
        )
        .bind(fdc_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM ingredients WHERE fdc_id = ?")
            .bind(fdc_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("DELETE FROM foods WHERE fdc_id = ?")
            .bind(fdc_id)
            .execute(&mut *conn)
            .await?;

        tracing::info!(%fdc_id, "removed food and its ingredients");
        Ok(())
    }

    /// Case-insensitive substring search, ordered by description.
    pub async fn search_by_description(
        conn: &mut SqliteConnection,
        query: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Food>> {
        // LIKE is ASCII-case-insensitive in SQLite; LIMIT -1 means no limit
        let foods = sqlx::query_as::<_, Food>(
            "SELECT fdc_id, description, category FROM foods
             WHERE description LIKE ?
             ORDER BY description
             LIMIT ?",
        )
        .bind(format!("%{query}%"))
        .bind(limit.unwrap_or(-1))
        .fetch_all(conn)
        .await?;

        Ok(foods)
    }

    /// Formatted label lines, "INGREDIENT (SUB1, SUB2)" where sub-ingredients
    /// exist, grouped by ingredient name in insertion order.
    pub async fn ingredient_lines(conn: &mut SqliteConnection, fdc_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT i.ingredient, s.sub_ingredient
             FROM ingredients i
             LEFT JOIN sub_ingredients s ON i.id = s.ingredient_id
             WHERE i.fdc_id = ?
             ORDER BY i.id, s.id",
        )
        .bind(fdc_id)
        .fetch_all(conn)
        .await?;

        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for (ingredient, sub) in rows {
            let idx = match grouped.iter().position(|(name, _)| *name == ingredient) {
                Some(idx) => idx,
                None => {
                    grouped.push((ingredient, Vec::new()));
                    grouped.len() - 1
                }
            };
            if let Some(sub) = sub {
                grouped[idx].1.push(sub);
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(name, subs)| {
                if subs.is_empty() {
                    name
                } else {
                    format!("{} ({})", name, subs.join(", "))
                }
            })
            .collect())
    }
}
