use std::collections::{BTreeMap, BTreeSet};

use sqlx::{SqliteConnection, SqlitePool};

use crate::Result;
use crate::models::foods::Food;
use crate::models::ingredients::Ingredient;
use crate::models::sub_ingredients::SubIngredient;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Case-insensitive description groups that held more than one row.
    pub groups: usize,
    /// Duplicate food rows deleted.
    pub deleted: usize,
    /// Groups whose ingredient sets had to be unioned.
    pub merged: usize,
}

/// Collapse foods sharing a case-insensitive description down to one row
/// each. The keeper is the first row with ingredients (or simply the first
/// row when none has any); when several rows have ingredients, their
/// ingredient -> sub-ingredient sets are unioned onto the keeper. Runs in a
/// single transaction.
#[tracing::instrument(skip(pool))]
pub async fn merge_duplicate_foods(pool: &SqlitePool) -> Result<MergeReport> {
    let mut tx = pool.begin().await?;
    let mut report = MergeReport::default();

    let groups = sqlx::query_as::<_, (String, i64)>(
        "SELECT LOWER(description) AS description_lower, COUNT(*) AS rows
         FROM foods
         GROUP BY description_lower
         HAVING COUNT(*) > 1
         ORDER BY COUNT(*) DESC",
    )
    .fetch_all(tx.as_mut())
    .await?;
    report.groups = groups.len();
    tracing::info!(groups = report.groups, "found duplicate description groups");

    for (description_lower, rows) in groups {
        tracing::debug!(%description_lower, %rows, "merging group");
        merge_group(tx.as_mut(), &description_lower, &mut report).await?;
    }

    tx.commit().await?;
    tracing::info!(
        deleted = report.deleted,
        merged = report.merged,
        "duplicate cleanup finished"
    );
    Ok(report)
}

async fn merge_group(
    conn: &mut SqliteConnection,
    description_lower: &str,
    report: &mut MergeReport,
) -> Result<()> {
    let foods = sqlx::query_as::<_, Food>(
        "SELECT fdc_id, description, category FROM foods WHERE LOWER(description) = ?",
    )
    .bind(description_lower)
    .fetch_all(&mut *conn)
    .await?;

    let mut with_ingredients = Vec::new();
    let mut without = Vec::new();
    for food in foods {
        let has: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM ingredients WHERE fdc_id = ? LIMIT 1")
                .bind(food.fdc_id)
                .fetch_optional(&mut *conn)
                .await?;
        if has.is_some() {
            with_ingredients.push(food);
        } else {
            without.push(food);
        }
    }

    let (keeper, losers) = match with_ingredients.len() {
        // Nothing to preserve, keep the first row.
        0 => (without[0].fdc_id, without.split_off(1)),
        1 => (with_ingredients[0].fdc_id, without),
        _ => {
            let keeper = with_ingredients[0].fdc_id;

            // Union across every row with ingredients, the keeper included.
            let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for food in &with_ingredients {
                let rows = sqlx::query_as::<_, (String, Option<String>)>(
                    "SELECT i.ingredient, s.sub_ingredient
                     FROM ingredients i
                     LEFT JOIN sub_ingredients s ON i.id = s.ingredient_id
                     WHERE i.fdc_id = ?",
                )
                .bind(food.fdc_id)
                .fetch_all(&mut *conn)
                .await?;

                for (ingredient, sub) in rows {
                    let subs = merged.entry(ingredient).or_default();
                    if let Some(sub) = sub {
                        subs.insert(sub);
                    }
                }
            }

            // Replace the keeper's rows with the merged set.
            sqlx::query(
                "DELETE FROM sub_ingredients
                 WHERE ingredient_id IN (SELECT id FROM ingredients WHERE fdc_id = ?)",
            )
            .bind(keeper)
            .execute(&mut *conn)
            .await?;
            sqlx::query("DELETE FROM ingredients WHERE fdc_id = ?")
                .bind(keeper)
                .execute(&mut *conn)
                .await?;

            for (ingredient, subs) in merged {
                let ingredient_id = Ingredient::create(&mut *conn, keeper, &ingredient).await?;
                for sub in subs {
                    SubIngredient::create(&mut *conn, ingredient_id, &sub).await?;
                }
            }
            report.merged += 1;

            let mut losers = without;
            losers.extend(with_ingredients.drain(1..));
            (keeper, losers)
        }
    };

    tracing::debug!(%keeper, losers = losers.len(), "keeping one row");
    for food in losers {
        Food::remove(&mut *conn, food.fdc_id).await?;
        report.deleted += 1;
    }

    Ok(())
}
