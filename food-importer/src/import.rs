use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use food_journal::models::ingredients::{IngredientBatch, NewIngredient};
use food_journal::parser::parse_ingredients;
use serde::Deserialize;
use sqlx::{Connection, QueryBuilder, SqliteConnection, SqlitePool};

#[derive(Debug, Default)]
pub struct ImportReport {
    pub foods: u64,
    pub branded: u64,
    pub ingredients: u64,
}

#[derive(Debug, Deserialize)]
struct FoodCategoryRow {
    id: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct FoodRow {
    fdc_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    food_category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BrandedFoodRow {
    fdc_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    branded_food_category: Option<String>,
    #[serde(default)]
    ingredients: Option<String>,
}

/// Load food.csv, food_category.csv and branded_food.csv from `data_dir` in
/// one transaction, then build the lookup indexes the journal queries rely
/// on.
#[tracing::instrument(skip(pool))]
pub async fn run(
    pool: &SqlitePool,
    data_dir: &Path,
    batch_size: usize,
) -> anyhow::Result<ImportReport> {
    let categories = load_categories(&data_dir.join("food_category.csv"))?;
    tracing::info!(categories = categories.len(), "loaded category map");

    let mut conn = pool.acquire().await?;

    // Throughput over durability; the import is rebuildable from the dump.
    sqlx::query("PRAGMA synchronous = OFF")
        .execute(conn.as_mut())
        .await?;
    sqlx::query("PRAGMA journal_mode = MEMORY")
        .fetch_optional(conn.as_mut())
        .await?;

    let mut tx = conn.begin().await?;

    let foods = import_foods(
        tx.as_mut(),
        &data_dir.join("food.csv"),
        &categories,
        batch_size,
    )
    .await?;
    tracing::info!(%foods, "imported base foods");

    let (branded, ingredients) =
        import_branded(tx.as_mut(), &data_dir.join("branded_food.csv"), batch_size).await?;
    tracing::info!(%branded, %ingredients, "imported branded foods");

    tx.commit().await?;

    create_indexes(conn.as_mut()).await?;

    Ok(ImportReport {
        foods,
        branded,
        ingredients,
    })
}

fn load_categories(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;

    let mut categories = HashMap::new();
    for row in reader.deserialize::<FoodCategoryRow>() {
        let row = row?;
        categories.insert(row.id, row.description);
    }

    Ok(categories)
}

async fn import_foods(
    conn: &mut SqliteConnection,
    path: &Path,
    categories: &HashMap<String, String>,
    batch_size: usize,
) -> anyhow::Result<u64> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;

    let mut batch: Vec<(i64, String, Option<String>)> = Vec::with_capacity(batch_size);
    let mut imported = 0u64;

    for row in reader.deserialize::<FoodRow>() {
        let row = row?;
        let Some(fdc_id) = parse_fdc_id(&row.fdc_id) else {
            continue;
        };
        let Some(description) = clean(row.description.as_deref()) else {
            continue;
        };
        let category = row
            .food_category_id
            .as_ref()
            .and_then(|id| categories.get(id))
            .cloned();

        batch.push((fdc_id, description.to_string(), category));
        if batch.len() >= batch_size {
            imported += flush_foods(conn, &mut batch).await?;
        }
    }
    imported += flush_foods(conn, &mut batch).await?;

    Ok(imported)
}

async fn flush_foods(
    conn: &mut SqliteConnection,
    batch: &mut Vec<(i64, String, Option<String>)>,
) -> anyhow::Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let mut insert = QueryBuilder::new("INSERT OR IGNORE INTO foods (fdc_id, description, category) ");
    insert.push_values(batch.iter(), |mut b, (fdc_id, description, category)| {
        b.push_bind(*fdc_id);
        b.push_bind(description);
        b.push_bind(category);
    });
    let affected = insert.build().execute(conn).await?.rows_affected();

    batch.clear();
    Ok(affected)
}

async fn import_branded(
    conn: &mut SqliteConnection,
    path: &Path,
    batch_size: usize,
) -> anyhow::Result<(u64, u64)> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;

    let mut batch = IngredientBatch::new(batch_size);
    let mut branded = 0u64;
    let mut ingredient_rows = 0u64;

    for row in reader.deserialize::<BrandedFoodRow>() {
        let row = row?;
        let Some(fdc_id) = parse_fdc_id(&row.fdc_id) else {
            continue;
        };

        let description = clean(row.description.as_deref());
        let category = clean(row.branded_food_category.as_deref());
        if description.is_some() || category.is_some() {
            upsert_branded_food(conn, fdc_id, description, category).await?;
            branded += 1;
        }

        if let Some(label) = row.ingredients.as_deref() {
            for parsed in parse_ingredients(label) {
                ingredient_rows += 1;
                batch
                    .push(
                        &mut *conn,
                        NewIngredient::new(fdc_id, parsed.name, parsed.sub_ingredients),
                    )
                    .await?;
            }
        }
    }
    batch.flush(conn).await?;

    Ok((branded, ingredient_rows))
}

/// Branded rows fill in whatever the base dump left blank; blanks in the
/// branded dump never clobber existing values.
async fn upsert_branded_food(
    conn: &mut SqliteConnection,
    fdc_id: i64,
    description: Option<&str>,
    category: Option<&str>,
) -> anyhow::Result<()> {
    let updated = sqlx::query(
        "UPDATE foods
         SET description = COALESCE(?, description),
             category = COALESCE(?, category)
         WHERE fdc_id = ?",
    )
    .bind(description)
    .bind(category)
    .bind(fdc_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        sqlx::query("INSERT OR IGNORE INTO foods (fdc_id, description, category) VALUES (?, ?, ?)")
            .bind(fdc_id)
            .bind(description.unwrap_or_default())
            .bind(category)
            .execute(conn)
            .await?;
    }

    Ok(())
}

async fn create_indexes(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_ingredients_fdc_id ON ingredients (fdc_id)",
        "CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients (ingredient)",
        "CREATE INDEX IF NOT EXISTS idx_sub_ingredients_ingredient_id ON sub_ingredients (ingredient_id)",
    ] {
        sqlx::query(statement).execute(&mut *conn).await?;
    }

    Ok(())
}

fn parse_fdc_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
