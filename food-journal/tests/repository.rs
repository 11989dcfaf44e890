use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use food_journal::cache::{Clock, SnapshotCache};
use food_journal::db;
use food_journal::dedupe::merge_duplicate_foods;
use food_journal::models::food_log_entries::{FoodLogEntry, LogMealPayload};
use food_journal::models::foods::{CreateFoodPayload, Food};
use food_journal::models::ingredients::{Ingredient, IngredientBatch, NewIngredient};
use food_journal::models::sub_ingredients::SubIngredient;
use food_journal::models::symptom_log_entries::{LogSymptomPayload, SymptomLogEntry};
use food_journal::models::symptoms::Symptom;
use pretty_assertions::assert_eq;
use sqlx::{SqliteConnection, SqlitePool};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn time(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap()
}

// The in-memory pool holds a single connection, so each test acquires one
// and threads it through; pool-level calls only run with no connection held.
async fn count(conn: &mut SqliteConnection, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(conn).await.unwrap()
}

async fn insert_raw_food(conn: &mut SqliteConnection, description: &str) -> i64 {
    sqlx::query("INSERT INTO foods (description) VALUES (?)")
        .bind(description)
        .execute(conn)
        .await
        .unwrap()
        .last_insert_rowid()
}

#[tokio::test]
async fn create_food_is_idempotent_by_description() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let first = Food::create(
        conn.as_mut(),
        CreateFoodPayload::new("Peanut Butter", "PEANUTS, SALT", None),
    )
    .await
    .unwrap();
    let second = Food::create(
        conn.as_mut(),
        CreateFoodPayload::new("Peanut Butter", "SOMETHING ELSE ENTIRELY", None),
    )
    .await
    .unwrap();

    assert_eq!(first, second);
    let lines = Food::ingredient_lines(conn.as_mut(), first).await.unwrap();
    assert_eq!(lines, vec!["PEANUTS", "SALT"]);
}

#[tokio::test]
async fn create_food_persists_parsed_sub_ingredients() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let fdc_id = Food::create(
        conn.as_mut(),
        CreateFoodPayload::new(
            "Seasoned Crackers",
            "ENRICHED FLOUR (WHEAT FLOUR, NIACIN), SALT",
            Some("Snacks"),
        ),
    )
    .await
    .unwrap();

    let lines = Food::ingredient_lines(conn.as_mut(), fdc_id).await.unwrap();
    assert_eq!(lines, vec!["ENRICHED FLOUR (WHEAT FLOUR, NIACIN)", "SALT"]);

    let food = Food::get(conn.as_mut(), fdc_id).await.unwrap().unwrap();
    assert_eq!(food.category.as_deref(), Some("Snacks"));
}

#[tokio::test]
async fn search_is_case_insensitive_and_ordered() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    for description in ["Milk", "Almond Milk", "Buttermilk", "Bread"] {
        Food::create(conn.as_mut(), CreateFoodPayload::new(description, "", None))
            .await
            .unwrap();
    }

    let found = Food::search_by_description(conn.as_mut(), "MILK", None)
        .await
        .unwrap();
    let descriptions: Vec<_> = found.iter().map(|f| f.description.as_str()).collect();
    assert_eq!(descriptions, vec!["Almond Milk", "Buttermilk", "Milk"]);

    let limited = Food::search_by_description(conn.as_mut(), "milk", Some(2))
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn remove_food_cascades_through_ingredients() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let fdc_id = Food::create(
        conn.as_mut(),
        CreateFoodPayload::new("Soup", "BROTH (WATER, SALT), CARROTS", None),
    )
    .await
    .unwrap();
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM sub_ingredients").await, 2);

    Food::remove(conn.as_mut(), fdc_id).await.unwrap();

    assert!(Food::get(conn.as_mut(), fdc_id).await.unwrap().is_none());
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM ingredients").await, 0);
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM sub_ingredients").await, 0);
}

#[tokio::test]
async fn combos_union_component_ingredient_names() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let bread = Food::create(
        conn.as_mut(),
        CreateFoodPayload::new("Bread", "WHEAT FLOUR, SALT", None),
    )
    .await
    .unwrap();
    let butter = Food::create(
        conn.as_mut(),
        CreateFoodPayload::new("Butter", "CREAM, SALT", None),
    )
    .await
    .unwrap();

    let combo = Food::create_combo(conn.as_mut(), "Buttered Toast", &[bread, butter])
        .await
        .unwrap();

    let lines = Food::ingredient_lines(conn.as_mut(), combo).await.unwrap();
    assert_eq!(lines, vec!["WHEAT FLOUR", "SALT", "CREAM"]);

    let combo_food = Food::get(conn.as_mut(), combo).await.unwrap().unwrap();
    assert_eq!(combo_food.category.as_deref(), Some("Custom Meal"));

    let again = Food::create_combo(conn.as_mut(), "Buttered Toast", &[bread])
        .await
        .unwrap();
    assert_eq!(again, combo);
}

#[tokio::test]
async fn meals_get_sequential_ids_and_user_scoped_deletes() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let bread = Food::create(conn.as_mut(), CreateFoodPayload::new("Bread", "", None))
        .await
        .unwrap();
    let cheese = Food::create(conn.as_mut(), CreateFoodPayload::new("Cheese", "", None))
        .await
        .unwrap();

    let first = FoodLogEntry::log_meal(
        conn.as_mut(),
        LogMealPayload::new(1, date(1), time(8), Some("breakfast"), &[bread, cheese]),
    )
    .await
    .unwrap();
    let second = FoodLogEntry::log_meal(
        conn.as_mut(),
        LogMealPayload::new(1, date(1), time(12), None, &[bread]),
    )
    .await
    .unwrap();

    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM food_log_entries").await, 3);
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM daily_logs").await, 1);

    // Another user cannot delete this meal.
    assert_eq!(
        FoodLogEntry::delete_meal(conn.as_mut(), 2, first).await.unwrap(),
        0
    );
    assert_eq!(
        FoodLogEntry::delete_meal(conn.as_mut(), 1, first).await.unwrap(),
        2
    );
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM food_log_entries").await, 1);
}

#[tokio::test]
async fn single_entries_delete_by_id_scoped_to_user() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let bread = Food::create(conn.as_mut(), CreateFoodPayload::new("Bread", "", None))
        .await
        .unwrap();
    FoodLogEntry::log_meal(
        conn.as_mut(),
        LogMealPayload::new(1, date(1), time(8), None, &[bread]),
    )
    .await
    .unwrap();
    let entry_id: i64 = sqlx::query_scalar("SELECT id FROM food_log_entries")
        .fetch_one(conn.as_mut())
        .await
        .unwrap();

    assert_eq!(FoodLogEntry::delete(conn.as_mut(), 2, entry_id).await.unwrap(), 0);
    assert_eq!(FoodLogEntry::delete(conn.as_mut(), 1, entry_id).await.unwrap(), 1);

    let ids = SymptomLogEntry::log(
        conn.as_mut(),
        LogSymptomPayload::new(1, "Nausea", date(1), None, time(9), 3, None),
    )
    .await
    .unwrap();
    assert_eq!(
        SymptomLogEntry::delete(conn.as_mut(), 1, ids[0]).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn symptoms_are_global_and_logged_per_day() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let ids = SymptomLogEntry::log(
        conn.as_mut(),
        LogSymptomPayload::new(
            1,
            "Headache",
            date(1),
            Some(date(3)),
            time(14),
            7,
            Some("dull"),
        ),
    )
    .await
    .unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM daily_logs").await, 3);

    let existing = Symptom::find_or_create(conn.as_mut(), "Headache")
        .await
        .unwrap();
    let duplicate = Symptom::find_or_create(conn.as_mut(), "Headache")
        .await
        .unwrap();
    assert_eq!(existing.id, duplicate.id);
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM symptoms").await, 1);

    let found = Symptom::search(conn.as_mut(), "head", None).await.unwrap();
    assert_eq!(found.len(), 1);

    let logged = Symptom::logged_by_user(conn.as_mut(), 1).await.unwrap();
    assert_eq!(logged, vec!["Headache"]);
    assert!(
        Symptom::logged_by_user(conn.as_mut(), 2)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn merge_collapses_duplicates_and_unions_ingredients() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    // Three spellings of the same food, two of them with ingredients.
    let a = insert_raw_food(conn.as_mut(), "Peanut Butter").await;
    let b = insert_raw_food(conn.as_mut(), "peanut butter").await;
    insert_raw_food(conn.as_mut(), "PEANUT BUTTER").await;

    let peanuts = Ingredient::create(conn.as_mut(), a, "PEANUTS").await.unwrap();
    SubIngredient::create(conn.as_mut(), peanuts, "ROASTED PEANUTS")
        .await
        .unwrap();
    Ingredient::create(conn.as_mut(), b, "SALT").await.unwrap();
    Ingredient::create(conn.as_mut(), b, "PEANUTS").await.unwrap();

    // A second group with no ingredients anywhere.
    insert_raw_food(conn.as_mut(), "Water").await;
    insert_raw_food(conn.as_mut(), "water").await;
    drop(conn);

    let report = merge_duplicate_foods(&pool).await.unwrap();
    assert_eq!(report.groups, 2);
    assert_eq!(report.merged, 1);
    assert_eq!(report.deleted, 3);

    let mut conn = pool.acquire().await.unwrap();
    assert_eq!(
        count(
            conn.as_mut(),
            "SELECT COUNT(*) FROM foods WHERE LOWER(description) = 'peanut butter'"
        )
        .await,
        1
    );
    assert_eq!(
        count(
            conn.as_mut(),
            "SELECT COUNT(*) FROM foods WHERE LOWER(description) = 'water'"
        )
        .await,
        1
    );

    // The survivor carries the union of both ingredient sets.
    let survivor: i64 =
        sqlx::query_scalar("SELECT fdc_id FROM foods WHERE LOWER(description) = 'peanut butter'")
            .fetch_one(conn.as_mut())
            .await
            .unwrap();
    let lines = Food::ingredient_lines(conn.as_mut(), survivor).await.unwrap();
    assert_eq!(lines, vec!["PEANUTS (ROASTED PEANUTS)", "SALT"]);

    // No orphaned rows survive the cascade.
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM ingredients").await, 2);
    assert_eq!(count(conn.as_mut(), "SELECT COUNT(*) FROM sub_ingredients").await, 1);
}

#[tokio::test]
async fn merge_keeps_the_row_that_has_ingredients() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    insert_raw_food(conn.as_mut(), "Oat Milk").await;
    let keeper = insert_raw_food(conn.as_mut(), "oat milk").await;
    Ingredient::create(conn.as_mut(), keeper, "OATS").await.unwrap();
    drop(conn);

    let report = merge_duplicate_foods(&pool).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.merged, 0);

    let survivor: i64 =
        sqlx::query_scalar("SELECT fdc_id FROM foods WHERE LOWER(description) = 'oat milk'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(survivor, keeper);
}

#[tokio::test]
async fn ingredient_batch_links_subs_across_flushes() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let food_a = insert_raw_food(conn.as_mut(), "Granola").await;
    let food_b = insert_raw_food(conn.as_mut(), "Trail Mix").await;

    // Capacity below the row count forces an interior flush.
    let mut batch = IngredientBatch::new(2);
    let rows = [
        NewIngredient::new(food_a, "OATS".into(), vec![]),
        NewIngredient::new(
            food_a,
            "SWEETENER".into(),
            vec!["HONEY".into(), "SYRUP".into()],
        ),
        NewIngredient::new(food_b, "PEANUTS".into(), vec![]),
        NewIngredient::new(food_b, "CHOCOLATE".into(), vec!["COCOA".into()]),
    ];
    for row in rows {
        batch.push(conn.as_mut(), row).await.unwrap();
    }
    batch.flush(conn.as_mut()).await.unwrap();

    let granola = Ingredient::for_food(conn.as_mut(), food_a).await.unwrap();
    let names: Vec<_> = granola.iter().map(|i| i.ingredient.as_str()).collect();
    assert_eq!(names, vec!["OATS", "SWEETENER"]);

    let sweetener = granola.iter().find(|i| i.ingredient == "SWEETENER").unwrap();
    let subs = SubIngredient::for_ingredient(conn.as_mut(), sweetener.id)
        .await
        .unwrap();
    let sub_names: Vec<_> = subs.iter().map(|s| s.sub_ingredient.as_str()).collect();
    assert_eq!(sub_names, vec!["HONEY", "SYRUP"]);

    let trail_mix = Ingredient::for_food(conn.as_mut(), food_b).await.unwrap();
    let chocolate = trail_mix
        .iter()
        .find(|i| i.ingredient == "CHOCOLATE")
        .unwrap();
    let subs = SubIngredient::for_ingredient(conn.as_mut(), chocolate.id)
        .await
        .unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].sub_ingredient, "COCOA");
}

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Self {
        Self(Mutex::new(Utc::now()))
    }

    fn advance(&self, delta: TimeDelta) {
        *self.0.lock().unwrap() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

async fn log_one_meal(pool: &SqlitePool, user_id: i64, fdc_id: i64, day: u32, hour: u32) {
    let mut conn = pool.acquire().await.unwrap();
    FoodLogEntry::log_meal(
        conn.as_mut(),
        LogMealPayload::new(user_id, date(day), time(hour), None, &[fdc_id]),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn cache_serves_stale_snapshots_until_ttl_expires() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();
    let bread = Food::create(conn.as_mut(), CreateFoodPayload::new("Bread", "WHEAT", None))
        .await
        .unwrap();
    drop(conn);

    let clock = Arc::new(ManualClock::new());
    let cache = SnapshotCache::with_clock(pool.clone(), TimeDelta::minutes(5), clock.clone());

    log_one_meal(&pool, 1, bread, 1, 8).await;
    let snapshot = cache.get(1).await.unwrap();
    assert_eq!(snapshot.food_entries.len(), 1);

    // New writes are invisible while the snapshot is fresh.
    log_one_meal(&pool, 1, bread, 1, 12).await;
    clock.advance(TimeDelta::minutes(4));
    let snapshot = cache.get(1).await.unwrap();
    assert_eq!(snapshot.food_entries.len(), 1);

    // Crossing the TTL triggers a recompute.
    clock.advance(TimeDelta::minutes(2));
    let snapshot = cache.get(1).await.unwrap();
    assert_eq!(snapshot.food_entries.len(), 2);

    // Invalidation forces the next read through to the store.
    log_one_meal(&pool, 1, bread, 1, 18).await;
    cache.invalidate(1);
    let snapshot = cache.get(1).await.unwrap();
    assert_eq!(snapshot.food_entries.len(), 3);

    // An explicit refresh always bypasses the slot.
    log_one_meal(&pool, 1, bread, 2, 8).await;
    let snapshot = cache.refresh(1).await.unwrap();
    assert_eq!(snapshot.food_entries.len(), 4);
}

#[tokio::test]
async fn snapshots_are_partitioned_by_user() {
    let pool = db::connect_in_memory().await.unwrap();
    let mut conn = pool.acquire().await.unwrap();
    let bread = Food::create(conn.as_mut(), CreateFoodPayload::new("Bread", "WHEAT", None))
        .await
        .unwrap();
    let cheese = Food::create(conn.as_mut(), CreateFoodPayload::new("Cheese", "MILK", None))
        .await
        .unwrap();
    drop(conn);

    log_one_meal(&pool, 1, bread, 1, 8).await;
    log_one_meal(&pool, 2, cheese, 1, 9).await;

    let cache = SnapshotCache::new(pool.clone());
    let first = cache.get(1).await.unwrap();
    let second = cache.get(2).await.unwrap();

    assert_eq!(first.food_entries.len(), 1);
    assert_eq!(first.foods[0].description, "Bread");
    assert_eq!(first.ingredients.len(), 1);
    assert_eq!(second.foods[0].description, "Cheese");

    cache.invalidate_all();
    assert_eq!(cache.get(1).await.unwrap().food_entries.len(), 1);
}
