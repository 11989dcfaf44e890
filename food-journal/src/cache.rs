use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

use crate::Result;
use crate::models::daily_logs::DailyLog;
use crate::models::foods::Food;
use crate::models::ingredients::Ingredient;
use crate::models::sub_ingredients::SubIngredient;

/// Snapshots are considered fresh for this long.
pub const CACHE_TTL_MINUTES: i64 = 5;

/// Food log entry joined with its log's calendar date.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FoodEntryRow {
    pub id: i64,
    pub daily_log_id: i64,
    pub meal_id: Option<i64>,
    pub fdc_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
}

impl FoodEntryRow {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Symptom log entry joined with its log's date and the symptom name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SymptomEntryRow {
    pub id: i64,
    pub daily_log_id: i64,
    pub symptom_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub severity: i64,
    pub notes: Option<String>,
}

impl SymptomEntryRow {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Read-only view of everything a user has logged, plus the ingredient graph
/// restricted to foods they have logged. The correlation engine runs over
/// this and never touches the store directly.
#[derive(Debug, Clone, Default)]
pub struct UserSnapshot {
    pub daily_logs: Vec<DailyLog>,
    pub food_entries: Vec<FoodEntryRow>,
    pub symptom_entries: Vec<SymptomEntryRow>,
    pub foods: Vec<Food>,
    pub ingredients: Vec<Ingredient>,
    pub sub_ingredients: Vec<SubIngredient>,
}

impl UserSnapshot {
    #[tracing::instrument(skip(pool))]
    pub async fn fetch(pool: &SqlitePool, user_id: i64) -> Result<UserSnapshot> {
        let daily_logs = sqlx::query_as::<_, DailyLog>(
            "SELECT id, user_id, date FROM daily_logs WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let food_entries = sqlx::query_as::<_, FoodEntryRow>(
            "SELECT fle.id, fle.daily_log_id, fle.meal_id, fle.fdc_id, dl.date, fle.time, fle.notes
             FROM food_log_entries fle
             JOIN daily_logs dl ON fle.daily_log_id = dl.id
             WHERE dl.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let symptom_entries = sqlx::query_as::<_, SymptomEntryRow>(
            "SELECT sle.id, sle.daily_log_id, s.name AS symptom_name, dl.date, sle.time,
                    sle.severity, sle.notes
             FROM symptom_log_entries sle
             JOIN daily_logs dl ON sle.daily_log_id = dl.id
             JOIN symptoms s ON sle.symptom_id = s.id
             WHERE dl.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let foods = sqlx::query_as::<_, Food>(
            "SELECT DISTINCT f.fdc_id, f.description, f.category
             FROM foods f
             JOIN food_log_entries fle ON f.fdc_id = fle.fdc_id
             JOIN daily_logs dl ON fle.daily_log_id = dl.id
             WHERE dl.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let ingredients = sqlx::query_as::<_, Ingredient>(
            "SELECT DISTINCT i.id, i.fdc_id, i.ingredient
             FROM ingredients i
             JOIN food_log_entries fle ON i.fdc_id = fle.fdc_id
             JOIN daily_logs dl ON fle.daily_log_id = dl.id
             WHERE dl.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let sub_ingredients = sqlx::query_as::<_, SubIngredient>(
            "SELECT DISTINCT si.id, si.ingredient_id, si.sub_ingredient
             FROM sub_ingredients si
             JOIN ingredients i ON si.ingredient_id = i.id
             JOIN food_log_entries fle ON i.fdc_id = fle.fdc_id
             JOIN daily_logs dl ON fle.daily_log_id = dl.id
             WHERE dl.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(UserSnapshot {
            daily_logs,
            food_entries,
            symptom_entries,
            foods,
            ingredients,
            sub_ingredients,
        })
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct CacheSlot {
    snapshot: Arc<UserSnapshot>,
    last_updated: DateTime<Utc>,
}

/// TTL-bounded per-user snapshot cache. Refresh is not mutually exclusive:
/// two callers hitting an expired slot may both recompute; the later write
/// wins and both results are identical.
pub struct SnapshotCache {
    pool: SqlitePool,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<i64, CacheSlot>>,
}

impl SnapshotCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(
            pool,
            TimeDelta::minutes(CACHE_TTL_MINUTES),
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(pool: SqlitePool, ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            ttl,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cached snapshot while fresh, otherwise a full recompute.
    pub async fn get(&self, user_id: i64) -> Result<Arc<UserSnapshot>> {
        {
            let slots = self.slots.lock().expect("cache lock poisoned");
            if let Some(slot) = slots.get(&user_id) {
                if self.clock.now() - slot.last_updated < self.ttl {
                    return Ok(Arc::clone(&slot.snapshot));
                }
            }
        }

        self.refresh(user_id).await
    }

    /// Recompute unconditionally and replace the slot.
    pub async fn refresh(&self, user_id: i64) -> Result<Arc<UserSnapshot>> {
        let snapshot = Arc::new(UserSnapshot::fetch(&self.pool, user_id).await?);

        let mut slots = self.slots.lock().expect("cache lock poisoned");
        slots.insert(
            user_id,
            CacheSlot {
                snapshot: Arc::clone(&snapshot),
                last_updated: self.clock.now(),
            },
        );

        Ok(snapshot)
    }

    pub fn invalidate(&self, user_id: i64) {
        self.slots
            .lock()
            .expect("cache lock poisoned")
            .remove(&user_id);
    }

    pub fn invalidate_all(&self) {
        self.slots.lock().expect("cache lock poisoned").clear();
    }
}
