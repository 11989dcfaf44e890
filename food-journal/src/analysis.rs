use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::cache::UserSnapshot;

/// Default look-back associating consumption with a later symptom.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Ranked statistics for one consumed item (ingredient, sub-ingredient, or
/// food description).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemStats {
    pub name: String,
    /// Occurrences whose pre-symptom window contained the item, counted once
    /// per occurrence.
    pub times_before_symptom: u32,
    pub total_symptom_occurrences: u32,
    /// times_before_symptom / total_symptom_occurrences, percent.
    pub occurrence_pct: f64,
    /// Log entries that consumed the item across all history, floored at
    /// times_before_symptom so the rate never exceeds 100.
    pub total_consumed: u32,
    /// times_before_symptom / total_consumed, percent. Highest = most likely
    /// culprit.
    pub correlation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccurrenceDetail {
    pub timestamp: NaiveDateTime,
    pub severity: i64,
    pub notes: Option<String>,
    /// Consumed item -> descriptions of the window's foods that carried it.
    pub item_sources: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomAnalysis {
    pub symptom: String,
    pub total_occurrences: u32,
    pub average_severity: f64,
    pub unique_item_count: u32,
    /// Ingredients and sub-ingredients, correlation rate descending.
    pub ingredient_stats: Vec<ItemStats>,
    /// Food descriptions, correlation rate descending.
    pub food_stats: Vec<ItemStats>,
    pub occurrences: Vec<OccurrenceDetail>,
}

/// Associate every occurrence of `symptom_name` with the foods and
/// ingredients consumed in the half-open window `[T - window, T)` before it,
/// and rank them by correlation rate. A symptom with no logged occurrences
/// yields an explicit empty analysis.
pub fn analyze(snapshot: &UserSnapshot, symptom_name: &str, window: TimeDelta) -> SymptomAnalysis {
    let occurrences: Vec<_> = snapshot
        .symptom_entries
        .iter()
        .filter(|entry| entry.symptom_name == symptom_name)
        .collect();
    let total_occurrences = occurrences.len() as u32;

    let descriptions: HashMap<i64, &str> = snapshot
        .foods
        .iter()
        .map(|food| (food.fdc_id, food.description.as_str()))
        .collect();
    let fdc_by_ingredient_id: HashMap<i64, i64> = snapshot
        .ingredients
        .iter()
        .map(|ing| (ing.id, ing.fdc_id))
        .collect();

    let mut ingredients_by_fdc: HashMap<i64, Vec<&str>> = HashMap::new();
    for ing in &snapshot.ingredients {
        ingredients_by_fdc
            .entry(ing.fdc_id)
            .or_default()
            .push(ing.ingredient.as_str());
    }

    let mut subs_by_fdc: HashMap<i64, Vec<&str>> = HashMap::new();
    for sub in &snapshot.sub_ingredients {
        if let Some(&fdc_id) = fdc_by_ingredient_id.get(&sub.ingredient_id) {
            subs_by_fdc
                .entry(fdc_id)
                .or_default()
                .push(sub.sub_ingredient.as_str());
        }
    }

    let mut ingredient_frequency: BTreeMap<&str, u32> = BTreeMap::new();
    let mut food_frequency: BTreeMap<&str, u32> = BTreeMap::new();
    let mut details = Vec::with_capacity(occurrences.len());
    let mut severity_sum = 0i64;

    for entry in &occurrences {
        let at = entry.timestamp();
        let start = at - window;
        severity_sum += entry.severity;

        let fdcs_in_window: BTreeSet<i64> = snapshot
            .food_entries
            .iter()
            .filter(|food_entry| {
                let ts = food_entry.timestamp();
                ts >= start && ts < at
            })
            .map(|food_entry| food_entry.fdc_id)
            .collect();

        let mut consumed: BTreeSet<&str> = BTreeSet::new();
        let mut foods_seen: BTreeSet<&str> = BTreeSet::new();
        let mut item_sources: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for fdc_id in fdcs_in_window {
            let description = descriptions.get(&fdc_id).copied();
            if let Some(description) = description {
                foods_seen.insert(description);
            }

            let ingredient_items = ingredients_by_fdc.get(&fdc_id).map_or(&[][..], |v| v.as_slice());
            let sub_items = subs_by_fdc.get(&fdc_id).map_or(&[][..], |v| v.as_slice());

            for &item in ingredient_items.iter().chain(sub_items) {
                consumed.insert(item);
                if let Some(description) = description {
                    item_sources
                        .entry(item.to_string())
                        .or_default()
                        .insert(description.to_string());
                }
            }
        }

        for &item in &consumed {
            *ingredient_frequency.entry(item).or_insert(0) += 1;
        }
        for &food in &foods_seen {
            *food_frequency.entry(food).or_insert(0) += 1;
        }

        details.push(OccurrenceDetail {
            timestamp: at,
            severity: entry.severity,
            notes: entry.notes.clone(),
            item_sources,
        });
    }

    // Total consumption over all history, counted in distinct log entries:
    // an item carried by two foods eaten once each counts twice. Names that
    // appear both as ingredient and sub-ingredient pool their counts.
    let mut entry_ids_by_fdc: HashMap<i64, Vec<i64>> = HashMap::new();
    for food_entry in &snapshot.food_entries {
        entry_ids_by_fdc
            .entry(food_entry.fdc_id)
            .or_default()
            .push(food_entry.id);
    }

    let mut ingredient_entries: HashMap<&str, BTreeSet<i64>> = HashMap::new();
    for ing in &snapshot.ingredients {
        if let Some(entry_ids) = entry_ids_by_fdc.get(&ing.fdc_id) {
            ingredient_entries
                .entry(ing.ingredient.as_str())
                .or_default()
                .extend(entry_ids);
        }
    }

    let mut sub_entries: HashMap<&str, BTreeSet<i64>> = HashMap::new();
    for sub in &snapshot.sub_ingredients {
        if let Some(&fdc_id) = fdc_by_ingredient_id.get(&sub.ingredient_id) {
            if let Some(entry_ids) = entry_ids_by_fdc.get(&fdc_id) {
                sub_entries
                    .entry(sub.sub_ingredient.as_str())
                    .or_default()
                    .extend(entry_ids);
            }
        }
    }

    let mut food_entry_counts: HashMap<&str, u32> = HashMap::new();
    for food_entry in &snapshot.food_entries {
        if let Some(&description) = descriptions.get(&food_entry.fdc_id) {
            *food_entry_counts.entry(description).or_insert(0) += 1;
        }
    }

    let ingredient_stats = ranked_stats(&ingredient_frequency, total_occurrences, |name| {
        let as_ingredient = ingredient_entries.get(name).map_or(0, BTreeSet::len);
        let as_sub = sub_entries.get(name).map_or(0, BTreeSet::len);
        (as_ingredient + as_sub) as u32
    });

    let food_stats = ranked_stats(&food_frequency, total_occurrences, |name| {
        food_entry_counts.get(name).copied().unwrap_or(0)
    });

    let average_severity = if occurrences.is_empty() {
        0.0
    } else {
        severity_sum as f64 / occurrences.len() as f64
    };

    SymptomAnalysis {
        symptom: symptom_name.to_string(),
        total_occurrences,
        average_severity,
        unique_item_count: ingredient_stats.len() as u32,
        ingredient_stats,
        food_stats,
        occurrences: details,
    }
}

fn ranked_stats(
    frequency: &BTreeMap<&str, u32>,
    total_occurrences: u32,
    total_consumed_of: impl Fn(&str) -> u32,
) -> Vec<ItemStats> {
    let mut stats: Vec<ItemStats> = frequency
        .iter()
        .map(|(&name, &times)| {
            // An entry can sit inside several occurrence windows, so the
            // naive total can undercount relative to the window tally; the
            // floor keeps the rate within 100%.
            let total_consumed = total_consumed_of(name).max(times);

            ItemStats {
                name: name.to_string(),
                times_before_symptom: times,
                total_symptom_occurrences: total_occurrences,
                occurrence_pct: f64::from(times) / f64::from(total_occurrences) * 100.0,
                total_consumed,
                correlation_rate: f64::from(times) / f64::from(total_consumed) * 100.0,
            }
        })
        .collect();

    // Stable sort: equal rates keep their alphabetical order.
    stats.sort_by(|a, b| b.correlation_rate.total_cmp(&a.correlation_rate));
    stats
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomSummary {
    pub name: String,
    pub occurrences: u32,
    pub average_severity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewStats {
    /// Distinct meal ids across all food log entries.
    pub total_meals: u32,
    pub total_symptom_entries: u32,
    /// Per-symptom tallies, most frequent first.
    pub symptoms: Vec<SymptomSummary>,
    /// Ingredient name -> consumption count over log entries, highest first.
    pub top_ingredients: Vec<(String, u32)>,
    /// Distinct meals per logged day; days without meals count zero.
    pub meals_per_day: Vec<(NaiveDate, u32)>,
}

/// General tallies across everything the user has logged.
pub fn overview(snapshot: &UserSnapshot) -> OverviewStats {
    let meal_ids: BTreeSet<i64> = snapshot
        .food_entries
        .iter()
        .filter_map(|entry| entry.meal_id)
        .collect();

    let mut by_symptom: BTreeMap<&str, (u32, i64)> = BTreeMap::new();
    for entry in &snapshot.symptom_entries {
        let slot = by_symptom
            .entry(entry.symptom_name.as_str())
            .or_insert((0, 0));
        slot.0 += 1;
        slot.1 += entry.severity;
    }
    let mut symptoms: Vec<SymptomSummary> = by_symptom
        .into_iter()
        .map(|(name, (occurrences, severity_sum))| SymptomSummary {
            name: name.to_string(),
            occurrences,
            average_severity: severity_sum as f64 / f64::from(occurrences),
        })
        .collect();
    symptoms.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));

    let mut entry_count_by_fdc: HashMap<i64, u32> = HashMap::new();
    for entry in &snapshot.food_entries {
        *entry_count_by_fdc.entry(entry.fdc_id).or_insert(0) += 1;
    }
    let mut ingredient_counts: BTreeMap<&str, u32> = BTreeMap::new();
    for ing in &snapshot.ingredients {
        if let Some(&count) = entry_count_by_fdc.get(&ing.fdc_id) {
            *ingredient_counts.entry(ing.ingredient.as_str()).or_insert(0) += count;
        }
    }
    let mut top_ingredients: Vec<(String, u32)> = ingredient_counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    top_ingredients.sort_by(|a, b| b.1.cmp(&a.1));

    let mut meals_per_day: BTreeMap<NaiveDate, BTreeSet<i64>> = snapshot
        .daily_logs
        .iter()
        .map(|log| (log.date, BTreeSet::new()))
        .collect();
    for entry in &snapshot.food_entries {
        if let Some(meal_id) = entry.meal_id {
            meals_per_day.entry(entry.date).or_default().insert(meal_id);
        }
    }

    OverviewStats {
        total_meals: meal_ids.len() as u32,
        total_symptom_entries: snapshot.symptom_entries.len() as u32,
        symptoms,
        top_ingredients,
        meals_per_day: meals_per_day
            .into_iter()
            .map(|(date, meals)| (date, meals.len() as u32))
            .collect(),
    }
}
