pub mod daily_logs;
pub mod food_log_entries;
pub mod foods;
pub mod ingredients;
pub mod sub_ingredients;
pub mod symptom_log_entries;
pub mod symptoms;
