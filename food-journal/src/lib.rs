pub mod analysis;
pub mod cache;
pub mod db;
pub mod dedupe;
mod error;
pub mod models;
pub mod parser;

pub use error::{JournalError, Result};
