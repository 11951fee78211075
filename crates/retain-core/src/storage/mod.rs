//! Storage Module
//!
//! SQLite-backed review-state store:
//! - One scheduler-state record per card, read before and written after
//!   each transition
//! - Atomic read-modify-write review recording (per-card transaction)
//! - Due-card presentation queue and study statistics

mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, MIGRATIONS};
pub use sqlite::{Result, Store, StoreError};
