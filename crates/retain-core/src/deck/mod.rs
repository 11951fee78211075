//! Deck module - card and deck value types
//!
//! The content-side data model around the scheduler:
//! - [`Card`]: front/back content plus embedded scheduling state
//! - [`Deck`]: a named collection of cards
//! - [`StudyStats`]: queue counts and averages for progress display
//!
//! The scheduler itself never sees decks or card content; it consumes and
//! produces only the embedded [`SchedulerState`](crate::SchedulerState).

mod card;

pub use card::{Card, NewCardInput};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// DECK
// ============================================================================

/// A named collection of cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Human-readable name, unique per store
    pub name: String,
    /// When the deck was created
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// STUDY STATS
// ============================================================================

/// Aggregate queue statistics for a deck or a whole store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyStats {
    /// Total number of cards
    pub total_cards: i64,
    /// Cards due for presentation right now (excludes suspended)
    pub due_now: i64,
    /// Cards never answered (reps = 0, not on the ladder)
    pub new_cards: i64,
    /// Cards currently on the learning ladder
    pub learning_cards: i64,
    /// Graduated cards in day-granularity review
    pub review_cards: i64,
    /// Cards suspended as leeches
    pub suspended_cards: i64,
    /// Mean difficulty estimate across non-suspended cards
    pub average_difficulty: f64,
    /// Mean ease across non-suspended cards
    pub average_ease: f64,
}

impl Default for StudyStats {
    fn default() -> Self {
        Self {
            total_cards: 0,
            due_now: 0,
            new_cards: 0,
            learning_cards: 0,
            review_cards: 0,
            suspended_cards: 0,
            average_difficulty: 0.0,
            average_ease: 0.0,
        }
    }
}

// ============================================================================
// REVIEW RECORD
// ============================================================================

/// One row of the append-only review log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    /// Card that was reviewed
    pub card_id: String,
    /// Rating the learner gave (0-3)
    pub rating: i64,
    /// When the review happened
    pub reviewed_at: DateTime<Utc>,
    /// Interval before the transition, in days
    pub ivl_before: i64,
    /// Interval after the transition, in days
    pub ivl_after: i64,
    /// Due timestamp after the transition, epoch milliseconds
    pub due_after: i64,
}
