//! Card - the presentable unit of study
//!
//! A card pairs prompt/answer content with the scheduling state the engine
//! owns. Content never influences scheduling; the two travel together only
//! because they share a lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::{CardPhase, SchedulerState};

// ============================================================================
// CARD
// ============================================================================

/// A flashcard with its embedded scheduling state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owning deck
    pub deck_id: String,
    /// Prompt side
    pub front: String,
    /// Answer side
    pub back: String,
    /// Tags for categorization
    pub tags: Vec<String>,
    /// When the card was created
    pub created_at: DateTime<Utc>,
    /// When the card was last modified
    pub updated_at: DateTime<Utc>,
    /// Scheduling state, mutated only through review recording
    #[serde(flatten)]
    pub state: SchedulerState,
}

impl Card {
    /// Derived review phase
    pub fn phase(&self) -> CardPhase {
        self.state.phase()
    }

    /// Whether the card should be presented at `now_ms`
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.state.is_due(now_ms)
    }

    /// Due time as a UTC timestamp
    pub fn due_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.state.due_ts).unwrap_or_else(Utc::now)
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a new card
///
/// Uses `deny_unknown_fields` to prevent field injection from untrusted
/// import payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewCardInput {
    /// Prompt side
    pub front: String,
    /// Answer side
    pub back: String,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewCardInput {
    /// Build an input from bare front/back content
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            tags: vec![],
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
