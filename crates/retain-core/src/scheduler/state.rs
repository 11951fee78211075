//! Scheduler state types
//!
//! The flat per-card record consumed and produced by the transition engine,
//! the 0-3 rating scale, and the review phase derived from the record.

use serde::{Deserialize, Serialize};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Scheduler error type
///
/// `InvalidRating` is the only error the engine can signal: it indicates a
/// caller bug (an out-of-range rating value) and is never retried.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// Rating outside the 0-3 scale reached the engine
    #[error("invalid rating {0}: expected 0 (again), 1 (hard), 2 (good) or 3 (easy)")]
    InvalidRating(i64),
}

// ============================================================================
// RATING
// ============================================================================

/// Recall quality reported by the learner after answering a card
///
/// The integer values are fixed across the product: `0 = Again`, `1 = Hard`,
/// `2 = Good`, `3 = Easy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// Failed to recall
    Again = 0,
    /// Recalled with significant effort
    Hard = 1,
    /// Recalled correctly
    Good = 2,
    /// Recalled instantly
    Easy = 3,
}

impl Rating {
    /// All ratings, in ascending order
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Convert to the wire integer
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "again" | "fail" => Some(Rating::Again),
            "hard" => Some(Rating::Hard),
            "good" => Some(Rating::Good),
            "easy" => Some(Rating::Easy),
            _ => None,
        }
    }
}

impl TryFrom<i64> for Rating {
    type Error = SchedulerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rating::Again),
            1 => Ok(Rating::Hard),
            2 => Ok(Rating::Good),
            3 => Ok(Rating::Easy),
            other => Err(SchedulerError::InvalidRating(other)),
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SCHEDULER STATE
// ============================================================================

/// Per-card scheduling state
///
/// One record per presentable card, mutated exclusively through
/// [`Scheduler::review`](super::Scheduler::review). The record is a plain
/// value: transitions take it by reference and return a fresh copy, which
/// keeps equality-based testing trivial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    /// Current interval in whole days; base for the next review-mode step.
    /// Zero only before the first successful review.
    pub ivl_days: i64,
    /// Growth multiplier derived from difficulty, bounded to [1.3, 2.6]
    pub ease: f64,
    /// Successful graduations out of learning; never decreased
    pub reps: i64,
    /// Failed recalls since the card was created; never decreased
    pub lapses: i64,
    /// Epoch milliseconds at/after which the card is presentable again
    pub due_ts: i64,
    /// 0 = steady-state review mode; 1..N = rung on the learning ladder
    pub learning_stage: i64,
    /// Running difficulty estimate in [0, 1]: 0 = easy, 1 = hard
    pub difficulty: f64,
    /// Leech flag; once set, only external intervention clears it
    pub suspended: bool,
}

impl SchedulerState {
    /// State for a card that has never been reviewed, due immediately
    pub fn new_card(now_ms: i64) -> Self {
        Self {
            ivl_days: 0,
            ease: 2.5,
            reps: 0,
            lapses: 0,
            due_ts: now_ms,
            learning_stage: 0,
            difficulty: 0.5,
            suspended: false,
        }
    }

    /// Derive the review phase from the flat record
    ///
    /// The "in learning" predicate spans two fields (`learning_stage`,
    /// `reps`); deriving a variant once keeps the transition logic free of
    /// the duplicated brand-new special case.
    pub fn phase(&self) -> CardPhase {
        if self.suspended {
            CardPhase::Suspended
        } else if self.learning_stage > 0 {
            CardPhase::Learning {
                stage: self.learning_stage,
            }
        } else if self.reps == 0 {
            CardPhase::New
        } else {
            CardPhase::Review
        }
    }

    /// Whether the card should be presented at `now_ms`
    pub fn is_due(&self, now_ms: i64) -> bool {
        !self.suspended && self.due_ts <= now_ms
    }
}

// ============================================================================
// CARD PHASE
// ============================================================================

/// Review phase derived from a [`SchedulerState`]
///
/// `New` and `Learning` both schedule on the short-interval ladder;
/// `Review` schedules at day granularity; `Suspended` never reschedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardPhase {
    /// Never graduated, not yet on the ladder
    New,
    /// On the short-interval ladder (stage >= 1)
    Learning {
        /// Current ladder rung, 1-based
        stage: i64,
    },
    /// Graduated, day-granularity scheduling
    Review,
    /// Removed from presentation as a leech
    Suspended,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_try_from_valid() {
        assert_eq!(Rating::try_from(0), Ok(Rating::Again));
        assert_eq!(Rating::try_from(1), Ok(Rating::Hard));
        assert_eq!(Rating::try_from(2), Ok(Rating::Good));
        assert_eq!(Rating::try_from(3), Ok(Rating::Easy));
    }

    #[test]
    fn test_rating_try_from_out_of_range() {
        assert_eq!(Rating::try_from(4), Err(SchedulerError::InvalidRating(4)));
        assert_eq!(Rating::try_from(-1), Err(SchedulerError::InvalidRating(-1)));
        assert_eq!(
            Rating::try_from(100),
            Err(SchedulerError::InvalidRating(100))
        );
    }

    #[test]
    fn test_rating_name_roundtrip() {
        for rating in Rating::ALL {
            assert_eq!(Rating::parse_name(rating.as_str()), Some(rating));
        }
        assert_eq!(Rating::parse_name("fail"), Some(Rating::Again));
        assert_eq!(Rating::parse_name("unknown"), None);
    }

    #[test]
    fn test_new_card_defaults() {
        let state = SchedulerState::new_card(1_000);
        assert_eq!(state.ivl_days, 0);
        assert_eq!(state.ease, 2.5);
        assert_eq!(state.reps, 0);
        assert_eq!(state.lapses, 0);
        assert_eq!(state.due_ts, 1_000);
        assert_eq!(state.learning_stage, 0);
        assert_eq!(state.difficulty, 0.5);
        assert!(!state.suspended);
        assert!(state.is_due(1_000));
    }

    #[test]
    fn test_phase_derivation() {
        let mut state = SchedulerState::new_card(0);
        assert_eq!(state.phase(), CardPhase::New);

        state.learning_stage = 2;
        assert_eq!(state.phase(), CardPhase::Learning { stage: 2 });

        // A lapsed graduate is in learning even though reps > 0
        state.reps = 5;
        assert_eq!(state.phase(), CardPhase::Learning { stage: 2 });

        state.learning_stage = 0;
        assert_eq!(state.phase(), CardPhase::Review);

        state.suspended = true;
        assert_eq!(state.phase(), CardPhase::Suspended);
    }

    #[test]
    fn test_suspended_card_is_never_due() {
        let mut state = SchedulerState::new_card(0);
        state.suspended = true;
        assert!(!state.is_due(i64::MAX));
    }
}
