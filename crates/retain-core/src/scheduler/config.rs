//! Scheduler policy knobs
//!
//! Every constant here is policy, not mechanism: the transition logic in
//! `engine` never hard-codes a number. The defaults reproduce the reference
//! behavior; change them and the compatibility tests in `engine` will tell
//! you exactly which contract moved.

use serde::{Deserialize, Serialize};

use super::{MS_PER_HOUR, MS_PER_MINUTE};

/// Policy configuration for the transition engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Short-interval learning ladder, milliseconds per rung. Must not be
    /// empty; the first rung doubles as the relearn step after a lapse.
    pub learning_steps_ms: Vec<i64>,
    /// Lapse count at which a card is suspended as a leech
    pub leech_threshold: i64,
    /// Interval floor (days) restored when a card graduates off the ladder
    pub graduating_interval_days: i64,
    /// Per-rating difficulty drift, indexed by rating value (again..easy)
    pub difficulty_deltas: [f64; 4],
    /// Base of the difficulty-to-ease mapping: ease = base - slope * difficulty
    pub ease_base: f64,
    /// Slope of the difficulty-to-ease mapping
    pub ease_difficulty_slope: f64,
    /// Lower ease bound
    pub min_ease: f64,
    /// Upper ease bound
    pub max_ease: f64,
    /// Multiplier applied to the stored interval on a review-mode lapse
    pub lapse_interval_factor: f64,
    /// Review growth for `hard`: ivl *= base + weight * difficulty
    pub hard_interval_base: f64,
    /// Difficulty weight in the `hard` growth factor
    pub hard_difficulty_weight: f64,
    /// Review growth for `good`: ivl *= base + weight * ease
    pub good_interval_base: f64,
    /// Ease weight in the `good` growth factor
    pub good_ease_weight: f64,
    /// Review growth for `easy`: ivl *= base + weight * ease
    pub easy_interval_base: f64,
    /// Ease weight in the `easy` growth factor
    pub easy_ease_weight: f64,
    /// Easy graduation from learning: ivl = base + weight * ease, in days
    pub easy_graduation_base: f64,
    /// Ease weight in the easy-graduation interval
    pub easy_graduation_ease_weight: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            learning_steps_ms: vec![10 * MS_PER_MINUTE, MS_PER_HOUR],
            leech_threshold: 8,
            graduating_interval_days: 1,
            difficulty_deltas: [0.12, 0.06, -0.02, -0.08],
            ease_base: 2.5,
            ease_difficulty_slope: 1.2,
            min_ease: 1.3,
            max_ease: 2.6,
            lapse_interval_factor: 0.5,
            hard_interval_base: 0.7,
            hard_difficulty_weight: 0.1,
            good_interval_base: 1.0,
            good_ease_weight: 0.5,
            easy_interval_base: 1.2,
            easy_ease_weight: 0.8,
            easy_graduation_base: 2.0,
            easy_graduation_ease_weight: 2.0,
        }
    }
}

impl SchedulerConfig {
    /// Number of rungs on the learning ladder
    pub fn ladder_len(&self) -> i64 {
        self.learning_steps_ms.len() as i64
    }
}
