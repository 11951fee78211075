//! Transition engine
//!
//! [`Scheduler::review`] is the single entry point: pure, deterministic
//! given (state, rating, now), and total over valid ratings. Callers that
//! hold a raw integer rating go through [`Scheduler::apply`], which is the
//! one place `InvalidRating` can surface.

use super::config::SchedulerConfig;
use super::state::{CardPhase, Rating, SchedulerError, SchedulerState};
use super::MS_PER_DAY;

// ============================================================================
// SCHEDULER
// ============================================================================

/// Spaced-repetition transition engine
///
/// Holds only policy; all state lives in the [`SchedulerState`] records it
/// transforms. A single instance can serve every card in the system.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create an engine with explicit policy
    pub fn new(config: SchedulerConfig) -> Self {
        debug_assert!(!config.learning_steps_ms.is_empty());
        Self { config }
    }

    /// The active policy
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate a raw rating value, then apply one transition
    pub fn apply(
        &self,
        state: &SchedulerState,
        rating: i64,
        now_ms: i64,
    ) -> Result<SchedulerState, SchedulerError> {
        Ok(self.review(state, Rating::try_from(rating)?, now_ms))
    }

    /// Apply one review transition
    ///
    /// The input is never mutated; the returned record is fully populated.
    /// Not idempotent: each call advances the card one step.
    pub fn review(&self, state: &SchedulerState, rating: Rating, now_ms: i64) -> SchedulerState {
        // Suspended cards never reschedule
        if state.suspended {
            return state.clone();
        }

        let mut next = state.clone();

        // Difficulty drifts before any interval logic; ease is a view of it
        let delta = self.config.difficulty_deltas[rating.as_i64() as usize];
        next.difficulty = (next.difficulty + delta).clamp(0.0, 1.0);
        next.ease = self.ease_for(next.difficulty);

        match state.phase() {
            CardPhase::New | CardPhase::Learning { .. } => {
                self.step_learning(&mut next, rating, now_ms)
            }
            CardPhase::Review => self.step_review(&mut next, rating, now_ms),
            // Handled by the short-circuit above
            CardPhase::Suspended => unreachable!(),
        }

        next
    }

    fn ease_for(&self, difficulty: f64) -> f64 {
        (self.config.ease_base - difficulty * self.config.ease_difficulty_slope)
            .clamp(self.config.min_ease, self.config.max_ease)
    }

    /// Learning mode: short-interval ladder, sub-day granularity
    fn step_learning(&self, next: &mut SchedulerState, rating: Rating, now_ms: i64) {
        match rating {
            Rating::Again => {
                next.lapses += 1;
                next.learning_stage = 1;
                // Interval is preserved, never forced back to zero
                next.ivl_days = next.ivl_days.max(1);
                next.due_ts = now_ms + self.config.learning_steps_ms[0];
                self.check_leech(next);
            }
            Rating::Hard | Rating::Good => {
                // Brand-new cards enter the ladder on first answer
                if next.reps == 0 && next.learning_stage == 0 {
                    next.learning_stage = 1;
                }
                if rating == Rating::Good {
                    next.learning_stage += 1;
                }
                if next.learning_stage <= self.config.ladder_len() {
                    let rung = (next.learning_stage - 1) as usize;
                    next.due_ts = now_ms + self.config.learning_steps_ms[rung];
                } else {
                    self.graduate(next, now_ms);
                }
            }
            Rating::Easy => {
                // Skip the remaining rungs entirely
                next.learning_stage = 0;
                next.reps += 1;
                let ivl = self.config.easy_graduation_base
                    + self.config.easy_graduation_ease_weight * next.ease;
                next.ivl_days = (ivl.round() as i64).max(1);
                next.due_ts = now_ms + next.ivl_days * MS_PER_DAY;
            }
        }
    }

    /// Review mode: day-granularity growth from the stored interval
    fn step_review(&self, next: &mut SchedulerState, rating: Rating, now_ms: i64) {
        match rating {
            Rating::Again => {
                next.lapses += 1;
                // Relapse into the ladder; reps stays - a lapse does not
                // un-graduate the card
                next.learning_stage = 1;
                next.ivl_days = round_days(next.ivl_days as f64 * self.config.lapse_interval_factor);
                next.due_ts = now_ms + self.config.learning_steps_ms[0];
                self.check_leech(next);
            }
            Rating::Hard | Rating::Good | Rating::Easy => {
                let factor = match rating {
                    Rating::Hard => {
                        self.config.hard_interval_base
                            + self.config.hard_difficulty_weight * next.difficulty
                    }
                    Rating::Good => {
                        self.config.good_interval_base + self.config.good_ease_weight * next.ease
                    }
                    Rating::Easy => {
                        self.config.easy_interval_base + self.config.easy_ease_weight * next.ease
                    }
                    Rating::Again => unreachable!(),
                };
                next.ivl_days = round_days(next.ivl_days as f64 * factor);
                next.reps += 1;
                next.due_ts = now_ms + next.ivl_days * MS_PER_DAY;
            }
        }
    }

    /// Ladder exhausted: back to day granularity
    ///
    /// Restores `max(1, previous interval)` rather than a hard 1 so a
    /// relapsed card resumes from its halved post-lapse baseline.
    fn graduate(&self, next: &mut SchedulerState, now_ms: i64) {
        next.learning_stage = 0;
        next.reps += 1;
        next.ivl_days = next.ivl_days.max(self.config.graduating_interval_days);
        next.due_ts = now_ms + next.ivl_days * MS_PER_DAY;
    }

    fn check_leech(&self, next: &mut SchedulerState) {
        if next.lapses >= self.config.leech_threshold {
            next.suspended = true;
        }
    }
}

/// Round a day count half-away-from-zero and floor it at one day
fn round_days(days: f64) -> i64 {
    (days.round() as i64).max(1)
}

// ============================================================================
// FREE FUNCTIONS
// ============================================================================

/// One transition with the default policy and an injected clock
pub fn schedule_at(
    state: &SchedulerState,
    rating: i64,
    now_ms: i64,
) -> Result<SchedulerState, SchedulerError> {
    Scheduler::default().apply(state, rating, now_ms)
}

/// One transition with the default policy and the current wall clock
pub fn schedule(state: &SchedulerState, rating: i64) -> Result<SchedulerState, SchedulerError> {
    schedule_at(state, rating, chrono::Utc::now().timestamp_millis())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::super::{MS_PER_DAY, MS_PER_HOUR, MS_PER_MINUTE};
    use super::*;

    /// Fixed reference clock for deterministic transitions
    const T: i64 = 1_700_000_000_000;

    fn engine() -> Scheduler {
        Scheduler::default()
    }

    fn new_card() -> SchedulerState {
        SchedulerState::new_card(T)
    }

    fn review_card(ivl_days: i64, reps: i64) -> SchedulerState {
        SchedulerState {
            ivl_days,
            ease: 2.0,
            reps,
            lapses: 0,
            due_ts: T,
            learning_stage: 0,
            difficulty: 0.5,
            suspended: false,
        }
    }

    // ========================================================================
    // SUSPENSION
    // ========================================================================

    #[test]
    fn test_suspension_is_sticky() {
        let mut state = review_card(10, 5);
        state.suspended = true;
        state.due_ts = T - MS_PER_DAY;

        for rating in Rating::ALL {
            let out = engine().review(&state, rating, T);
            assert_eq!(out, state, "rating {rating} must not touch a suspended card");
        }
    }

    #[test]
    fn test_leech_threshold_in_learning_mode() {
        let mut state = new_card();
        state.learning_stage = 1;
        state.lapses = 7;

        let out = engine().review(&state, Rating::Again, T);
        assert_eq!(out.lapses, 8);
        assert!(out.suspended);
    }

    #[test]
    fn test_leech_threshold_in_review_mode() {
        let mut state = review_card(12, 4);
        state.lapses = 7;

        let out = engine().review(&state, Rating::Again, T);
        assert_eq!(out.lapses, 8);
        assert!(out.suspended);
        // The due time is still advanced before the flag lands
        assert_eq!(out.due_ts, T + 10 * MS_PER_MINUTE);
    }

    #[test]
    fn test_one_lapse_below_threshold_stays_active() {
        let mut state = review_card(12, 4);
        state.lapses = 6;

        let out = engine().review(&state, Rating::Again, T);
        assert_eq!(out.lapses, 7);
        assert!(!out.suspended);
    }

    // ========================================================================
    // LEARNING MODE
    // ========================================================================

    #[test]
    fn test_new_card_good_lands_on_second_rung() {
        let out = engine().review(&new_card(), Rating::Good, T);

        // Entry sets stage 1, the good advance moves it to 2: still on the
        // ladder, so the card is not graduated yet
        assert_eq!(out.learning_stage, 2);
        assert_eq!(out.reps, 0);
        assert_eq!(out.ivl_days, 0);
        assert_eq!(out.due_ts, T + MS_PER_HOUR);
        assert!((out.difficulty - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_new_card_hard_stays_on_first_rung() {
        let out = engine().review(&new_card(), Rating::Hard, T);

        assert_eq!(out.learning_stage, 1);
        assert_eq!(out.reps, 0);
        assert_eq!(out.due_ts, T + 10 * MS_PER_MINUTE);
    }

    #[test]
    fn test_new_card_easy_graduates_immediately() {
        let out = engine().review(&new_card(), Rating::Easy, T);

        // difficulty 0.5 - 0.08 = 0.42, ease 2.5 - 0.42 * 1.2 = 1.996,
        // ivl = round(2 + 2 * 1.996) = 6
        assert_eq!(out.learning_stage, 0);
        assert_eq!(out.reps, 1);
        assert!((out.difficulty - 0.42).abs() < 1e-9);
        assert!((out.ease - 1.996).abs() < 1e-9);
        assert_eq!(out.ivl_days, 6);
        assert_eq!(out.due_ts, T + 6 * MS_PER_DAY);
    }

    #[test]
    fn test_new_card_again_enters_ladder_with_interval_floor() {
        let out = engine().review(&new_card(), Rating::Again, T);

        assert_eq!(out.lapses, 1);
        assert_eq!(out.learning_stage, 1);
        assert_eq!(out.reps, 0);
        assert_eq!(out.ivl_days, 1, "interval is never forced back to zero");
        assert_eq!(out.due_ts, T + 10 * MS_PER_MINUTE);
    }

    #[test]
    fn test_hard_on_second_rung_repeats_it() {
        let mut state = new_card();
        state.learning_stage = 2;

        let out = engine().review(&state, Rating::Hard, T);
        assert_eq!(out.learning_stage, 2);
        assert_eq!(out.due_ts, T + MS_PER_HOUR);
    }

    #[test]
    fn test_good_off_last_rung_graduates() {
        let mut state = new_card();
        state.learning_stage = 2;

        let out = engine().review(&state, Rating::Good, T);
        assert_eq!(out.learning_stage, 0);
        assert_eq!(out.reps, 1);
        assert_eq!(out.ivl_days, 1);
        assert_eq!(out.due_ts, T + MS_PER_DAY);
    }

    // ========================================================================
    // REVIEW MODE
    // ========================================================================

    #[test]
    fn test_review_fail_relapses_and_halves_interval() {
        let state = review_card(10, 5);

        let out = engine().review(&state, Rating::Again, T);
        assert_eq!(out.lapses, 1);
        assert_eq!(out.learning_stage, 1);
        assert_eq!(out.due_ts, T + 600_000);
        assert_eq!(out.ivl_days, 5);
        assert_eq!(out.reps, 5, "a lapse does not un-graduate the rep count");
    }

    #[test]
    fn test_review_hard_shrinks_interval() {
        let out = engine().review(&review_card(10, 5), Rating::Hard, T);

        // difficulty 0.5 + 0.06 = 0.56, factor 0.7 + 0.1 * 0.56 = 0.756
        assert_eq!(out.ivl_days, 8);
        assert_eq!(out.reps, 6);
        assert_eq!(out.due_ts, T + 8 * MS_PER_DAY);
    }

    #[test]
    fn test_review_good_grows_interval() {
        let out = engine().review(&review_card(10, 5), Rating::Good, T);

        // difficulty 0.48, ease 1.924, factor 1 + 0.5 * 1.924 = 1.962
        assert_eq!(out.ivl_days, 20);
        assert_eq!(out.reps, 6);
        assert_eq!(out.due_ts, T + 20 * MS_PER_DAY);
    }

    #[test]
    fn test_review_easy_grows_interval_fastest() {
        let out = engine().review(&review_card(10, 5), Rating::Easy, T);

        // difficulty 0.42, ease 1.996, factor 1.2 + 0.8 * 1.996 = 2.7968
        assert_eq!(out.ivl_days, 28);
        assert_eq!(out.reps, 6);
        assert_eq!(out.due_ts, T + 28 * MS_PER_DAY);
    }

    #[test]
    fn test_hard_never_drops_interval_below_one_day() {
        let out = engine().review(&review_card(1, 1), Rating::Hard, T);
        assert_eq!(out.ivl_days, 1);
    }

    // ========================================================================
    // RELAPSE COUPLING
    // ========================================================================

    /// A lapsed graduate is simultaneously counted as graduated (reps > 0)
    /// and on the learning ladder. It climbs back and re-graduates to the
    /// halved baseline, not to a one-day reset.
    #[test]
    fn test_relapsed_card_regraduates_to_halved_baseline() {
        let sched = engine();
        let state = review_card(10, 5);

        let lapsed = sched.review(&state, Rating::Again, T);
        assert_eq!(lapsed.ivl_days, 5);
        assert_eq!(lapsed.learning_stage, 1);
        assert_eq!(lapsed.reps, 5);

        let climbing = sched.review(&lapsed, Rating::Good, T + MS_PER_HOUR);
        assert_eq!(climbing.learning_stage, 2);
        assert_eq!(climbing.reps, 5);
        assert_eq!(climbing.due_ts, T + 2 * MS_PER_HOUR);

        let graduated = sched.review(&climbing, Rating::Good, T + 2 * MS_PER_HOUR);
        assert_eq!(graduated.learning_stage, 0);
        assert_eq!(graduated.reps, 6);
        assert_eq!(graduated.ivl_days, 5);
        assert_eq!(graduated.due_ts, T + 2 * MS_PER_HOUR + 5 * MS_PER_DAY);
    }

    // ========================================================================
    // INVARIANTS
    // ========================================================================

    #[test]
    fn test_reps_never_decrease() {
        let sched = engine();
        let starts = [
            new_card(),
            review_card(10, 5),
            SchedulerState {
                learning_stage: 2,
                reps: 3,
                ..review_card(4, 3)
            },
        ];

        for start in &starts {
            for rating in Rating::ALL {
                let out = sched.review(start, rating, T);
                assert!(
                    out.reps >= start.reps,
                    "reps decreased for rating {rating} from {start:?}"
                );
            }
        }
    }

    #[test]
    fn test_interval_floor_once_non_new() {
        let sched = engine();
        let mut state = new_card();

        // Walk a card through fail, climb, graduate, fail again
        for rating in [
            Rating::Again,
            Rating::Good,
            Rating::Good,
            Rating::Good,
            Rating::Again,
            Rating::Hard,
        ] {
            state = sched.review(&state, rating, T);
            assert!(state.ivl_days >= 1, "interval fell below floor: {state:?}");
        }
    }

    #[test]
    fn test_difficulty_and_ease_stay_bounded() {
        let sched = engine();

        let mut hard = review_card(10, 5);
        for _ in 0..20 {
            hard = sched.review(&hard, Rating::Hard, T);
            assert!((0.0..=1.0).contains(&hard.difficulty));
            assert!((1.3..=2.6).contains(&hard.ease));
        }
        assert_eq!(hard.difficulty, 1.0);
        assert_eq!(hard.ease, 1.3);

        let mut easy = review_card(10, 5);
        for _ in 0..20 {
            easy = sched.review(&easy, Rating::Easy, T);
            assert!((0.0..=1.0).contains(&easy.difficulty));
            assert!((1.3..=2.6).contains(&easy.ease));
        }
        assert_eq!(easy.difficulty, 0.0);
        assert_eq!(easy.ease, 2.5);
    }

    #[test]
    fn test_due_is_always_in_the_future() {
        let sched = engine();
        let starts = [new_card(), review_card(10, 5)];

        for start in &starts {
            for rating in Rating::ALL {
                let out = sched.review(start, rating, T);
                assert!(out.due_ts > T, "rating {rating} left due_ts at/before now");
            }
        }
    }

    // ========================================================================
    // RATING VALIDATION
    // ========================================================================

    #[test]
    fn test_invalid_rating_is_rejected() {
        let err = engine().apply(&new_card(), 5, T).unwrap_err();
        assert_eq!(err, SchedulerError::InvalidRating(5));

        let err = schedule_at(&new_card(), -2, T).unwrap_err();
        assert_eq!(err, SchedulerError::InvalidRating(-2));
    }

    #[test]
    fn test_apply_matches_review_for_valid_ratings() {
        let state = review_card(10, 5);
        for rating in Rating::ALL {
            let via_apply = engine().apply(&state, rating.as_i64(), T).unwrap();
            let via_review = engine().review(&state, rating, T);
            assert_eq!(via_apply, via_review);
        }
    }
}
