//! Spaced-Repetition Scheduler
//!
//! The pure core of retain: a deterministic transition function that maps
//! (current card state, learner rating, clock) to the next card state.
//!
//! Properties:
//! - No I/O and no shared mutable state; safe to call concurrently for
//!   different cards without coordination
//! - Two-rung learning ladder (10 minutes, 1 hour) before day-granularity
//!   review scheduling
//! - Difficulty is the primary estimate; ease is derived from it on every
//!   transition
//! - Repeated lapses suspend the card as a leech, which is terminal for
//!   this engine

mod config;
mod engine;
mod state;

pub use config::SchedulerConfig;
pub use engine::{schedule, schedule_at, Scheduler};
pub use state::{CardPhase, Rating, SchedulerError, SchedulerState};

/// Milliseconds in one minute
pub const MS_PER_MINUTE: i64 = 60_000;

/// Milliseconds in one hour
pub const MS_PER_HOUR: i64 = 3_600_000;

/// Milliseconds in one day
pub const MS_PER_DAY: i64 = 86_400_000;
