//! # Retain Core
//!
//! Spaced-repetition study engine. The heart of the crate is a pure,
//! deterministic scheduler; everything else is the plumbing a usable study
//! system needs around it:
//!
//! - **Scheduler**: `schedule(state, rating, now) -> state'` with a two-rung
//!   learning ladder, difficulty-derived ease, and leech suspension
//! - **Deck model**: cards, decks, study statistics
//! - **Store**: SQLite review-state persistence with atomic review
//!   recording and a due-card presentation queue
//! - **Import**: CSV/TSV and JSON archive conversion
//! - **Judge**: optional LLM grading of typed answers (suggestion only;
//!   the learner always confirms the rating)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use retain_core::{NewCardInput, Store};
//!
//! let store = Store::new(None)?;
//! let deck = store.get_or_create_deck("spanish")?;
//! let card = store.add_card(&deck.id, NewCardInput::new("hola", "hello"))?;
//!
//! // Learner answered "good" (rating 2)
//! let card = store.record_review(&card.id, 2)?;
//! assert!(card.state.due_ts > chrono::Utc::now().timestamp_millis());
//! ```
//!
//! The scheduler can also be used on its own, with no storage attached:
//!
//! ```rust
//! use retain_core::{Rating, Scheduler, SchedulerState};
//!
//! let engine = Scheduler::default();
//! let state = SchedulerState::new_card(0);
//! let next = engine.review(&state, Rating::Good, 0);
//! assert_eq!(next.learning_stage, 2);
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod deck;
pub mod import;
pub mod judge;
pub mod scheduler;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Scheduler core
pub use scheduler::{
    schedule, schedule_at, CardPhase, Rating, Scheduler, SchedulerConfig, SchedulerError,
    SchedulerState, MS_PER_DAY, MS_PER_HOUR, MS_PER_MINUTE,
};

// Deck model
pub use deck::{Card, Deck, NewCardInput, ReviewRecord, StudyStats};

// Storage layer
pub use storage::{Result, Store, StoreError};

// Archive import
pub use import::{import_archive, parse_archive, ArchiveFormat, ImportError, ImportReport, RowError};

// Answer judging
pub use judge::{parse_judgment, Judge, JudgeConfig, JudgeError, Judgment, RemoteJudge, ScriptedJudge};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
