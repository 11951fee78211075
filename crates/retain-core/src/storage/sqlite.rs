//! SQLite Store Implementation
//!
//! The review-state store. All scheduler-state mutation funnels through
//! [`Store::record_review_at`], which performs the read-modify-write step
//! inside a single transaction so concurrent ratings for the same card
//! serialize at the row level.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::deck::{Card, Deck, NewCardInput, ReviewRecord, StudyStats};
use crate::scheduler::{Scheduler, SchedulerError, SchedulerState};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Card or deck not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Scheduler rejected the input (caller bug, e.g. out-of-range rating)
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed card and review-state store
///
/// Uses separate reader/writer connections for interior mutability. All
/// methods take `&self`, making `Store` `Send + Sync` so front-ends can
/// share it behind an `Arc` without an outer lock.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    scheduler: Scheduler,
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Create a store instance, applying pending migrations
    ///
    /// With no explicit path the database lands in the platform data
    /// directory (e.g. `~/.local/share/retain/retain.db` on Linux).
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        Self::with_scheduler(db_path, Scheduler::default())
    }

    /// Create a store with explicit scheduling policy
    pub fn with_scheduler(db_path: Option<PathBuf>, scheduler: Scheduler) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("com", "retain", "retain").ok_or_else(|| {
                    StoreError::Init("Could not determine project directories".to_string())
                })?;

                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                // Restrict directory permissions to owner-only on Unix
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(data_dir, perms);
                }
                data_dir.join("retain.db")
            }
        };

        let writer_conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            scheduler,
        })
    }

    /// The scheduling policy this store applies
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    // ========================================================================
    // DECKS
    // ========================================================================

    /// Fetch a deck by name, creating it if missing
    pub fn get_or_create_deck(&self, name: &str) -> Result<Deck> {
        if let Some(deck) = self.find_deck(name)? {
            return Ok(deck);
        }

        let deck = Deck {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        let writer = self
            .writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))?;
        writer.execute(
            "INSERT INTO decks (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![deck.id, deck.name, deck.created_at.to_rfc3339()],
        )?;

        Ok(deck)
    }

    /// Look up a deck by name
    pub fn find_deck(&self, name: &str) -> Result<Option<Deck>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;
        let deck = reader
            .query_row(
                "SELECT id, name, created_at FROM decks WHERE name = ?1",
                params![name],
                Self::row_to_deck,
            )
            .optional()?;
        Ok(deck)
    }

    /// List all decks, oldest first
    pub fn list_decks(&self) -> Result<Vec<Deck>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;
        let mut stmt =
            reader.prepare("SELECT id, name, created_at FROM decks ORDER BY created_at ASC")?;
        let decks = stmt
            .query_map([], Self::row_to_deck)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decks)
    }

    // ========================================================================
    // CARDS
    // ========================================================================

    /// Add a new card to a deck, due immediately
    pub fn add_card(&self, deck_id: &str, input: NewCardInput) -> Result<Card> {
        let now = Utc::now();
        let card = Card {
            id: Uuid::new_v4().to_string(),
            deck_id: deck_id.to_string(),
            front: input.front,
            back: input.back,
            tags: input.tags,
            created_at: now,
            updated_at: now,
            state: SchedulerState::new_card(now.timestamp_millis()),
        };

        let tags_json = serde_json::to_string(&card.tags).unwrap_or_else(|_| "[]".to_string());

        let writer = self
            .writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))?;
        writer.execute(
            "INSERT INTO cards (
                id, deck_id, front, back, tags, created_at, updated_at,
                ivl_days, ease, reps, lapses, due_ts, learning_stage,
                difficulty, suspended
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15
            )",
            params![
                card.id,
                card.deck_id,
                card.front,
                card.back,
                tags_json,
                card.created_at.to_rfc3339(),
                card.updated_at.to_rfc3339(),
                card.state.ivl_days,
                card.state.ease,
                card.state.reps,
                card.state.lapses,
                card.state.due_ts,
                card.state.learning_stage,
                card.state.difficulty,
                card.state.suspended as i64,
            ],
        )?;

        Ok(card)
    }

    /// Fetch a card by id
    pub fn get_card(&self, id: &str) -> Result<Option<Card>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;
        let card = reader
            .query_row(
                "SELECT * FROM cards WHERE id = ?1",
                params![id],
                Self::row_to_card,
            )
            .optional()?;
        Ok(card)
    }

    /// List cards, newest first, with pagination (export support)
    pub fn list_cards(&self, deck_id: Option<&str>, limit: i64, offset: i64) -> Result<Vec<Card>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;

        let cards = match deck_id {
            Some(deck) => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM cards WHERE deck_id = ?1
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                stmt.query_map(params![deck, limit, offset], Self::row_to_card)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM cards ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
                )?;
                stmt.query_map(params![limit, offset], Self::row_to_card)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(cards)
    }

    /// Delete a card; returns whether a row was removed
    pub fn delete_card(&self, id: &str) -> Result<bool> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))?;
        let affected = writer.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // ========================================================================
    // REVIEW RECORDING
    // ========================================================================

    /// Record a review with the current wall clock
    pub fn record_review(&self, card_id: &str, rating: i64) -> Result<Card> {
        self.record_review_at(card_id, rating, Utc::now().timestamp_millis())
    }

    /// Record a review at an explicit clock
    ///
    /// Read-modify-write in one transaction: the stored state is read, the
    /// engine produces the successor, and the new state plus a log row are
    /// written before commit. An invalid rating aborts before any write.
    pub fn record_review_at(&self, card_id: &str, rating: i64, now_ms: i64) -> Result<Card> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))?;
        let tx = writer.transaction()?;

        let card = tx
            .query_row(
                "SELECT * FROM cards WHERE id = ?1",
                params![card_id],
                Self::row_to_card,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(card_id.to_string()))?;

        let new_state = self.scheduler.apply(&card.state, rating, now_ms)?;

        let reviewed_at = DateTime::from_timestamp_millis(now_ms)
            .ok_or_else(|| StoreError::InvalidTimestamp(now_ms.to_string()))?;

        tx.execute(
            "UPDATE cards SET
                ivl_days = ?1,
                ease = ?2,
                reps = ?3,
                lapses = ?4,
                due_ts = ?5,
                learning_stage = ?6,
                difficulty = ?7,
                suspended = ?8,
                updated_at = ?9
            WHERE id = ?10",
            params![
                new_state.ivl_days,
                new_state.ease,
                new_state.reps,
                new_state.lapses,
                new_state.due_ts,
                new_state.learning_stage,
                new_state.difficulty,
                new_state.suspended as i64,
                reviewed_at.to_rfc3339(),
                card_id,
            ],
        )?;

        tx.execute(
            "INSERT INTO review_log (card_id, rating, reviewed_at, ivl_before, ivl_after, due_after)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                card_id,
                rating,
                reviewed_at.to_rfc3339(),
                card.state.ivl_days,
                new_state.ivl_days,
                new_state.due_ts,
            ],
        )?;

        tx.commit()?;

        if new_state.suspended && !card.state.suspended {
            tracing::warn!(card_id, lapses = new_state.lapses, "card suspended as leech");
        }

        Ok(Card {
            updated_at: reviewed_at,
            state: new_state,
            ..card
        })
    }

    /// Review history for a card, newest first
    pub fn review_history(&self, card_id: &str, limit: i64) -> Result<Vec<ReviewRecord>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT card_id, rating, reviewed_at, ivl_before, ivl_after, due_after
             FROM review_log WHERE card_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let records = stmt
            .query_map(params![card_id, limit], |row| {
                let reviewed_at: String = row.get("reviewed_at")?;
                Ok(ReviewRecord {
                    card_id: row.get("card_id")?,
                    rating: row.get("rating")?,
                    reviewed_at: Self::parse_timestamp(&reviewed_at, "reviewed_at")?,
                    ivl_before: row.get("ivl_before")?,
                    ivl_after: row.get("ivl_after")?,
                    due_after: row.get("due_after")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    // ========================================================================
    // PRESENTATION QUEUE
    // ========================================================================

    /// Pick the next card to present, if any
    ///
    /// Selection order is this product's policy: ladder cards due now come
    /// first (they carry sub-hour timing), then due review cards, then
    /// unseen new cards. Suspended cards never surface.
    pub fn next_card(&self, deck_id: Option<&str>, now_ms: i64) -> Result<Option<Card>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;

        let order = "ORDER BY CASE
                WHEN learning_stage > 0 THEN 0
                WHEN reps > 0 THEN 1
                ELSE 2
            END, due_ts ASC
            LIMIT 1";

        let card = match deck_id {
            Some(deck) => reader
                .query_row(
                    &format!(
                        "SELECT * FROM cards
                         WHERE suspended = 0 AND due_ts <= ?1 AND deck_id = ?2 {order}"
                    ),
                    params![now_ms, deck],
                    Self::row_to_card,
                )
                .optional()?,
            None => reader
                .query_row(
                    &format!("SELECT * FROM cards WHERE suspended = 0 AND due_ts <= ?1 {order}"),
                    params![now_ms],
                    Self::row_to_card,
                )
                .optional()?,
        };
        Ok(card)
    }

    // ========================================================================
    // SUSPENSION
    // ========================================================================

    /// Set the suspension flag directly
    ///
    /// Un-suspending is the external intervention the engine itself never
    /// performs; a cleared card becomes schedulable again at its old due
    /// time.
    pub fn set_suspended(&self, card_id: &str, suspended: bool) -> Result<Card> {
        {
            let writer = self
                .writer
                .lock()
                .map_err(|_| StoreError::Init("Writer lock poisoned".into()))?;
            let affected = writer.execute(
                "UPDATE cards SET suspended = ?1, updated_at = ?2 WHERE id = ?3",
                params![suspended as i64, Utc::now().to_rfc3339(), card_id],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(card_id.to_string()));
            }
        }

        self.get_card(card_id)?
            .ok_or_else(|| StoreError::NotFound(card_id.to_string()))
    }

    /// All suspended cards (leeches), optionally restricted to a deck
    pub fn suspended_cards(&self, deck_id: Option<&str>) -> Result<Vec<Card>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;

        let cards = match deck_id {
            Some(deck) => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM cards WHERE suspended = 1 AND deck_id = ?1
                     ORDER BY lapses DESC",
                )?;
                stmt.query_map(params![deck], Self::row_to_card)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = reader
                    .prepare("SELECT * FROM cards WHERE suspended = 1 ORDER BY lapses DESC")?;
                stmt.query_map([], Self::row_to_card)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(cards)
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Queue statistics, optionally restricted to a deck
    pub fn stats(&self, deck_id: Option<&str>, now_ms: i64) -> Result<StudyStats> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))?;

        let select = "SELECT
                COUNT(*),
                SUM(CASE WHEN suspended = 0 AND due_ts <= ?1 THEN 1 ELSE 0 END),
                SUM(CASE WHEN suspended = 0 AND reps = 0 AND learning_stage = 0 THEN 1 ELSE 0 END),
                SUM(CASE WHEN suspended = 0 AND learning_stage > 0 THEN 1 ELSE 0 END),
                SUM(CASE WHEN suspended = 0 AND learning_stage = 0 AND reps > 0 THEN 1 ELSE 0 END),
                SUM(CASE WHEN suspended = 1 THEN 1 ELSE 0 END),
                AVG(CASE WHEN suspended = 0 THEN difficulty END),
                AVG(CASE WHEN suspended = 0 THEN ease END)
            FROM cards";

        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<StudyStats> {
            Ok(StudyStats {
                total_cards: row.get::<_, Option<i64>>(0)?.unwrap_or(0),
                due_now: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                new_cards: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                learning_cards: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                review_cards: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                suspended_cards: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                average_difficulty: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                average_ease: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            })
        };

        let stats = match deck_id {
            Some(deck) => reader.query_row(
                &format!("{select} WHERE deck_id = ?2"),
                params![now_ms, deck],
                map_row,
            )?,
            None => reader.query_row(select, params![now_ms], map_row)?,
        };
        Ok(stats)
    }

    // ========================================================================
    // ROW MAPPING
    // ========================================================================

    /// Parse RFC3339 timestamp
    fn parse_timestamp(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Invalid {} timestamp '{}': {}", field_name, value, e),
                    )),
                )
            })
    }

    /// Convert a row to a Card
    fn row_to_card(row: &rusqlite::Row) -> rusqlite::Result<Card> {
        let tags_json: String = row.get("tags")?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let suspended: i64 = row.get("suspended")?;

        Ok(Card {
            id: row.get("id")?,
            deck_id: row.get("deck_id")?,
            front: row.get("front")?,
            back: row.get("back")?,
            tags,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
            state: SchedulerState {
                ivl_days: row.get("ivl_days")?,
                ease: row.get("ease")?,
                reps: row.get("reps")?,
                lapses: row.get("lapses")?,
                due_ts: row.get("due_ts")?,
                learning_stage: row.get("learning_stage")?,
                difficulty: row.get("difficulty")?,
                suspended: suspended != 0,
            },
        })
    }

    fn row_to_deck(row: &rusqlite::Row) -> rusqlite::Result<Deck> {
        let created_at: String = row.get("created_at")?;
        Ok(Deck {
            id: row.get("id")?,
            name: row.get("name")?,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
