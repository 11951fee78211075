//! Retain CLI
//!
//! Command-line front-end for the retain study system: add cards, run
//! review sessions, inspect queues, move archives in and out.

mod session;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use retain_core::{ArchiveFormat, Card, Deck, NewCardInput, Store};
use tracing_subscriber::EnvFilter;

/// Retain - spaced-repetition study CLI
#[derive(Parser)]
#[command(name = "retain")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Flashcard study with spaced-repetition scheduling")]
#[command(
    long_about = "Retain schedules flashcards with a spaced-repetition engine:\nshort learning steps first, day-granularity review after graduation,\nand automatic suspension of cards you keep forgetting."
)]
struct Cli {
    /// Custom database file (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a card to a deck
    Add {
        /// Prompt side
        front: String,
        /// Answer side
        back: String,
        /// Deck to add to (created if missing)
        #[arg(long, default_value = "default")]
        deck: String,
        /// Tags (comma-separated)
        #[arg(long)]
        tags: Option<String>,
    },

    /// List decks with queue counts
    Decks,

    /// Run an interactive review session
    Review {
        /// Restrict the session to one deck
        #[arg(long)]
        deck: Option<String>,
        /// Maximum cards to review this session
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Type answers and let the configured LLM judge grade them
        #[arg(long)]
        judge: bool,
    },

    /// Show study statistics
    Stats {
        /// Restrict to one deck
        #[arg(long)]
        deck: Option<String>,
    },

    /// Import a flashcard archive (csv, tsv or json)
    Import {
        /// Path to the archive file
        file: PathBuf,
        /// Target deck (created if missing)
        #[arg(long, default_value = "default")]
        deck: String,
        /// Archive format; inferred from the file extension if omitted
        #[arg(long)]
        format: Option<String>,
    },

    /// Export cards in JSON or JSONL format
    Export {
        /// Output file path
        output: PathBuf,
        /// Export format: json or jsonl
        #[arg(long, default_value = "json")]
        format: String,
        /// Only export one deck
        #[arg(long)]
        deck: Option<String>,
    },

    /// List cards suspended as leeches
    Leeches {
        /// Restrict to one deck
        #[arg(long)]
        deck: Option<String>,
    },

    /// Clear the leech flag on a card so it schedules again
    Unsuspend {
        /// Card id (full UUID)
        id: String,
    },

    /// Show the review history of a card
    History {
        /// Card id (full UUID)
        id: String,
        /// Maximum rows to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

fn main() -> anyhow::Result<()> {
    // Logging to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.db)?;

    match cli.command {
        Commands::Add {
            front,
            back,
            deck,
            tags,
        } => run_add(&store, front, back, deck, tags),
        Commands::Decks => run_decks(&store),
        Commands::Review { deck, limit, judge } => session::run_review(&store, deck, limit, judge),
        Commands::Stats { deck } => run_stats(&store, deck),
        Commands::Import { file, deck, format } => run_import(&store, file, deck, format),
        Commands::Export {
            output,
            format,
            deck,
        } => run_export(&store, output, format, deck),
        Commands::Leeches { deck } => run_leeches(&store, deck),
        Commands::Unsuspend { id } => run_unsuspend(&store, id),
        Commands::History { id, limit } => run_history(&store, id, limit),
    }
}

fn open_store(db: Option<PathBuf>) -> anyhow::Result<Store> {
    Store::new(db).context("failed to open the card store")
}

/// Resolve a deck name that must already exist
fn resolve_deck(store: &Store, name: &str) -> anyhow::Result<Deck> {
    store
        .find_deck(name)?
        .with_context(|| format!("deck '{name}' not found"))
}

/// Run add command
fn run_add(
    store: &Store,
    front: String,
    back: String,
    deck: String,
    tags: Option<String>,
) -> anyhow::Result<()> {
    if front.trim().is_empty() {
        anyhow::bail!("Front cannot be empty");
    }

    let tag_list: Vec<String> = tags
        .as_deref()
        .map(|t| {
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let deck = store.get_or_create_deck(&deck)?;
    let card = store.add_card(
        &deck.id,
        NewCardInput {
            front,
            back,
            tags: tag_list,
        },
    )?;

    println!(
        "{} {} {}",
        "Added".green().bold(),
        card.id[..8].dimmed(),
        truncate(&card.front, 60)
    );
    Ok(())
}

/// Run decks command
fn run_decks(store: &Store) -> anyhow::Result<()> {
    let decks = store.list_decks()?;
    if decks.is_empty() {
        println!("{}", "No decks yet. Try `retain add`.".dimmed());
        return Ok(());
    }

    let now = Utc::now().timestamp_millis();
    println!("{}", "=== Decks ===".cyan().bold());
    println!();
    for deck in decks {
        let stats = store.stats(Some(&deck.id), now)?;
        println!(
            "{:20} {:>4} cards  {:>4} due  {:>4} new  {:>4} suspended",
            deck.name.white().bold(),
            stats.total_cards,
            stats.due_now.to_string().green(),
            stats.new_cards,
            stats.suspended_cards.to_string().red(),
        );
    }
    Ok(())
}

/// Run stats command
fn run_stats(store: &Store, deck: Option<String>) -> anyhow::Result<()> {
    let now = Utc::now().timestamp_millis();
    let (label, deck_id) = match deck {
        Some(name) => {
            let deck = resolve_deck(store, &name)?;
            (name, Some(deck.id))
        }
        None => ("all decks".to_string(), None),
    };

    let stats = store.stats(deck_id.as_deref(), now)?;

    println!("{}", format!("=== Retain Statistics ({label}) ===").cyan().bold());
    println!();
    println!("{}: {}", "Total Cards".white().bold(), stats.total_cards);
    println!("{}: {}", "Due Now".white().bold(), stats.due_now);
    println!(
        "{}: {:.2}",
        "Average Difficulty".white().bold(),
        stats.average_difficulty
    );
    println!("{}: {:.2}", "Average Ease".white().bold(), stats.average_ease);

    let total = stats.total_cards as usize;
    if total > 0 {
        println!();
        println!("{}", "=== Queue Distribution ===".yellow().bold());
        print_distribution_bar("New", stats.new_cards as usize, total, "cyan");
        print_distribution_bar("Learning", stats.learning_cards as usize, total, "yellow");
        print_distribution_bar("Review", stats.review_cards as usize, total, "green");
        print_distribution_bar("Suspended", stats.suspended_cards as usize, total, "red");
    }
    Ok(())
}

/// Print a distribution bar
fn print_distribution_bar(label: &str, count: usize, total: usize, color: &str) {
    let percentage = if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    let bar_width: usize = 30;
    let filled = ((percentage / 100.0) * bar_width as f64) as usize;
    let empty = bar_width.saturating_sub(filled);

    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(empty));
    let colored_bar = match color {
        "green" => bar.green(),
        "yellow" => bar.yellow(),
        "red" => bar.red(),
        "cyan" => bar.cyan(),
        _ => bar.white(),
    };

    println!(
        "  {:12} [{:30}] {:>4} ({:>5.1}%)",
        label, colored_bar, count, percentage
    );
}

/// Run import command
fn run_import(
    store: &Store,
    file: PathBuf,
    deck: String,
    format: Option<String>,
) -> anyhow::Result<()> {
    let format_name = match format {
        Some(f) => f,
        None => file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string(),
    };
    let format = ArchiveFormat::parse_name(&format_name).with_context(|| {
        format!("unknown archive format '{format_name}' (expected csv, tsv or json)")
    })?;

    println!("{}", "=== Retain Import ===".cyan().bold());
    println!();
    println!("{}: {}", "File".white().bold(), file.display());
    println!("{}: {:?}", "Format".white().bold(), format);
    println!("{}: {}", "Deck".white().bold(), deck);
    println!();

    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("could not read {}", file.display()))?;
    let report = retain_core::import_archive(store, &deck, &content, format)?;

    for row_error in &report.row_errors {
        println!(
            "  {} line {}: {}",
            "SKIP".yellow(),
            row_error.line,
            row_error.reason
        );
    }

    println!(
        "{}",
        format!(
            "Import complete: {} added, {} duplicates skipped, {} bad rows",
            report.imported,
            report.skipped,
            report.row_errors.len()
        )
        .green()
        .bold()
    );
    Ok(())
}

/// Fetch all cards from the store using pagination
fn fetch_all_cards(store: &Store, deck_id: Option<&str>) -> anyhow::Result<Vec<Card>> {
    let mut all_cards = Vec::new();
    let page_size = 500;
    let mut offset = 0;

    loop {
        let batch = store.list_cards(deck_id, page_size, offset)?;
        let batch_len = batch.len();
        all_cards.extend(batch);
        if batch_len < page_size as usize {
            break;
        }
        offset += page_size;
    }

    Ok(all_cards)
}

/// Run export command - exports cards in JSON or JSONL format
fn run_export(
    store: &Store,
    output: PathBuf,
    format: String,
    deck: Option<String>,
) -> anyhow::Result<()> {
    if format != "json" && format != "jsonl" {
        anyhow::bail!("Invalid format '{}'. Must be 'json' or 'jsonl'.", format);
    }

    let deck_id = match deck {
        Some(name) => Some(resolve_deck(store, &name)?.id),
        None => None,
    };
    let cards = fetch_all_cards(store, deck_id.as_deref())?;

    if let Some(parent) = output.parent()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(&output)?;
    let mut writer = BufWriter::new(file);

    match format.as_str() {
        "json" => {
            serde_json::to_writer_pretty(&mut writer, &cards)?;
            writer.write_all(b"\n")?;
        }
        "jsonl" => {
            for card in &cards {
                serde_json::to_writer(&mut writer, card)?;
                writer.write_all(b"\n")?;
            }
        }
        _ => unreachable!(),
    }

    writer.flush()?;

    println!(
        "{}",
        format!(
            "Exported {} cards to {} ({})",
            cards.len(),
            output.display(),
            format
        )
        .green()
        .bold()
    );
    Ok(())
}

/// Run leeches command
fn run_leeches(store: &Store, deck: Option<String>) -> anyhow::Result<()> {
    let deck_id = match deck {
        Some(name) => Some(resolve_deck(store, &name)?.id),
        None => None,
    };
    let leeches = store.suspended_cards(deck_id.as_deref())?;

    println!("{}", "=== Suspended Leeches ===".cyan().bold());
    println!();
    if leeches.is_empty() {
        println!("{}", "No suspended cards.".green());
        return Ok(());
    }

    for card in &leeches {
        println!(
            "  {} [{} lapses] {}",
            card.id.dimmed(),
            card.state.lapses.to_string().red(),
            truncate(&card.front, 50)
        );
    }
    println!();
    println!(
        "{}",
        format!(
            "{} cards suspended. Use `retain unsuspend <id>` to restore one.",
            leeches.len()
        )
        .yellow()
    );
    Ok(())
}

/// Run unsuspend command
fn run_unsuspend(store: &Store, id: String) -> anyhow::Result<()> {
    let card = store.set_suspended(&id, false)?;
    println!(
        "{} {} {}",
        "Unsuspended".green().bold(),
        card.id[..8].dimmed(),
        truncate(&card.front, 60)
    );
    println!(
        "  The card keeps its {} lapses and re-enters the queue at its old due time.",
        card.state.lapses
    );
    Ok(())
}

/// Run history command
fn run_history(store: &Store, id: String, limit: i64) -> anyhow::Result<()> {
    let card = store
        .get_card(&id)?
        .with_context(|| format!("card '{id}' not found"))?;
    let history = store.review_history(&id, limit)?;

    println!("{}", "=== Review History ===".cyan().bold());
    println!();
    println!("{}: {}", "Card".white().bold(), truncate(&card.front, 60));
    println!(
        "{}: reps {}  lapses {}  interval {}d",
        "State".white().bold(),
        card.state.reps,
        card.state.lapses,
        card.state.ivl_days
    );
    println!();

    if history.is_empty() {
        println!("{}", "Never reviewed.".dimmed());
        return Ok(());
    }

    for record in &history {
        let rating = match record.rating {
            0 => "again".red(),
            1 => "hard".yellow(),
            2 => "good".green(),
            3 => "easy".cyan(),
            _ => "?".white(),
        };
        println!(
            "  {}  {:5}  {:>3}d -> {:>3}d",
            record.reviewed_at.format("%Y-%m-%d %H:%M"),
            rating,
            record.ivl_before,
            record.ivl_after
        );
    }
    Ok(())
}

/// Truncate a string for display (UTF-8 safe)
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
