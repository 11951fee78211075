//! Interactive review session
//!
//! Drives the store -> scheduler -> store loop: pull the next due card,
//! collect a rating (typed straight in, or suggested by the LLM judge),
//! record the transition, show when the card comes back.

use std::io::{self, Write};

use anyhow::Context;
use chrono::Utc;
use colored::Colorize;
use retain_core::{
    Card, Judge, RemoteJudge, Rating, Store, MS_PER_DAY, MS_PER_HOUR, MS_PER_MINUTE,
};

/// Outcome of one card prompt
enum PromptResult {
    /// Learner picked a rating
    Rated(i64),
    /// Learner asked to end the session
    Quit,
}

/// Run an interactive review session
pub fn run_review(
    store: &Store,
    deck: Option<String>,
    limit: usize,
    use_judge: bool,
) -> anyhow::Result<()> {
    let deck_id = match deck {
        Some(name) => Some(
            store
                .find_deck(&name)?
                .with_context(|| format!("deck '{name}' not found"))?
                .id,
        ),
        None => None,
    };

    // The judge is optional and its failure is never fatal to the session
    let judge = if use_judge {
        let judge = RemoteJudge::from_env();
        if judge.is_available() {
            Some(judge)
        } else {
            println!(
                "{}",
                "Judge not configured (set RETAIN_LLM_API_KEY); rating manually.".yellow()
            );
            None
        }
    } else {
        None
    };
    let runtime = match &judge {
        Some(_) => Some(tokio::runtime::Runtime::new()?),
        None => None,
    };

    println!("{}", "=== Review Session ===".cyan().bold());
    println!("{}", "Ratings: 0=again  1=hard  2=good  3=easy  q=quit".dimmed());

    let mut reviewed = 0usize;
    let mut again_count = 0usize;

    while reviewed < limit {
        let now = Utc::now().timestamp_millis();
        let Some(card) = store.next_card(deck_id.as_deref(), now)? else {
            break;
        };

        println!();
        println!(
            "{} {}",
            format!("[{}]", reviewed + 1).dimmed(),
            card.front.white().bold()
        );

        let result = match (&judge, &runtime) {
            (Some(judge), Some(rt)) => prompt_with_judge(judge, rt, &card)?,
            _ => prompt_manual(&card)?,
        };

        let rating = match result {
            PromptResult::Rated(rating) => rating,
            PromptResult::Quit => {
                println!("{}", "Session ended.".dimmed());
                break;
            }
        };

        let updated = store.record_review(&card.id, rating)?;
        if rating == Rating::Again.as_i64() {
            again_count += 1;
        }

        if updated.state.suspended && !card.state.suspended {
            println!(
                "{}",
                "Suspended as a leech. Restore it later with `retain unsuspend`.".red()
            );
        } else {
            println!(
                "{} next review {}",
                "Scheduled:".green(),
                format_relative(updated.state.due_ts - now).cyan()
            );
        }
        reviewed += 1;
    }

    println!();
    if reviewed == 0 {
        println!("{}", "All caught up - nothing due right now.".green().bold());
    } else {
        println!(
            "{}",
            format!(
                "Session complete: {} reviewed, {} forgotten",
                reviewed, again_count
            )
            .green()
            .bold()
        );
    }
    Ok(())
}

/// Reveal-then-rate flow
fn prompt_manual(card: &Card) -> anyhow::Result<PromptResult> {
    print!("{}", "(press Enter to reveal) ".dimmed());
    io::stdout().flush()?;
    let line = read_line()?;
    if is_quit(&line) {
        return Ok(PromptResult::Quit);
    }

    println!("  {}", card.back.cyan());
    prompt_rating(None)
}

/// Type-an-answer flow: the judge grades, the learner confirms
fn prompt_with_judge(
    judge: &RemoteJudge,
    runtime: &tokio::runtime::Runtime,
    card: &Card,
) -> anyhow::Result<PromptResult> {
    print!("{}", "Your answer (empty to just reveal): ".dimmed());
    io::stdout().flush()?;
    let answer = read_line()?;
    if is_quit(&answer) {
        return Ok(PromptResult::Quit);
    }
    let answer = answer.trim();
    if answer.is_empty() {
        println!("  {}", card.back.cyan());
        return prompt_rating(None);
    }

    match runtime.block_on(judge.judge(&card.front, &card.back, answer)) {
        Ok(judgment) => {
            let verdict = if judgment.correct {
                "correct".green().bold()
            } else {
                "incorrect".red().bold()
            };
            println!("  {}: {}", "Expected".white().bold(), card.back.cyan());
            println!("  {} - {}", verdict, judgment.explanation);
            prompt_rating(Some(judgment.suggested_rating))
        }
        Err(e) => {
            // Degrade to manual rating; the review must not be lost
            tracing::warn!("judge unavailable: {e}");
            println!("  {} {}", "Judge unavailable:".yellow(), e);
            println!("  {}", card.back.cyan());
            prompt_rating(None)
        }
    }
}

/// Ask for a rating until one parses
fn prompt_rating(suggested: Option<Rating>) -> anyhow::Result<PromptResult> {
    loop {
        match suggested {
            Some(rating) => print!(
                "Rate [0-3, Enter={} ({}), q=quit]: ",
                rating.as_i64(),
                rating.as_str()
            ),
            None => print!("Rate [0-3, q=quit]: "),
        }
        io::stdout().flush()?;

        let line = read_line()?;
        if is_quit(&line) {
            return Ok(PromptResult::Quit);
        }
        if line.trim().is_empty()
            && let Some(rating) = suggested
        {
            return Ok(PromptResult::Rated(rating.as_i64()));
        }
        if let Some(rating) = parse_rating_input(&line) {
            return Ok(PromptResult::Rated(rating));
        }
        println!("{}", "Enter 0, 1, 2, 3 (or again/hard/good/easy).".yellow());
    }
}

fn read_line() -> anyhow::Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}

fn is_quit(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "q" | "quit" | "exit")
}

/// Parse a rating from a digit or a rating name
fn parse_rating_input(input: &str) -> Option<i64> {
    let trimmed = input.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return (0..=3).contains(&value).then_some(value);
    }
    Rating::parse_name(trimmed).map(|r| r.as_i64())
}

/// Human-readable "how long until" for a millisecond delta
fn format_relative(delta_ms: i64) -> String {
    if delta_ms < MS_PER_HOUR {
        format!("in {}m", (delta_ms / MS_PER_MINUTE).max(1))
    } else if delta_ms < MS_PER_DAY {
        format!("in {}h", delta_ms / MS_PER_HOUR)
    } else {
        format!("in {}d", delta_ms / MS_PER_DAY)
    }
}

// ============================================================================
// TESTS
// ============================================================================
