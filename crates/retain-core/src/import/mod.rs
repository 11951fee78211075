//! Archive Import
//!
//! Format conversion for third-party flashcard archives:
//! - Delimited text (CSV or TSV): one `front,back` row per line
//! - JSON backups: an array of card objects, as produced by `retain export`
//!
//! Imports are best-effort per row: malformed rows are reported, not fatal,
//! and cards whose front already exists in the target deck are skipped so
//! re-importing an archive is safe.

use serde::{Deserialize, Serialize};

use crate::deck::NewCardInput;
use crate::storage::{Store, StoreError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Import error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// IO error reading the archive
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Archive is not valid JSON
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    /// Store rejected a write
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// TYPES
// ============================================================================

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Comma-separated front/back rows
    Csv,
    /// Tab-separated front/back rows
    Tsv,
    /// JSON array of card objects
    Json,
}

impl ArchiveFormat {
    /// Parse from a format name or file extension
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(ArchiveFormat::Csv),
            "tsv" | "txt" => Some(ArchiveFormat::Tsv),
            "json" => Some(ArchiveFormat::Json),
            _ => None,
        }
    }

    fn delimiter(self) -> char {
        match self {
            ArchiveFormat::Csv => ',',
            ArchiveFormat::Tsv => '\t',
            ArchiveFormat::Json => unreachable!("JSON archives are not row-delimited"),
        }
    }
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Cards created
    pub imported: usize,
    /// Rows skipped because the front already exists in the deck
    pub skipped: usize,
    /// Rows that could not be converted, with line number and reason
    pub row_errors: Vec<RowError>,
}

/// A single unconvertible row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    /// 1-based line (or array index) in the archive
    pub line: usize,
    /// Why the row was rejected
    pub reason: String,
}

/// One card entry in a JSON backup
///
/// Accepts the subset of `Card` fields that survive a transfer between
/// stores; scheduling state deliberately does not (imported cards start
/// fresh).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonCardEntry {
    front: String,
    back: String,
    #[serde(default)]
    tags: Vec<String>,
}

// ============================================================================
// PARSING
// ============================================================================

/// Convert archive text into card inputs plus per-row errors
pub fn parse_archive(content: &str, format: ArchiveFormat) -> Result<(Vec<NewCardInput>, Vec<RowError>), ImportError> {
    match format {
        ArchiveFormat::Json => parse_json_archive(content),
        ArchiveFormat::Csv | ArchiveFormat::Tsv => Ok(parse_rows(content, format.delimiter())),
    }
}

fn parse_json_archive(content: &str) -> Result<(Vec<NewCardInput>, Vec<RowError>), ImportError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(content)?;

    let mut inputs = Vec::new();
    let mut errors = Vec::new();
    for (index, value) in entries.into_iter().enumerate() {
        match serde_json::from_value::<JsonCardEntry>(value) {
            Ok(entry) if entry.front.trim().is_empty() => errors.push(RowError {
                line: index + 1,
                reason: "empty front".to_string(),
            }),
            Ok(entry) => inputs.push(NewCardInput {
                front: entry.front,
                back: entry.back,
                tags: entry.tags,
            }),
            Err(e) => errors.push(RowError {
                line: index + 1,
                reason: e.to_string(),
            }),
        }
    }
    Ok((inputs, errors))
}

fn parse_rows(content: &str, delimiter: char) -> (Vec<NewCardInput>, Vec<RowError>) {
    let mut inputs = Vec::new();
    let mut errors = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        match line.split_once(delimiter) {
            Some((front, back)) if !front.trim().is_empty() && !back.trim().is_empty() => {
                inputs.push(NewCardInput::new(front.trim(), back.trim()));
            }
            Some(_) => errors.push(RowError {
                line: index + 1,
                reason: "empty front or back".to_string(),
            }),
            None => errors.push(RowError {
                line: index + 1,
                reason: format!("missing '{delimiter}' delimiter"),
            }),
        }
    }

    (inputs, errors)
}

// ============================================================================
// IMPORT
// ============================================================================

/// Import an archive into a deck
///
/// Rows whose front already exists in the deck are counted as skipped;
/// everything else becomes a fresh card, due immediately.
pub fn import_archive(
    store: &Store,
    deck_name: &str,
    content: &str,
    format: ArchiveFormat,
) -> Result<ImportReport, ImportError> {
    let (inputs, row_errors) = parse_archive(content, format)?;

    let deck = store.get_or_create_deck(deck_name)?;

    // Known fronts, so re-importing the same archive is a no-op
    let mut existing: std::collections::HashSet<String> = std::collections::HashSet::new();
    let page_size = 500;
    let mut offset = 0;
    loop {
        let batch = store.list_cards(Some(&deck.id), page_size, offset)?;
        let batch_len = batch.len();
        existing.extend(batch.into_iter().map(|c| c.front));
        if batch_len < page_size as usize {
            break;
        }
        offset += page_size;
    }

    let mut report = ImportReport {
        row_errors,
        ..Default::default()
    };

    for input in inputs {
        if existing.contains(&input.front) {
            report.skipped += 1;
            continue;
        }
        existing.insert(input.front.clone());
        store.add_card(&deck.id, input)?;
        report.imported += 1;
    }

    tracing::info!(
        deck = deck_name,
        imported = report.imported,
        skipped = report.skipped,
        errors = report.row_errors.len(),
        "archive import finished"
    );

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(Some(dir.path().join("test.db"))).unwrap();
        (store, dir)
    }

    #[test]
    fn test_parse_tsv_rows() {
        let content = "bonjour\thello\n\n# a comment\nmerci\tthank you\n";
        let (inputs, errors) = parse_rows(content, '\t');

        assert_eq!(inputs.len(), 2);
        assert!(errors.is_empty());
        assert_eq!(inputs[0].front, "bonjour");
        assert_eq!(inputs[1].back, "thank you");
    }

    #[test]
    fn test_parse_reports_malformed_rows_with_line_numbers() {
        let content = "good,row\nno delimiter here\n,empty front\n";
        let (inputs, errors) = parse_rows(content, ',');

        assert_eq!(inputs.len(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line, 2);
        assert!(errors[0].reason.contains("delimiter"));
        assert_eq!(errors[1].line, 3);
    }

    #[test]
    fn test_parse_json_archive() {
        let content = r#"[
            {"front": "hola", "back": "hello", "tags": ["es"]},
            {"front": "", "back": "broken"},
            {"back": "missing front"}
        ]"#;
        let (inputs, errors) = parse_json_archive(content).unwrap();

        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].tags, vec!["es"]);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_import_skips_duplicates_on_reimport() {
        let (store, _dir) = test_store();
        let content = "uno,one\ndos,two\n";

        let first = import_archive(&store, "spanish", content, ArchiveFormat::Csv).unwrap();
        assert_eq!(first.imported, 2);
        assert_eq!(first.skipped, 0);

        let second = import_archive(&store, "spanish", content, ArchiveFormat::Csv).unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.skipped, 2);

        let deck = store.find_deck("spanish").unwrap().unwrap();
        assert_eq!(store.list_cards(Some(&deck.id), 10, 0).unwrap().len(), 2);
    }

    #[test]
    fn test_imported_cards_start_fresh_and_due() {
        let (store, _dir) = test_store();
        import_archive(&store, "deck", "q,a\n", ArchiveFormat::Csv).unwrap();

        let deck = store.find_deck("deck").unwrap().unwrap();
        let card = store.list_cards(Some(&deck.id), 1, 0).unwrap().remove(0);
        assert_eq!(card.state.reps, 0);
        assert_eq!(card.state.ivl_days, 0);
        assert!(card.is_due(card.state.due_ts));
    }

    #[test]
    fn test_invalid_json_is_a_hard_error() {
        let result = parse_archive("not json", ArchiveFormat::Json);
        assert!(matches!(result, Err(ImportError::Json(_))));
    }

    #[test]
    fn test_format_parse_name() {
        assert_eq!(ArchiveFormat::parse_name("CSV"), Some(ArchiveFormat::Csv));
        assert_eq!(ArchiveFormat::parse_name("txt"), Some(ArchiveFormat::Tsv));
        assert_eq!(ArchiveFormat::parse_name("json"), Some(ArchiveFormat::Json));
        assert_eq!(ArchiveFormat::parse_name("apkg"), None);
    }
}
