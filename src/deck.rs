//! Reading and writing deck files.
//!
//! A deck on disk is a JSON array of `{question, answer, topic}` objects.
//! [`read_deck`] is strict and is what the generator's own output must
//! satisfy. [`import_deck`] follows the study app's import rules: a file
//! that is not a JSON array is rejected outright, while individual elements
//! that fail validation are dropped and counted.

use crate::error::FlashcardError;
use crate::output::FlashcardRecord;
use crate::pipeline::parse::validate_records;
use crate::pipeline::write::{deck_json, write_atomic};
use serde_json::Value;
use std::path::Path;

/// Result of a lenient import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub cards: Vec<FlashcardRecord>,
    pub dropped: usize,
}

/// Write `deck` to `path` atomically as pretty-printed JSON.
pub fn write_deck(path: impl AsRef<Path>, deck: &[FlashcardRecord]) -> Result<(), FlashcardError> {
    write_atomic(path.as_ref(), deck_json(deck)?.as_bytes())
}

/// Read a deck, failing on any element that does not match the schema.
pub fn read_deck(path: impl AsRef<Path>) -> Result<Vec<FlashcardRecord>, FlashcardError> {
    let path = path.as_ref();
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|e| FlashcardError::DeckUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Import a deck file, dropping elements without a usable question/answer.
pub fn import_deck(path: impl AsRef<Path>) -> Result<ImportReport, FlashcardError> {
    let path = path.as_ref();
    let text = read_text(path)?;
    import_deck_str(&text).map_err(|detail| FlashcardError::DeckUnreadable {
        path: path.to_path_buf(),
        detail,
    })
}

/// [`import_deck`] over in-memory JSON. `Err` carries the rejection reason.
pub fn import_deck_str(text: &str) -> Result<ImportReport, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    let items = match value {
        Value::Array(items) => items,
        _ => return Err("expected a JSON array of flashcards".to_string()),
    };
    let parsed = validate_records(&items, "Import");
    Ok(ImportReport {
        cards: parsed.cards,
        dropped: parsed.dropped,
    })
}

fn read_text(path: &Path) -> Result<String, FlashcardError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FlashcardError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => FlashcardError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => FlashcardError::DeckUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })
}
