//! Response parsing: turn raw model output into validated flashcards.
//!
//! Models are asked for a bare JSON array, but in practice they sometimes
//! wrap it in a ```` ```json ```` fence, prepend a sentence of prose, or
//! return an object like `{"flashcards": [...]}`. The parser tolerates all
//! three and then validates every element on its own:
//!
//! 1. Strip an outer Markdown code fence
//! 2. Strict parse of the whole text (array, or object wrapping one)
//! 3. Otherwise, the first balanced `[...]` that parses as a JSON array
//!
//! A response with no locatable array is a [`ParseFailure`]. A malformed
//! element is never a failure; it is dropped and counted.

use crate::output::FlashcardRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Keys under which a wrapping object may hold the card array.
const WRAPPER_KEYS: [&str; 2] = ["flashcards", "cards"];

/// Cards recovered from one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCards {
    pub cards: Vec<FlashcardRecord>,
    /// Elements that failed validation.
    pub dropped: usize,
}

/// The response held nothing that could be read as the expected JSON shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error("response is empty")]
    Empty,

    #[error("no JSON array found in response: {preview}")]
    NoArray { preview: String },

    #[error("no JSON object found in response: {preview}")]
    NoObject { preview: String },
}

// ── Fence stripping ──────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("valid fence regex")
});

/// Remove one outer ```` ``` ```` fence, with or without a language tag.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

// ── Balanced-bracket location ────────────────────────────────────────────

/// Every balanced `open ... close` substring, in order of its opening bracket.
///
/// One left-to-right pass with a stack of open positions. Quotes only start
/// a string inside a bracket: brackets within JSON string literals
/// (including escaped quotes) are ignored, and a stray quote in surrounding
/// prose cannot swallow the array after it. An opening bracket that never
/// closes yields nothing but does not hide balanced pairs after it.
fn balanced_candidates(text: &str, open: u8, close: u8) -> Vec<&str> {
    let mut stack: Vec<usize> = Vec::new();
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !stack.is_empty() => in_string = true,
            _ if b == open => stack.push(i),
            _ if b == close => {
                if let Some(start) = stack.pop() {
                    pairs.push((start, i));
                }
            }
            _ => {}
        }
    }

    pairs.sort_unstable_by_key(|&(start, _)| start);
    pairs.into_iter().map(|(s, e)| &text[s..=e]).collect()
}

/// The first balanced `[...]` substring of `text`, string- and escape-aware.
pub fn find_json_array(text: &str) -> Option<&str> {
    balanced_candidates(text, b'[', b']').into_iter().next()
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > LIMIT {
        format!("{}…", flat.chars().take(LIMIT).collect::<String>())
    } else {
        flat
    }
}

// ── Flashcards ───────────────────────────────────────────────────────────

/// Locate the card array in a model response.
fn locate_card_array(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => return Some(items),
        Ok(Value::Object(mut obj)) => {
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(items)) = obj.remove(key) {
                    return Some(items);
                }
            }
        }
        _ => {}
    }

    balanced_candidates(text, b'[', b']').into_iter().find_map(|candidate| {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        }
    })
}

/// Validate one array element.
///
/// `question` and `answer` must be strings that are non-empty once trimmed.
/// A missing or non-string `topic` becomes `""`.
pub fn validate_record(value: &Value) -> Result<FlashcardRecord, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected an object, got {}", json_kind(value)))?;

    let question = required_text(obj, "question")?;
    let answer = required_text(obj, "answer")?;
    let topic = obj
        .get("topic")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    Ok(FlashcardRecord::new(question, answer, topic))
}

fn required_text<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, String> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(Value::String(_)) => Err(format!("`{field}` is empty")),
        Some(other) => Err(format!("`{field}` is {}, not a string", json_kind(other))),
        None => Err(format!("missing `{field}`")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validate a list of candidate records, keeping order and counting drops.
pub fn validate_records(items: &[Value], context: &str) -> ParsedCards {
    let mut parsed = ParsedCards::default();
    for (i, item) in items.iter().enumerate() {
        match validate_record(item) {
            Ok(card) => parsed.cards.push(card),
            Err(reason) => {
                warn!("{}: dropping record {}: {}", context, i + 1, reason);
                parsed.dropped += 1;
            }
        }
    }
    parsed
}

/// Parse a card-generation response.
///
/// `context` labels warnings for dropped records (e.g. `"Chunk 3"`).
pub fn parse_flashcards(raw: &str, context: &str) -> Result<ParsedCards, ParseFailure> {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return Err(ParseFailure::Empty);
    }
    let items = locate_card_array(text).ok_or_else(|| ParseFailure::NoArray {
        preview: preview(text),
    })?;
    Ok(validate_records(&items, context))
}

// ── Vision transcription ─────────────────────────────────────────────────

static RE_SLIDE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*$").expect("valid slide key regex"));

/// Parse a vision transcription response into slide number → text.
///
/// Keys are slide numbers (`"16"`, also `"Slide 16"`); values must be
/// strings. Entries with unusable keys or values are skipped.
pub fn parse_transcription(raw: &str) -> Result<BTreeMap<usize, String>, ParseFailure> {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let object = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => balanced_candidates(text, b'{', b'}').into_iter().find_map(|candidate| {
            match serde_json::from_str::<Value>(candidate) {
                Ok(Value::Object(obj)) => Some(obj),
                _ => None,
            }
        }),
    }
    .ok_or_else(|| ParseFailure::NoObject {
        preview: preview(text),
    })?;

    let mut slides = BTreeMap::new();
    for (key, value) in object {
        let number = RE_SLIDE_KEY
            .captures(key.trim())
            .and_then(|c| c[1].parse::<usize>().ok());
        match (number, value) {
            (Some(n), Value::String(s)) if n > 0 => {
                slides.insert(n, s.trim().to_string());
            }
            (_, _) => warn!("Ignoring transcription entry with key {:?}", key),
        }
    }
    Ok(slides)
}
