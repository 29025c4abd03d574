//! Error types for the slidecards library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FlashcardError`] — **Fatal**: the run cannot produce a deck at all
//!   (bad slide file, unreadable key, authentication failure, every chunk
//!   unparseable). Returned as `Err(FlashcardError)` from the top-level
//!   `generate*` functions. Nothing is written to disk when one is returned.
//!
//! * [`ChunkError`] — **Non-fatal**: one chunk's model output could not be
//!   turned into cards, but the other chunks are fine. Stored inside
//!   [`crate::output::ChunkResult`] so callers can report partial success.
//!
//! Dropped flashcard records are not errors at all; they are counted in
//! [`crate::output::GenerationStats::dropped_records`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the slidecards library.
#[derive(Debug, Error)]
pub enum FlashcardError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Slide file was not found at the given path.
    #[error("Slide file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF is encrypted; slide decks are expected to open without a password.
    #[error("PDF '{path}' is encrypted and cannot be opened without a password.")]
    PasswordRequired { path: PathBuf },

    /// The document has no pages, so there is nothing to study.
    #[error("No slide content extracted from '{path}'")]
    NoSlideContent { path: PathBuf },

    /// The outline/focus file was given but could not be read.
    #[error("Failed to read outline file '{path}': {source}")]
    OutlineUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The API key argument named a file that could not be read.
    #[error("Failed to read API key file '{path}': {source}")]
    ApiKeyUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The API key resolved to an empty string.
    #[error("API key is empty.\nPass the key itself or a path to a file containing it.")]
    EmptyApiKey,

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The provider rejected the API key (401/403). Not retried.
    #[error("Authentication error from '{endpoint}': {detail}")]
    Auth { endpoint: String, detail: String },

    /// The provider returned a non-retryable error (bad request, unknown model).
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// Rate limiting, timeouts or 5xx responses persisted through every retry.
    #[error("{what} failed after {retries} retries: {detail}")]
    TransientExhausted {
        what: String,
        retries: u32,
        detail: String,
    },

    /// Every chunk's response failed to parse; the deck would be empty.
    #[error("All {total} chunks failed to produce flashcards.\nFirst error: {first_error}")]
    AllChunksFailed { total: usize, first_error: String },

    /// Chunks parsed, but every record failed validation.
    #[error("No valid flashcards were produced ({dropped} records dropped)")]
    NoFlashcards { dropped: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write one of the output artifacts.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A deck file could not be read back.
    #[error("Failed to read deck '{path}': {detail}")]
    DeckUnreadable { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single chunk.
///
/// Stored in [`crate::output::ChunkResult::error`]. The run continues unless
/// every chunk fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// The model's response held no parseable JSON array.
    #[error("Chunk {chunk} (slides {first_slide}-{last_slide}): unparseable response: {detail}")]
    Parse {
        chunk: usize,
        first_slide: usize,
        last_slide: usize,
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_display() {
        let e = FlashcardError::Auth {
            endpoint: "https://api.openai.com/v1".into(),
            detail: "Incorrect API key provided".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("api.openai.com"), "got: {msg}");
        assert!(msg.contains("Incorrect API key"), "got: {msg}");
    }

    #[test]
    fn transient_exhausted_display() {
        let e = FlashcardError::TransientExhausted {
            what: "Chunk 2".into(),
            retries: 3,
            detail: "HTTP 429".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Chunk 2"));
        assert!(msg.contains("3 retries"));
    }

    #[test]
    fn all_chunks_failed_display() {
        let e = FlashcardError::AllChunksFailed {
            total: 4,
            first_error: "no JSON array".into(),
        };
        assert!(e.to_string().contains("All 4 chunks"));
    }

    #[test]
    fn chunk_parse_error_display() {
        let e = ChunkError::Parse {
            chunk: 1,
            first_slide: 1,
            last_slide: 20,
            detail: "expected value".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("slides 1-20"), "got: {msg}");
    }

    #[test]
    fn not_a_pdf_shows_magic() {
        let e = FlashcardError::NotAPdf {
            path: PathBuf::from("notes.txt"),
            magic: *b"Hell",
        };
        assert!(e.to_string().contains("notes.txt"));
    }
}
