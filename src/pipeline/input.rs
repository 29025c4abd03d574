//! Input resolution: validate the slide deck, the API key and the outline.
//!
//! Everything here runs before any network call, so an input problem never
//! costs an API request. The slide file is checked for the PDF magic bytes
//! (`%PDF`) so callers get a meaningful error rather than a pdfium failure.

use crate::error::FlashcardError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` exists, is readable, and starts with `%PDF`.
pub fn resolve_slides(path: impl AsRef<Path>) -> Result<PathBuf, FlashcardError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(FlashcardError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic != b"%PDF" => {
                    return Err(FlashcardError::NotAPdf { path, magic });
                }
                Ok(()) => {}
                Err(e) => {
                    return Err(FlashcardError::CorruptPdf {
                        path,
                        detail: format!("cannot read header: {e}"),
                    });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(FlashcardError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(FlashcardError::FileNotFound { path });
        }
    }

    debug!("Resolved slide deck: {}", path.display());
    Ok(path)
}

/// Resolve an API key given either literally or as a path to a key file.
///
/// When `value` names an existing file, the key is the file's first
/// non-empty line, trimmed. Otherwise `value` itself (trimmed) is the key.
pub fn resolve_api_key(value: &str) -> Result<String, FlashcardError> {
    let candidate = Path::new(value.trim());
    let key = if !value.trim().is_empty() && candidate.is_file() {
        let contents =
            std::fs::read_to_string(candidate).map_err(|source| FlashcardError::ApiKeyUnreadable {
                path: candidate.to_path_buf(),
                source,
            })?;
        debug!("Read API key from {}", candidate.display());
        first_non_empty_line(&contents).unwrap_or_default()
    } else {
        value.trim().to_string()
    };

    if key.is_empty() {
        return Err(FlashcardError::EmptyApiKey);
    }
    Ok(key)
}

/// Read the outline/focus file. A blank file yields `None`.
pub fn read_outline(path: impl AsRef<Path>) -> Result<Option<String>, FlashcardError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| FlashcardError::OutlineUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let text = text.trim();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text.to_string()))
    }
}

/// Default deck path: `flashcards.json` next to the slide deck.
pub fn default_output_path(slides: &Path) -> PathBuf {
    slides
        .parent()
        .map(|p| p.join("flashcards.json"))
        .unwrap_or_else(|| PathBuf::from("flashcards.json"))
}

fn first_non_empty_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
