//! Artifact writing: deck JSON, slides JSON and the HTML study app.
//!
//! Each file is written to a temp file in its target directory and then
//! renamed over the destination, so a reader never sees a half-written
//! file and a crash leaves the previous version intact. All three payloads
//! are serialised before the first file is touched.

use crate::error::FlashcardError;
use crate::output::{ArtifactPaths, FlashcardRecord, GenerationOutput, SlideRecord};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Study app template; the deck replaces [`DATA_PLACEHOLDER`].
pub const STUDY_TEMPLATE: &str = include_str!("../../assets/study.html");

/// Marker inside [`STUDY_TEMPLATE`] where the deck JSON is injected.
pub const DATA_PLACEHOLDER: &str = "__FLASHCARD_DATA_PLACEHOLDER__";

/// Companion paths for a deck at `deck_path`: `<stem>_slides.json` and
/// `<stem>.html` in the same directory.
///
/// Fails with `InvalidConfig` when a companion would land on the deck
/// itself (e.g. `--output cards.html`).
pub fn artifact_paths(deck_path: &Path, write_html: bool) -> Result<ArtifactPaths, FlashcardError> {
    let dir = deck_path.parent().unwrap_or_else(|| Path::new(""));
    let stem = deck_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "flashcards".to_string());

    let paths = ArtifactPaths {
        deck: deck_path.to_path_buf(),
        slides: dir.join(format!("{stem}_slides.json")),
        html: write_html.then(|| dir.join(format!("{stem}.html"))),
    };

    // `<stem>_slides.json` can never equal the deck's own file name.
    if paths.html.as_deref() == Some(deck_path) {
        return Err(FlashcardError::InvalidConfig(format!(
            "Output path {} would be overwritten by the study page; choose a .json deck path",
            deck_path.display()
        )));
    }
    Ok(paths)
}

/// Write `contents` to `path` atomically (temp file + rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), FlashcardError> {
    let fail = |source: std::io::Error| FlashcardError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(fail)?;
    tmp.write_all(contents).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;

    debug!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

/// Pretty-printed deck JSON, newline-terminated.
pub fn deck_json(deck: &[FlashcardRecord]) -> Result<String, FlashcardError> {
    let mut json = serde_json::to_string_pretty(deck)
        .map_err(|e| FlashcardError::Internal(format!("deck serialisation failed: {e}")))?;
    json.push('\n');
    Ok(json)
}

fn slides_json(slides: &[SlideRecord]) -> Result<String, FlashcardError> {
    let mut json = serde_json::to_string_pretty(slides)
        .map_err(|e| FlashcardError::Internal(format!("slides serialisation failed: {e}")))?;
    json.push('\n');
    Ok(json)
}

/// Make JSON safe to place inside a `<script>` element.
///
/// `<`, `>` and `&` become `\u003c`, `\u003e`, `\u0026` so the text can never
/// close the element or open a comment; U+2028/U+2029 are escaped because
/// older JavaScript engines treat them as line terminators inside strings.
/// The result is still valid JSON that parses to the same value.
pub fn escape_json_for_script(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}

/// The study app with `deck` embedded.
pub fn render_study_page(deck: &[FlashcardRecord]) -> Result<String, FlashcardError> {
    let json = serde_json::to_string(deck)
        .map_err(|e| FlashcardError::Internal(format!("deck serialisation failed: {e}")))?;
    Ok(STUDY_TEMPLATE.replacen(DATA_PLACEHOLDER, &escape_json_for_script(&json), 1))
}

/// Write every artifact of a finished run.
pub fn write_artifacts(
    output: &GenerationOutput,
    deck_path: &Path,
    write_html: bool,
) -> Result<ArtifactPaths, FlashcardError> {
    let paths = artifact_paths(deck_path, write_html)?;

    let slides = slides_json(&output.slides)?;
    let deck = deck_json(&output.deck)?;
    let html = match &paths.html {
        Some(_) => Some(render_study_page(&output.deck)?),
        None => None,
    };

    write_atomic(&paths.slides, slides.as_bytes())?;
    if let (Some(path), Some(page)) = (&paths.html, &html) {
        write_atomic(path, page.as_bytes())?;
    }
    write_atomic(&paths.deck, deck.as_bytes())?;

    info!(
        "Wrote {} cards to {}",
        output.deck.len(),
        paths.deck.display()
    );
    Ok(paths)
}
