//! # slidecards
//!
//! Turn lecture slide PDFs into exam flashcards with a hosted language model,
//! and study them in a self-contained HTML page.
//!
//! ## Why this crate?
//!
//! Revising from slides means re-reading hundreds of pages of bullet points.
//! This crate extracts each slide (embedded text, or a vision model's reading
//! of the rendered page), asks a chat model for question/answer cards chunk
//! by chunk, and writes a JSON deck plus a study page that works straight
//! from the filesystem. An optional outline narrows the cards to what the
//! exam actually covers.
//!
//! ## Pipeline Overview
//!
//! ```text
//! slides.pdf (+ outline.txt)
//!  │
//!  ├─ 1. Input       validate PDF magic, resolve API key, read outline
//!  ├─ 2. Extract     per-page text, rendered PNGs in vision mode (spawn_blocking)
//!  ├─ 3. Transcribe  vision mode: image batches → slide text
//!  ├─ 4. Chunk       slide-aligned prompts with the outline in every chunk
//!  ├─ 5. LLM         chat completions with retry/backoff, chunk order kept
//!  ├─ 6. Parse       fence stripping, JSON array location, record validation
//!  └─ 7. Write       flashcards.json, *_slides.json, *.html (atomic)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slidecards::{generate_to_files, ExtractionMode, GenerationConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GenerationConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .mode(ExtractionMode::TextOnly)
//!         .build()?;
//!     let (output, paths) = generate_to_files(
//!         "lecture.pdf",
//!         Some(Path::new("exam_topics.txt")),
//!         None,
//!         &config,
//!     )
//!     .await?;
//!     println!("{} cards → {}", output.deck.len(), paths.deck.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `generate_flashcards` and `study-server` binaries |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! slidecards = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod deck;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionMode, GenerationConfig, GenerationConfigBuilder};
pub use deck::{import_deck, read_deck, write_deck, ImportReport};
pub use error::{ChunkError, FlashcardError};
pub use generate::{generate, generate_from_slides, generate_sync, generate_to_files};
pub use output::{
    topic_summary, ArtifactPaths, ChunkResult, FlashcardRecord, GenerationOutput,
    GenerationStats, SlideImage, SlideRecord, TopicCount,
};
pub use pipeline::llm::{ChatClient, ChatRequest, ChatResponse, LlmCallError, ProviderClient};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
