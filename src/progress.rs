//! Progress-callback trait for per-chunk generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through extraction, vision transcription and
//! card generation.
//!
//! # Example
//!
//! ```rust
//! use slidecards::{GenerationConfig, GenerationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CardCounter {
//!     cards: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CardCounter {
//!     fn on_chunk_complete(&self, chunk: usize, total: usize, cards: usize) {
//!         self.cards.fetch_add(cards, Ordering::SeqCst);
//!         eprintln!("chunk {chunk}/{total}: {cards} cards");
//!     }
//! }
//!
//! let config = GenerationConfig::builder()
//!     .progress_callback(Arc::new(CardCounter { cards: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each stage.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` chunk
/// events may fire from several tasks at once. All methods default to no-ops.
/// Chunk numbers are 1-indexed.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once the slides have been extracted.
    fn on_slides_extracted(&self, total_slides: usize) {
        let _ = total_slides;
    }

    /// Called when a vision batch is sent (slide numbers are 1-indexed, inclusive).
    fn on_vision_batch(&self, first_slide: usize, last_slide: usize) {
        let _ = (first_slide, last_slide);
    }

    /// Called when a vision batch reply could not be parsed and its slides
    /// fall back to their embedded text.
    fn on_vision_batch_error(&self, first_slide: usize, last_slide: usize, error: &str) {
        let _ = (first_slide, last_slide, error);
    }

    /// Called once before the first chunk request.
    fn on_generation_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called just before a chunk request is sent.
    fn on_chunk_start(&self, chunk: usize, total_chunks: usize) {
        let _ = (chunk, total_chunks);
    }

    /// Called when a chunk produced cards (possibly zero valid ones).
    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, cards: usize) {
        let _ = (chunk, total_chunks, cards);
    }

    /// Called when a chunk's response could not be parsed.
    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &str) {
        let _ = (chunk, total_chunks, error);
    }

    /// Called once after all chunks have been attempted.
    fn on_generation_complete(&self, total_chunks: usize, total_cards: usize) {
        let _ = (total_chunks, total_cards);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
