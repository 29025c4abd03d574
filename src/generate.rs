//! Generation entry points: slide deck in, flashcard deck out.
//!
//! The run is linear: resolve inputs, extract slides, transcribe them (vision
//! mode), build chunk prompts, send each chunk, parse, merge in chunk order.
//! Nothing touches the output directory until every chunk has been
//! attempted and the merged deck holds at least one card.

use crate::config::{ExtractionMode, GenerationConfig};
use crate::error::{ChunkError, FlashcardError};
use crate::output::{ArtifactPaths, ChunkResult, GenerationOutput, GenerationStats, SlideRecord};
use crate::pipeline::chunk::{self, PromptChunk};
use crate::pipeline::llm::{self, ChatClient, ChatRequest, RetryPolicy};
use crate::pipeline::{extract, input, parse, transcribe, write};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Generate a flashcard deck from a PDF slide deck.
///
/// `outline_path`, when given, names a text file whose contents steer the
/// model towards the listed topics and slides.
///
/// # Errors
/// Returns `Err(FlashcardError)` for fatal errors only:
/// - slide file missing, unreadable, not a PDF, or without pages
/// - outline or API key unusable
/// - authentication failure, or transient API failures outlasting retries
/// - every chunk unparseable, or no valid card at all
///
/// Chunks that fail to parse while others succeed are reported in
/// [`GenerationOutput::chunks`] and counted in the stats.
pub async fn generate(
    slides_path: impl AsRef<Path>,
    outline_path: Option<&Path>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, FlashcardError> {
    let total_start = Instant::now();

    // ── Step 1: Resolve inputs ───────────────────────────────────────────
    let pdf_path = input::resolve_slides(slides_path)?;
    let outline = match outline_path {
        Some(p) => input::read_outline(p)?,
        None => None,
    };
    let client = llm::resolve_client(config)?;
    info!("Generating flashcards from {}", pdf_path.display());

    // ── Step 2: Extract slides ───────────────────────────────────────────
    let extract_start = Instant::now();
    let slides = extract::extract_slides(&pdf_path, config).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} slides in {}ms",
        slides.len(),
        extract_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_slides_extracted(slides.len());
    }

    // ── Steps 3-4: Transcribe, then chunks → cards ───────────────────────
    let mut output = run_from_slides(&client, slides, outline.as_deref(), config).await?;
    output.stats.extract_duration_ms = extract_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Generate cards from slides that were already extracted.
///
/// Skips PDF handling. In vision mode, slides that carry an image are
/// transcribed first; in text-only mode images are ignored.
pub async fn generate_from_slides(
    slides: Vec<SlideRecord>,
    outline: Option<&str>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, FlashcardError> {
    let total_start = Instant::now();
    let client = llm::resolve_client(config)?;
    let mut output = run_from_slides(&client, slides, outline, config).await?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Generate a deck and write the deck, slides JSON and study app.
///
/// `output_path` defaults to `flashcards.json` next to the slide deck.
/// Files are only written once generation has succeeded.
pub async fn generate_to_files(
    slides_path: impl AsRef<Path>,
    outline_path: Option<&Path>,
    output_path: Option<&Path>,
    config: &GenerationConfig,
) -> Result<(GenerationOutput, ArtifactPaths), FlashcardError> {
    let slides_path = slides_path.as_ref();
    let deck_path = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input::default_output_path(slides_path));
    // Reject colliding output paths before spending any API calls.
    write::artifact_paths(&deck_path, config.write_html)?;

    let output = generate(slides_path, outline_path, config).await?;
    let paths = write::write_artifacts(&output, &deck_path, config.write_html)?;
    Ok((output, paths))
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    slides_path: impl AsRef<Path>,
    outline_path: Option<&Path>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, FlashcardError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FlashcardError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(slides_path, outline_path, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Vision transcription (when enabled), then chunk generation, with the
/// vision totals folded into the run stats.
async fn run_from_slides(
    client: &Arc<dyn ChatClient>,
    mut slides: Vec<SlideRecord>,
    outline: Option<&str>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, FlashcardError> {
    let mut vision = transcribe::TranscriptionStats::default();
    if config.mode == ExtractionMode::Vision {
        vision = transcribe::transcribe_slides(
            &mut slides,
            client,
            config,
            config.progress_callback.as_ref(),
        )
        .await?;
        if vision.failed_batches > 0 {
            warn!(
                "{}/{} vision batches could not be parsed; their slides use embedded text",
                vision.failed_batches, vision.batches
            );
        }
    }

    let mut output = run_chunks(client, slides, outline, config).await?;

    let stats = &mut output.stats;
    stats.vision_batches = vision.batches;
    stats.failed_vision_batches = vision.failed_batches;
    stats.transcribed_slides = vision.transcribed_slides;
    stats.llm_duration_ms += vision.duration_ms;
    stats.total_input_tokens += vision.input_tokens as u64;
    stats.total_output_tokens += vision.output_tokens as u64;
    Ok(output)
}

/// Chunk, send, parse and merge. Shared by both entry points.
async fn run_chunks(
    client: &Arc<dyn ChatClient>,
    mut slides: Vec<SlideRecord>,
    outline: Option<&str>,
    config: &GenerationConfig,
) -> Result<GenerationOutput, FlashcardError> {
    for slide in &mut slides {
        slide.image = None;
    }

    let chunks = chunk::build_chunks(&slides, outline, config);
    let total_chunks = chunks.len();
    info!(
        "Sending {} chunks (concurrency {})",
        total_chunks, config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_start(total_chunks);
    }

    let llm_start = Instant::now();
    let results: Vec<ChunkResult> = stream::iter(
        chunks
            .iter()
            .map(|c| process_chunk(client, c, total_chunks, config)),
    )
    .buffered(config.concurrency.max(1))
    .try_collect()
    .await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let failed_chunks = results.iter().filter(|r| r.error.is_some()).count();
    if total_chunks > 0 && failed_chunks == total_chunks {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(FlashcardError::AllChunksFailed {
            total: total_chunks,
            first_error,
        });
    }

    let deck: Vec<_> = results.iter().flat_map(|r| r.cards.iter().cloned()).collect();
    let dropped_records: usize = results.iter().map(|r| r.dropped_records).sum();
    if deck.is_empty() {
        return Err(FlashcardError::NoFlashcards {
            dropped: dropped_records,
        });
    }

    let stats = GenerationStats {
        total_slides: slides.len(),
        empty_slides: slides.iter().filter(|s| s.is_empty()).count(),
        vision_batches: 0,
        failed_vision_batches: 0,
        transcribed_slides: 0,
        total_chunks,
        failed_chunks,
        total_cards: deck.len(),
        dropped_records,
        total_input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
        total_output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
        total_duration_ms: 0,
        extract_duration_ms: 0,
        llm_duration_ms,
    };

    info!(
        "Generation complete: {} cards from {}/{} chunks ({} records dropped)",
        stats.total_cards,
        total_chunks - failed_chunks,
        total_chunks,
        dropped_records
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_complete(total_chunks, deck.len());
    }

    Ok(GenerationOutput {
        deck,
        slides,
        chunks: results,
        stats,
    })
}

/// Send one chunk and parse its cards.
///
/// An API failure is fatal for the run; an unparseable response is not.
async fn process_chunk(
    client: &Arc<dyn ChatClient>,
    chunk: &PromptChunk,
    total_chunks: usize,
    config: &GenerationConfig,
) -> Result<ChunkResult, FlashcardError> {
    let chunk_num = chunk.index + 1;
    let label = format!("Chunk {}", chunk_num);
    if let Some(ref cb) = config.progress_callback {
        cb.on_chunk_start(chunk_num, total_chunks);
    }
    debug!(
        "{}/{}: slides {}-{}",
        label, total_chunks, chunk.first_slide, chunk.last_slide
    );

    let request = ChatRequest::text(chunk.prompt.as_str(), config.temperature, config.max_tokens);
    let done = match llm::complete_with_retry(client, &request, RetryPolicy::from_config(config), &label)
        .await
    {
        Ok(done) => done,
        Err(failure) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_chunk_error(chunk_num, total_chunks, &failure.error.to_string());
            }
            return Err(failure.into_fatal(client.endpoint(), &label));
        }
    };

    let mut result = ChunkResult {
        chunk_index: chunk.index,
        first_slide: chunk.first_slide,
        last_slide: chunk.last_slide,
        cards: Vec::new(),
        dropped_records: 0,
        input_tokens: done.response.prompt_tokens,
        output_tokens: done.response.completion_tokens,
        duration_ms: done.duration_ms,
        retries: done.retries,
        error: None,
    };

    match parse::parse_flashcards(&done.response.content, &label) {
        Ok(parsed) => {
            result.cards = parsed.cards;
            result.dropped_records = parsed.dropped;
            if let Some(ref cb) = config.progress_callback {
                cb.on_chunk_complete(chunk_num, total_chunks, result.cards.len());
            }
        }
        Err(e) => {
            let error = ChunkError::Parse {
                chunk: chunk_num,
                first_slide: chunk.first_slide,
                last_slide: chunk.last_slide,
                detail: e.to_string(),
            };
            warn!("{}", error);
            if let Some(ref cb) = config.progress_callback {
                cb.on_chunk_error(chunk_num, total_chunks, &error.to_string());
            }
            result.error = Some(error);
        }
    }

    Ok(result)
}
