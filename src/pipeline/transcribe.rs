//! Vision transcription: rendered slide images → slide text.
//!
//! Slides are sent in batches of `vision_batch_size` images per request and
//! the model answers with a JSON object keyed by slide number. A batch whose
//! answer cannot be parsed keeps the embedded PDF text for its slides, as
//! does any slide the model leaves out. API failures are fatal, exactly as
//! for card generation.

use crate::config::GenerationConfig;
use crate::error::FlashcardError;
use crate::output::SlideRecord;
use crate::pipeline::llm::{complete_with_retry, ChatClient, ChatRequest, RetryPolicy};
use crate::pipeline::parse::parse_transcription;
use crate::progress::ProgressCallback;
use crate::prompts;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Token and timing totals for the vision stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionStats {
    pub batches: usize,
    /// Batches whose response could not be parsed.
    pub failed_batches: usize,
    pub transcribed_slides: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Replace slide text with vision transcriptions, batch by batch.
///
/// Images are released once their batch has been sent.
pub async fn transcribe_slides(
    slides: &mut [SlideRecord],
    client: &Arc<dyn ChatClient>,
    config: &GenerationConfig,
    progress: Option<&ProgressCallback>,
) -> Result<TranscriptionStats, FlashcardError> {
    let policy = RetryPolicy::from_config(config);
    let batch_size = config.vision_batch_size.max(1);
    let total_batches = slides.len().div_ceil(batch_size);
    let mut stats = TranscriptionStats::default();

    for (batch_index, batch) in slides.chunks_mut(batch_size).enumerate() {
        let images: Vec<_> = batch.iter_mut().filter_map(|s| s.image.take()).collect();
        if images.is_empty() {
            continue;
        }
        let first = batch[0].number();
        let last = batch[batch.len() - 1].number();
        let label = format!("Vision batch {}", batch_index + 1);

        info!(
            "{}/{}: transcribing slides {}-{}",
            label, total_batches, first, last
        );
        if let Some(cb) = progress {
            cb.on_vision_batch(first, last);
        }

        let request = ChatRequest::text(
            prompts::vision_transcription_prompt(first, last),
            config.vision_temperature,
            config.max_tokens,
        )
        .with_images(images);

        let done = complete_with_retry(client, &request, policy, &label)
            .await
            .map_err(|failure| failure.into_fatal(client.endpoint(), &label))?;

        stats.batches += 1;
        stats.input_tokens += done.response.prompt_tokens;
        stats.output_tokens += done.response.completion_tokens;
        stats.duration_ms += done.duration_ms;

        match parse_transcription(&done.response.content) {
            Ok(texts) => {
                stats.transcribed_slides += apply_transcription(batch, &texts);
            }
            Err(e) => {
                warn!("{}: {}; keeping embedded text for slides {}-{}", label, e, first, last);
                stats.failed_batches += 1;
                if let Some(cb) = progress {
                    cb.on_vision_batch_error(first, last, &e.to_string());
                }
            }
        }
    }

    debug!(
        "Vision stage: {} batches, {} slides transcribed",
        stats.batches, stats.transcribed_slides
    );
    Ok(stats)
}

/// Overwrite slide text with non-empty transcriptions; returns how many changed.
fn apply_transcription(
    batch: &mut [SlideRecord],
    texts: &std::collections::BTreeMap<usize, String>,
) -> usize {
    let mut applied = 0;
    for slide in batch.iter_mut() {
        match texts.get(&slide.number()) {
            Some(text) if !text.trim().is_empty() => {
                slide.text = text.trim().to_string();
                applied += 1;
            }
            _ => debug!("Slide {}: no transcription, keeping embedded text", slide.number()),
        }
    }
    applied
}
