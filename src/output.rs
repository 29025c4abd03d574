//! Data produced and consumed by the generation pipeline.

use crate::error::ChunkError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// One page of the source slide deck.
///
/// `index` is 0-based and follows document page order; user-facing text
/// ("Slide 32") uses [`SlideRecord::number`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideRecord {
    pub index: usize,
    pub text: String,
    /// Rendered page image. Only populated in vision mode and never
    /// written to the slides JSON.
    #[serde(skip)]
    pub image: Option<SlideImage>,
}

impl SlideRecord {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            image: None,
        }
    }

    /// 1-indexed slide number as printed on the slide deck.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A base64-encoded page image ready for a multimodal request body.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideImage {
    pub data: String,
    pub mime_type: String,
}

impl SlideImage {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// `data:` URL accepted by OpenAI-compatible `image_url` content parts.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A single flashcard. This is the only unit exchanged with the study app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlashcardRecord {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub topic: String,
}

impl FlashcardRecord {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            topic: topic.into(),
        }
    }
}

/// Outcome of one chunk request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    /// 0-based chunk position; merge order.
    pub chunk_index: usize,
    /// 1-indexed first slide number covered by the chunk.
    pub first_slide: usize,
    /// 1-indexed last slide number covered by the chunk.
    pub last_slide: usize,
    pub cards: Vec<FlashcardRecord>,
    /// Records the model returned that failed validation.
    pub dropped_records: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<ChunkError>,
}

/// Aggregate statistics for a generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    pub total_slides: usize,
    pub empty_slides: usize,
    /// Vision transcription requests sent (0 in text-only mode).
    pub vision_batches: usize,
    /// Vision batches whose reply could not be parsed; those slides kept
    /// their embedded text.
    pub failed_vision_batches: usize,
    pub transcribed_slides: usize,
    pub total_chunks: usize,
    pub failed_chunks: usize,
    pub total_cards: usize,
    pub dropped_records: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// Everything a successful run produced, before it is written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub deck: Vec<FlashcardRecord>,
    pub slides: Vec<SlideRecord>,
    pub chunks: Vec<ChunkResult>,
    pub stats: GenerationStats,
}

impl GenerationOutput {
    /// Cards per topic, most common first.
    pub fn topic_summary(&self) -> Vec<TopicCount> {
        topic_summary(&self.deck)
    }
}

/// Where the artifact writer put each file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub deck: PathBuf,
    pub slides: PathBuf,
    pub html: Option<PathBuf>,
}

/// Number of cards sharing a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

/// Count cards per topic, sorted by count descending then topic name.
///
/// Cards with an empty topic are grouped under `"Unknown"`.
pub fn topic_summary(deck: &[FlashcardRecord]) -> Vec<TopicCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for card in deck {
        let topic = card.topic.trim();
        let key = if topic.is_empty() { "Unknown" } else { topic };
        *counts.entry(key).or_default() += 1;
    }

    let mut summary: Vec<TopicCount> = counts
        .into_iter()
        .map(|(topic, count)| TopicCount {
            topic: topic.to_string(),
            count,
        })
        .collect();
    summary.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
    summary
}
