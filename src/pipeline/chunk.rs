//! Prompt building: split slides into request-sized chunks.
//!
//! Chunk boundaries always fall between slides. A chunk closes when it holds
//! `slides_per_chunk` slides or when the next slide would push its text past
//! `max_chunk_chars`; an oversized single slide becomes a chunk of its own.
//! Slide order is preserved inside and across chunks.

use crate::config::GenerationConfig;
use crate::output::SlideRecord;
use crate::prompts::{self, EMPTY_SLIDE_MARKER};
use std::ops::Range;
use tracing::debug;

/// One independent generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptChunk {
    /// 0-based chunk position; merge order.
    pub index: usize,
    /// 1-indexed number of the first slide in the chunk.
    pub first_slide: usize,
    /// 1-indexed number of the last slide in the chunk.
    pub last_slide: usize,
    pub slide_count: usize,
    pub prompt: String,
}

/// Render one slide as it appears in a prompt.
pub fn format_slide(slide: &SlideRecord) -> String {
    let body = if slide.is_empty() {
        EMPTY_SLIDE_MARKER
    } else {
        slide.text.trim()
    };
    format!("--- Slide {} ---\n{}", slide.number(), body)
}

/// Plan chunk ranges over `sizes`, the formatted length of each slide.
pub fn plan_chunks(sizes: &[usize], slides_per_chunk: usize, max_chars: usize) -> Vec<Range<usize>> {
    let slides_per_chunk = slides_per_chunk.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = 0;

    for (i, &size) in sizes.iter().enumerate() {
        let count = i - start;
        let over_count = count >= slides_per_chunk;
        let over_chars = count > 0 && chars + size > max_chars;
        if over_count || over_chars {
            ranges.push(start..i);
            start = i;
            chars = 0;
        }
        chars += size;
    }
    if start < sizes.len() {
        ranges.push(start..sizes.len());
    }
    ranges
}

/// Build every chunk's prompt from the extracted slides.
pub fn build_chunks(
    slides: &[SlideRecord],
    outline: Option<&str>,
    config: &GenerationConfig,
) -> Vec<PromptChunk> {
    let formatted: Vec<String> = slides.iter().map(format_slide).collect();
    let sizes: Vec<usize> = formatted.iter().map(String::len).collect();
    let ranges = plan_chunks(&sizes, config.slides_per_chunk, config.max_chunk_chars);

    let template = config
        .prompt_template
        .as_deref()
        .unwrap_or(prompts::DEFAULT_GENERATION_INSTRUCTIONS);
    let instructions = prompts::render_instructions(template, config.cards_min, config.cards_max);

    ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| {
            let first_slide = slides[range.start].number();
            let last_slide = slides[range.end - 1].number();
            let content = formatted[range.clone()].join("\n\n");
            let prompt = prompts::build_generation_prompt(
                &instructions,
                outline,
                first_slide,
                last_slide,
                &content,
            );
            debug!(
                "Chunk {}: slides {}-{}, {} prompt chars",
                index + 1,
                first_slide,
                last_slide,
                prompt.len()
            );
            PromptChunk {
                index,
                first_slide,
                last_slide,
                slide_count: range.len(),
                prompt,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slides(n: usize) -> Vec<SlideRecord> {
        (0..n).map(|i| SlideRecord::new(i, format!("content {i}"))).collect()
    }

    fn config(per_chunk: usize) -> GenerationConfig {
        GenerationConfig::builder()
            .slides_per_chunk(per_chunk)
            .build()
            .unwrap()
    }

    #[test]
    fn forty_slides_fifteen_per_chunk() {
        let chunks = build_chunks(&slides(40), None, &config(15));
        let sizes: Vec<usize> = chunks.iter().map(|c| c.slide_count).collect();
        assert_eq!(sizes, vec![15, 15, 10]);
        assert_eq!((chunks[1].first_slide, chunks[1].last_slide), (16, 30));
        assert_eq!((chunks[2].first_slide, chunks[2].last_slide), (31, 40));
    }

    #[test]
    fn char_budget_closes_chunks_on_slide_boundaries() {
        let ranges = plan_chunks(&[400, 400, 400, 400], 20, 1000);
        assert_eq!(ranges, vec![0..2, 2..4]);
    }

    #[test]
    fn oversized_slide_is_its_own_chunk() {
        let ranges = plan_chunks(&[100, 5000, 100], 20, 1000);
        assert_eq!(ranges, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn no_slides_no_chunks() {
        assert!(plan_chunks(&[], 20, 1000).is_empty());
        assert!(build_chunks(&[], None, &config(20)).is_empty());
    }

    #[test]
    fn slide_never_split_across_chunks() {
        let deck = slides(7);
        let chunks = build_chunks(&deck, None, &config(3));
        for slide in &deck {
            let header = format!("--- Slide {} ---\n", slide.number());
            let holders = chunks.iter().filter(|c| c.prompt.contains(&header)).count();
            assert_eq!(holders, 1, "slide {} appears in {holders} chunks", slide.number());
        }
    }

    #[test]
    fn outline_kept_even_when_referenced_slide_empty() {
        let mut deck = slides(40);
        deck[31].text = String::new();
        let outline = "Slide 32\nTopic: causality";
        let chunks = build_chunks(&deck, Some(outline), &config(20));
        for chunk in &chunks {
            assert!(chunk.prompt.contains("Slide 32"));
            assert!(chunk.prompt.contains("Topic: causality"));
        }
        assert!(chunks[1]
            .prompt
            .contains(&format!("--- Slide 32 ---\n{EMPTY_SLIDE_MARKER}")));
    }

    #[test]
    fn custom_template_replaces_instructions() {
        let cfg = GenerationConfig::builder()
            .prompt_template("Write exactly {cards_max} cloze cards.")
            .cards_per_chunk(3, 5)
            .build()
            .unwrap();
        let chunks = build_chunks(&slides(2), None, &cfg);
        assert!(chunks[0].prompt.contains("Write exactly 5 cloze cards."));
        assert!(!chunks[0].prompt.contains("high-quality flashcards"));
        assert!(chunks[0].prompt.contains("Return ONLY a JSON array"));
    }
}
