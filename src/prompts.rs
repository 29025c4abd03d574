//! Prompts for vision transcription and flashcard generation.
//!
//! Every prompt lives here so changing the instructions never touches the
//! retry or parsing code. Callers may replace the card-generation
//! instructions via [`crate::config::GenerationConfig::prompt_template`];
//! slide content and the outline are always appended by
//! [`build_generation_prompt`].

/// Opening line of every generation prompt.
pub const GENERATION_PREAMBLE: &str =
    "You are creating exam preparation flashcards for a university course.";

/// Default card-generation instructions.
///
/// `{cards_min}` and `{cards_max}` are substituted by [`render_instructions`].
pub const DEFAULT_GENERATION_INSTRUCTIONS: &str = r#"Generate {cards_min}-{cards_max} high-quality flashcards from these slides. Each flashcard should:
1. Ask one clear, specific QUESTION on the front
2. Give a complete but concise ANSWER on the back
3. Focus on exam-relevant content and key concepts
4. Include a practical example where it helps
5. Cover both conceptual understanding and application
6. Write mathematical formulas in plain text notation (e.g. Y_i = b0 + b1*X1 + e_i)
7. Skip purely structural slides (agenda, title pages, section dividers)

Identify the topic or chapter each card belongs to from the slide content."#;

/// Output contract appended after the instructions, custom or not.
pub const GENERATION_OUTPUT_FORMAT: &str = r#"Return ONLY a JSON array of objects with "question", "answer" and "topic" string fields.
No markdown, no code fences, no commentary: just valid JSON."#;

/// Marker written in place of an empty slide so slide numbering stays visible.
pub const EMPTY_SLIDE_MARKER: &str = "(no extractable text)";

/// Header placed above the outline text.
pub const OUTLINE_HEADING: &str = "EXAM FOCUS (prioritize these topics and slides; skip content the focus does not cover):";

/// Instruction for one batch of rendered slide images.
pub fn vision_transcription_prompt(first_slide: usize, last_slide: usize) -> String {
    format!(
        "Extract the text content from each slide image (slides {first_slide}-{last_slide}, \
         one image per slide, in order). Return a JSON object whose keys are the slide numbers \
         and whose values are the full slide text. Include all text, formulas (in plain text \
         notation), bullet points and labels, and briefly describe diagrams. Return ONLY valid \
         JSON, no markdown. Example: {{\"{first_slide}\": \"slide text...\"}}"
    )
}

/// Substitute the card-count placeholders in an instruction template.
pub fn render_instructions(template: &str, cards_min: usize, cards_max: usize) -> String {
    template
        .replace("{cards_min}", &cards_min.to_string())
        .replace("{cards_max}", &cards_max.to_string())
}

/// Outline section, or an empty string when no outline was supplied.
pub fn outline_section(outline: Option<&str>) -> String {
    match outline.map(str::trim) {
        Some(text) if !text.is_empty() => format!("{OUTLINE_HEADING}\n{text}\n"),
        _ => String::new(),
    }
}

/// Assemble the full prompt for one chunk of slides.
///
/// `slide_content` is the already-formatted slide block (see
/// [`crate::pipeline::chunk::format_slide`]).
pub fn build_generation_prompt(
    instructions: &str,
    outline: Option<&str>,
    first_slide: usize,
    last_slide: usize,
    slide_content: &str,
) -> String {
    let outline = outline_section(outline);
    let mut prompt = String::with_capacity(slide_content.len() + outline.len() + 1024);
    prompt.push_str(GENERATION_PREAMBLE);
    prompt.push_str("\n\n");
    if !outline.is_empty() {
        prompt.push_str(&outline);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "SLIDE CONTENT (slides {first_slide}-{last_slide}):\n{slide_content}\n\n"
    ));
    prompt.push_str(instructions.trim());
    prompt.push_str("\n\n");
    prompt.push_str(GENERATION_OUTPUT_FORMAT);
    prompt.push('\n');
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_substitute_card_counts() {
        let text = render_instructions(DEFAULT_GENERATION_INSTRUCTIONS, 6, 12);
        assert!(text.starts_with("Generate 6-12 high-quality flashcards"));
        assert!(!text.contains("{cards_"));
    }

    #[test]
    fn outline_section_empty_when_blank() {
        assert_eq!(outline_section(None), "");
        assert_eq!(outline_section(Some("  \n ")), "");
    }

    #[test]
    fn prompt_contains_outline_verbatim() {
        let outline = "Slide 32\nTopic: causality";
        let prompt = build_generation_prompt("Make cards.", Some(outline), 21, 40, "--- Slide 21 ---\nx");
        assert!(prompt.contains("Slide 32\nTopic: causality"));
        assert!(prompt.contains("SLIDE CONTENT (slides 21-40)"));
        assert!(prompt.trim_end().ends_with("just valid JSON."));
    }

    #[test]
    fn vision_prompt_names_range() {
        let p = vision_transcription_prompt(16, 30);
        assert!(p.contains("slides 16-30"));
        assert!(p.contains("{\"16\": \"slide text...\"}"));
    }
}
