//! Configuration types for flashcard generation.
//!
//! All run behaviour is controlled through [`GenerationConfig`], built via
//! its [`GenerationConfigBuilder`]. Setters clamp obviously invalid values;
//! [`GenerationConfigBuilder::build`] rejects combinations that cannot work.

use crate::error::FlashcardError;
use crate::pipeline::llm::ChatClient;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default chat model, matching the original command-line tool.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for one generation run.
///
/// # Example
/// ```rust
/// use slidecards::{ExtractionMode, GenerationConfig};
///
/// let config = GenerationConfig::builder()
///     .api_key("sk-test")
///     .mode(ExtractionMode::TextOnly)
///     .slides_per_chunk(15)
///     .build()
///     .unwrap();
/// assert_eq!(config.slides_per_chunk, 15);
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Chat model identifier. Default: `gpt-4o`.
    pub model: String,

    /// API key sent as a bearer token. Never printed by `Debug`.
    pub api_key: String,

    /// Base URL of an OpenAI-compatible API. Default: `https://api.openai.com/v1`.
    pub base_url: String,

    /// Pre-constructed chat client. Takes precedence over everything else.
    pub client: Option<Arc<dyn ChatClient>>,

    /// Pre-built `edgequake_llm` provider (Anthropic, Gemini, Ollama, ...).
    /// Used instead of the OpenAI provider built from `api_key`/`base_url`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// How slide content is extracted. Default: [`ExtractionMode::Vision`].
    pub mode: ExtractionMode,

    /// Rendering DPI for vision mode. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Longest rendered edge in pixels for vision mode. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Slide images per vision transcription request. Default: 15.
    pub vision_batch_size: usize,

    /// Maximum slides per generation chunk. Default: 20.
    pub slides_per_chunk: usize,

    /// Maximum slide-text characters per generation chunk. Default: 24 000.
    ///
    /// A single slide longer than this still forms its own chunk; slides are
    /// never split.
    pub max_chunk_chars: usize,

    /// Lower bound of cards requested per chunk. Default: 6.
    pub cards_min: usize,

    /// Upper bound of cards requested per chunk. Default: 12.
    pub cards_max: usize,

    /// Sampling temperature for card generation. Default: 0.3.
    pub temperature: f32,

    /// Sampling temperature for vision transcription. Default: 0.1.
    pub vision_temperature: f32,

    /// Maximum completion tokens per request. Default: 4000.
    pub max_tokens: usize,

    /// Retries on transient API failures (429, 5xx, timeout). Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Chunk requests in flight at once. Results are always merged in chunk
    /// order. Default: 1.
    pub concurrency: usize,

    /// Replacement for the built-in card-generation instructions.
    pub prompt_template: Option<String>,

    /// Write the HTML study app next to the deck. Default: true.
    pub write_html: bool,

    /// Progress events for each chunk.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: None,
            provider: None,
            mode: ExtractionMode::default(),
            dpi: 150,
            max_rendered_pixels: 2000,
            vision_batch_size: 15,
            slides_per_chunk: 20,
            max_chunk_chars: 24_000,
            cards_min: 6,
            cards_max: 12,
            temperature: 0.3,
            vision_temperature: 0.1,
            max_tokens: 4000,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            concurrency: 1,
            prompt_template: None,
            write_html: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("GenerationConfig")
            .field("model", &self.model)
            .field("api_key", &key)
            .field("base_url", &self.base_url)
            .field("client", &self.client.as_ref().map(|_| "<dyn ChatClient>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("mode", &self.mode)
            .field("dpi", &self.dpi)
            .field("vision_batch_size", &self.vision_batch_size)
            .field("slides_per_chunk", &self.slides_per_chunk)
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("cards", &(self.cards_min..=self.cards_max))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("write_html", &self.write_html)
            .finish()
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn mode(mut self, mode: ExtractionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn vision_batch_size(mut self, n: usize) -> Self {
        self.config.vision_batch_size = n.max(1);
        self
    }

    pub fn slides_per_chunk(mut self, n: usize) -> Self {
        self.config.slides_per_chunk = n.max(1);
        self
    }

    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n;
        self
    }

    pub fn cards_per_chunk(mut self, min: usize, max: usize) -> Self {
        self.config.cards_min = min;
        self.config.cards_max = max;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn vision_temperature(mut self, t: f32) -> Self {
        self.config.vision_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn write_html(mut self, v: bool) -> Self {
        self.config.write_html = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, FlashcardError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(FlashcardError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.cards_min == 0 || c.cards_min > c.cards_max {
            return Err(FlashcardError::InvalidConfig(format!(
                "Cards per chunk must satisfy 1 ≤ min ≤ max, got {}–{}",
                c.cards_min, c.cards_max
            )));
        }
        if c.max_chunk_chars < 500 {
            return Err(FlashcardError::InvalidConfig(format!(
                "Chunk character budget must be ≥ 500, got {}",
                c.max_chunk_chars
            )));
        }
        if c.max_tokens == 0 {
            return Err(FlashcardError::InvalidConfig("Max tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(FlashcardError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(FlashcardError::InvalidConfig("Model name is empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How slide content is obtained from the PDF.
///
/// | Mode | Cost | Best for |
/// |------|------|----------|
/// | `TextOnly` | one request per chunk | text-heavy slides with an embedded text layer |
/// | `Vision` | + one request per image batch | diagrams, scanned or image-only slides |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// Embedded PDF text only; no images rendered.
    TextOnly,
    /// Render every page and let a vision model transcribe it. (default)
    #[default]
    Vision,
}
