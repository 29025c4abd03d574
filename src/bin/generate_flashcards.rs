//! CLI binary for slidecards.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GenerationConfig`, runs the pipeline and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use slidecards::pipeline::input;
use slidecards::{
    generate_to_files, ExtractionMode, GenerationConfig, GenerationProgressCallback,
    ProgressCallback,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while slides are extracted and
/// transcribed, then a bar over the generation chunks with one log line per
/// chunk.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading slides…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, chunk: usize) -> f64 {
        self.start_times
            .lock()
            .map(|mut m| m.remove(&chunk))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_slides_extracted(&self, total_slides: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracted {total_slides} slides"))
        ));
    }

    fn on_vision_batch(&self, first_slide: usize, last_slide: usize) {
        self.bar.set_prefix("Reading");
        self.bar
            .set_message(format!("transcribing slides {first_slide}-{last_slide}"));
    }

    fn on_vision_batch_error(&self, first_slide: usize, last_slide: usize, error: &str) {
        self.bar.println(format!(
            "  {} Slides {}-{}  {}",
            yellow("⚠"),
            first_slide,
            last_slide,
            dim(&format!("could not parse transcription ({error}); kept embedded text")),
        ));
    }

    fn on_generation_start(&self, total_chunks: usize) {
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Generating flashcards in {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, chunk: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(chunk, Instant::now());
        }
        self.bar.set_message(format!("chunk {chunk}"));
    }

    fn on_chunk_complete(&self, chunk: usize, total: usize, cards: usize) {
        let secs = self.elapsed_secs(chunk);
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            chunk,
            total,
            dim(&format!("{cards:>3} cards")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, chunk: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(chunk);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            chunk,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_generation_complete(&self, total_chunks: usize, total_cards: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} cards from {} chunks",
                green("✔"),
                bold(&total_cards.to_string()),
                total_chunks
            );
        } else {
            eprintln!(
                "{} {} cards from {}/{} chunks  ({} failed)",
                yellow("⚠"),
                bold(&total_cards.to_string()),
                total_chunks.saturating_sub(failed),
                total_chunks,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Vision mode (default): every slide is rendered and read by the model
  generate_flashcards --slides lecture.pdf --api-key ~/.openai_key

  # Embedded text only: cheaper, fine for text-heavy slides
  generate_flashcards --slides lecture.pdf --api-key sk-... --text-only

  # Focus the cards on what the exam covers
  generate_flashcards --slides lecture.pdf --api-key key.txt --outline exam_topics.txt

  # Custom output location, no HTML page
  generate_flashcards --slides lecture.pdf --api-key key.txt -o decks/week3.json --no-html

  # Any OpenAI-compatible endpoint
  generate_flashcards --slides lecture.pdf --api-key ollama \
      --base-url http://localhost:11434/v1 --model llama3.2-vision

OUTPUT FILES (next to the deck, default flashcards.json beside the slides):
  flashcards.json          the deck: [{"question", "answer", "topic"}, ...]
  flashcards_slides.json   extracted slide text: [{"index", "text"}, ...]
  flashcards.html          study page with the deck embedded (open directly,
                           or run `study-server` in that directory)

API KEY:
  --api-key accepts the key itself or a path to a file; for a file the first
  non-empty line is used.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          API key (same rules as --api-key)
  OPENAI_BASE_URL         OpenAI-compatible base URL
  SLIDECARDS_MODEL        Chat model (default gpt-4o)
  SLIDECARDS_*            Every other option, e.g. SLIDECARDS_CHUNK_SIZE
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Log filter override (e.g. slidecards=debug)

  PDFium (~30 MB) is downloaded automatically on first run and cached.
"#;

/// Generate exam flashcards from PDF lecture slides with a hosted LLM.
#[derive(Parser, Debug)]
#[command(
    name = "generate_flashcards",
    version,
    about = "Generate exam flashcards from PDF lecture slides with a hosted LLM",
    long_about = "Extract the slides of a PDF deck, ask an OpenAI-compatible chat model for \
question/answer flashcards, and write a JSON deck plus a self-contained HTML study page.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF slide deck.
    #[arg(long, env = "SLIDECARDS_SLIDES")]
    slides: PathBuf,

    /// API key, or path to a file containing it.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Text file listing the topics/slides the exam focuses on.
    #[arg(long, env = "SLIDECARDS_OUTLINE")]
    outline: Option<PathBuf>,

    /// Deck output path. Default: flashcards.json next to the slides.
    #[arg(short, long, env = "SLIDECARDS_OUTPUT")]
    output: Option<PathBuf>,

    /// Chat model ID.
    #[arg(long, env = "SLIDECARDS_MODEL", default_value = slidecards::config::DEFAULT_MODEL)]
    model: String,

    /// Use embedded PDF text only; skip rendering and vision transcription.
    #[arg(long, env = "SLIDECARDS_TEXT_ONLY")]
    text_only: bool,

    /// OpenAI-compatible API base URL.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = slidecards::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Maximum slides per generation request.
    #[arg(long, env = "SLIDECARDS_CHUNK_SIZE", default_value_t = 20)]
    chunk_size: usize,

    /// Maximum slide-text characters per generation request.
    #[arg(long, env = "SLIDECARDS_MAX_CHUNK_CHARS", default_value_t = 24_000)]
    max_chunk_chars: usize,

    /// Fewest cards requested per chunk.
    #[arg(long, env = "SLIDECARDS_CARDS_MIN", default_value_t = 6)]
    cards_min: usize,

    /// Most cards requested per chunk.
    #[arg(long, env = "SLIDECARDS_CARDS_MAX", default_value_t = 12)]
    cards_max: usize,

    /// Chunk requests in flight at once (output order is unaffected).
    #[arg(short, long, env = "SLIDECARDS_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Rendering DPI for vision mode (72–400).
    #[arg(long, env = "SLIDECARDS_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Sampling temperature for card generation (0.0–2.0).
    #[arg(long, env = "SLIDECARDS_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max completion tokens per request.
    #[arg(long, env = "SLIDECARDS_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Retries per request on rate limits, timeouts and server errors.
    #[arg(long, env = "SLIDECARDS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-request timeout in seconds.
    #[arg(long, env = "SLIDECARDS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Text file replacing the built-in card instructions
    /// ({cards_min}/{cards_max} are substituted).
    #[arg(long, env = "SLIDECARDS_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Do not write the HTML study page.
    #[arg(long, env = "SLIDECARDS_NO_HTML")]
    no_html: bool,

    /// Print run statistics as JSON on stdout.
    #[arg(long, env = "SLIDECARDS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SLIDECARDS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SLIDECARDS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SLIDECARDS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the progress bar active, library INFO logs would only fight it
    // for the terminal.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Validate inputs before anything slow ─────────────────────────────
    let slides = input::resolve_slides(&cli.slides).context("Invalid --slides")?;
    let api_key = input::resolve_api_key(&cli.api_key).context("Invalid --api-key")?;
    if let Some(ref outline) = cli.outline {
        input::read_outline(outline).context("Invalid --outline")?;
    }

    // ── Ensure PDFium engine is available ────────────────────────────────
    ensure_pdfium(cli.quiet)?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, api_key, progress_cb).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let (output, paths) = generate_to_files(
        &slides,
        cli.outline.as_deref(),
        cli.output.as_deref(),
        &config,
    )
    .await
    .context("Flashcard generation failed")?;

    let topics = output.topic_summary();

    if cli.json {
        let report = serde_json::json!({
            "paths": paths,
            "stats": output.stats,
            "topics": topics,
            "failed_vision_batches": output.stats.failed_vision_batches,
            "failed_chunks": output
                .chunks
                .iter()
                .filter_map(|c| c.error.as_ref().map(|e| e.to_string()))
                .collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    if cli.quiet {
        return Ok(());
    }

    let stats = &output.stats;
    eprintln!(
        "{}  {} cards  {}ms  →  {}",
        if stats.failed_chunks == 0
            && stats.dropped_records == 0
            && stats.failed_vision_batches == 0
        {
            green("✔")
        } else {
            yellow("⚠")
        },
        bold(&stats.total_cards.to_string()),
        stats.total_duration_ms,
        bold(&paths.deck.display().to_string()),
    );
    eprintln!("   slides  {}", dim(&paths.slides.display().to_string()));
    if let Some(ref html) = paths.html {
        eprintln!("   study   {}", dim(&html.display().to_string()));
    }
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );

    if stats.failed_vision_batches > 0 {
        eprintln!(
            "   {} {}/{} vision batches could not be parsed; those slides used embedded text",
            yellow("⚠"),
            stats.failed_vision_batches,
            stats.vision_batches
        );
    }
    if stats.failed_chunks > 0 {
        eprintln!(
            "   {} {}/{} chunks returned no usable JSON",
            yellow("⚠"),
            stats.failed_chunks,
            stats.total_chunks
        );
        for err in output.chunks.iter().filter_map(|c| c.error.as_ref()) {
            eprintln!("     {}", dim(&err.to_string()));
        }
    }
    if stats.dropped_records > 0 {
        eprintln!(
            "   {} {} malformed cards dropped",
            yellow("⚠"),
            stats.dropped_records
        );
    }
    if stats.empty_slides > 0 {
        eprintln!(
            "   {}",
            dim(&format!(
                "{} of {} slides had no extractable text",
                stats.empty_slides, stats.total_slides
            ))
        );
    }

    eprintln!("\n{}", bold("Cards per topic:"));
    for t in &topics {
        eprintln!("  {:>4}  {}", t.count, t.topic);
    }

    Ok(())
}

/// Download pdfium on first run, with a byte-level progress bar.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `GenerationConfig`.
async fn build_config(
    cli: &Cli,
    api_key: String,
    progress: Option<ProgressCallback>,
) -> Result<GenerationConfig> {
    let mode = if cli.text_only {
        ExtractionMode::TextOnly
    } else {
        ExtractionMode::Vision
    };

    let mut builder = GenerationConfig::builder()
        .model(cli.model.trim())
        .api_key(api_key)
        .base_url(cli.base_url.trim())
        .mode(mode)
        .dpi(cli.dpi)
        .slides_per_chunk(cli.chunk_size)
        .max_chunk_chars(cli.max_chunk_chars)
        .cards_per_chunk(cli.cards_min, cli.cards_max)
        .concurrency(cli.concurrency)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .write_html(!cli.no_html);

    if let Some(ref path) = cli.prompt_file {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt template from {:?}", path))?;
        builder = builder.prompt_template(template);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
