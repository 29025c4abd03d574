//! Pipeline stages for slide-to-flashcard generation.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested without a PDF or a network connection.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ (encode ▶ transcribe) ──▶ chunk ──▶ llm ──▶ parse ──▶ write
//! (paths)   (pdfium)     (vision mode only)       (prompts)  (HTTP)  (JSON)   (files)
//! ```
//!
//! 1. [`input`]      — validate the slide path, resolve the API key, read the outline
//! 2. [`extract`]    — per-page text (and images in vision mode) via pdfium,
//!    inside `spawn_blocking`
//! 3. [`encode`]     — PNG-encode and base64-wrap rendered pages
//! 4. [`transcribe`] — vision mode: batches of page images → slide text
//! 5. [`chunk`]      — slide-aligned chunking and prompt assembly
//! 6. [`llm`]        — chat-completion client with retry/backoff; the only
//!    stage with network I/O
//! 7. [`parse`]      — locate and validate the JSON card array
//! 8. [`write`]      — atomic writes of the deck, slides JSON and study app

pub mod chunk;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod parse;
pub mod transcribe;
pub mod write;
