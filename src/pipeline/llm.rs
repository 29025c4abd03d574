//! Chat-completion client: the only stage with network I/O.
//!
//! [`ChatClient`] is the seam between the pipeline and a hosted model.
//! [`ProviderClient`] adapts any `edgequake_llm` provider to it; the default
//! is the OpenAI provider pointed at the configured base URL, which also
//! covers compatible gateways (vLLM, Ollama's `/v1` endpoint, proxies).
//! Tests substitute a scripted client.
//!
//! ## Retry Strategy
//!
//! Rate limits, 5xx responses, timeouts and connection failures are
//! transient and are retried by [`complete_with_retry`] with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`, so 500 ms → 1 s → 2 s by
//! default). A server-suggested delay ("try again in 20s") takes precedence,
//! capped at [`MAX_RETRY_AFTER_SECS`]. Authentication and other client
//! errors are returned immediately: retrying them only burns quota.

use crate::config::{GenerationConfig, DEFAULT_BASE_URL};
use crate::error::FlashcardError;
use crate::output::SlideImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, OpenAIProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Upper bound on a server-suggested retry delay.
pub const MAX_RETRY_AFTER_SECS: u64 = 60;

/// One single-turn request: a text prompt plus optional slide images.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub images: Vec<SlideImage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ChatRequest {
    pub fn text(prompt: impl Into<String>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
            temperature,
            max_tokens,
        }
    }

    pub fn with_images(mut self, images: Vec<SlideImage>) -> Self {
        self.images = images;
        self
    }
}

/// The model's reply and token accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Failure of a single request attempt.
#[derive(Debug, Clone, Error)]
pub enum LlmCallError {
    #[error("authentication failed: {detail}")]
    Auth { detail: String },

    #[error("rate limited: {detail}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        detail: String,
    },

    #[error("server error: {detail}")]
    Server { detail: String },

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {detail}")]
    Api { detail: String },
}

impl LlmCallError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmCallError::RateLimited { .. }
                | LlmCallError::Server { .. }
                | LlmCallError::Timeout { .. }
                | LlmCallError::Network(_)
        )
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            LlmCallError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// A hosted chat model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Human-readable endpoint identity used in error messages.
    fn endpoint(&self) -> String;

    /// Send one request. Implementations do not retry.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmCallError>;
}

/// Retry knobs shared by every request in a run.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Delay before attempt number `attempt` (1-based retry count).
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS));
        }
        let shift = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << shift))
    }
}

/// A successful completion plus how many retries it took.
#[derive(Debug, Clone)]
pub struct Completion {
    pub response: ChatResponse,
    pub retries: u32,
    pub duration_ms: u64,
}

/// A request that failed for good.
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub error: LlmCallError,
    pub retries: u32,
}

impl CallFailure {
    /// Escalate to the fatal run error for `what` ("Chunk 2", "Vision batch 1").
    pub fn into_fatal(self, endpoint: String, what: &str) -> FlashcardError {
        match self.error {
            LlmCallError::Auth { detail, .. } => FlashcardError::Auth { endpoint, detail },
            error if error.is_transient() => FlashcardError::TransientExhausted {
                what: what.to_string(),
                retries: self.retries,
                detail: error.to_string(),
            },
            error => FlashcardError::LlmApiError {
                message: format!("{what}: {error}"),
            },
        }
    }
}

/// Send `request`, retrying transient failures per `policy`.
///
/// `label` names the request in log lines ("Chunk 2", "Vision batch 1").
pub async fn complete_with_retry(
    client: &Arc<dyn ChatClient>,
    request: &ChatRequest,
    policy: RetryPolicy,
    label: &str,
) -> Result<Completion, CallFailure> {
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        match client.complete(request).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(Completion {
                    response,
                    retries: attempt,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
            Err(error) if error.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt, error.retry_after());
                warn!(
                    "{}: attempt {} failed: {}; retry {}/{} in {}ms",
                    label,
                    attempt,
                    error,
                    attempt,
                    policy.max_retries,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            Err(error) => {
                warn!("{}: giving up after {} retries: {}", label, attempt, error);
                return Err(CallFailure {
                    error,
                    retries: attempt,
                });
            }
        }
    }
}

/// The client for a run, from most to least specific: an injected
/// [`ChatClient`], an injected `edgequake_llm` provider, or the OpenAI
/// provider built from the key and base URL.
pub fn resolve_client(config: &GenerationConfig) -> Result<Arc<dyn ChatClient>, FlashcardError> {
    if let Some(client) = &config.client {
        return Ok(Arc::clone(client));
    }
    if let Some(provider) = &config.provider {
        return Ok(Arc::new(ProviderClient::new(
            Arc::clone(provider),
            config.base_url.as_str(),
            config.api_timeout_secs,
        )));
    }
    if config.api_key.trim().is_empty() {
        return Err(FlashcardError::EmptyApiKey);
    }
    let client = ProviderClient::openai(
        &config.base_url,
        config.api_key.trim(),
        &config.model,
        config.api_timeout_secs,
    );
    debug!("Using {:?}", client);
    Ok(Arc::new(client))
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`ChatClient`] over an `edgequake_llm` provider.
///
/// Adds the per-request timeout and maps provider errors onto
/// [`LlmCallError`] so the retry layer can tell transient failures apart.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    endpoint: String,
    timeout_secs: u64,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderClient {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            provider,
            endpoint: endpoint.into(),
            timeout_secs,
        }
    }

    /// OpenAI, or any endpoint speaking its chat-completions format.
    pub fn openai(base_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let provider = if base_url == DEFAULT_BASE_URL {
            OpenAIProvider::new(api_key)
        } else {
            OpenAIProvider::compatible(api_key, base_url)
        }
        .with_model(model);
        Self::new(Arc::new(provider), base_url, timeout_secs)
    }
}

#[async_trait]
impl ChatClient for ProviderClient {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmCallError> {
        let messages = vec![build_message(request)];
        let options = build_options(request);
        let call = self.provider.chat(&messages, Some(&options));

        match timeout(Duration::from_secs(self.timeout_secs), call).await {
            Err(_) => Err(LlmCallError::Timeout {
                secs: self.timeout_secs,
            }),
            Ok(Err(e)) => Err(classify_provider_error(&e, self.timeout_secs)),
            Ok(Ok(response)) => Ok(ChatResponse {
                content: response.content,
                prompt_tokens: response.prompt_tokens,
                completion_tokens: response.completion_tokens,
            }),
        }
    }
}

/// One user turn: the prompt, plus slide images at low detail in vision mode.
fn build_message(request: &ChatRequest) -> ChatMessage {
    if request.images.is_empty() {
        ChatMessage::user(request.prompt.as_str())
    } else {
        ChatMessage::user_with_images(request.prompt.as_str(), image_parts(&request.images))
    }
}

fn image_parts(images: &[SlideImage]) -> Vec<ImageData> {
    images
        .iter()
        .map(|img| ImageData::new(img.data.clone(), img.mime_type.as_str()).with_detail("low"))
        .collect()
}

fn build_options(request: &ChatRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

/// Map a provider error onto the retry taxonomy.
///
/// Typed variants are taken at face value. `ApiError` and the rest carry
/// the upstream message only, so the HTTP status or error code inside it
/// decides.
pub fn classify_provider_error(err: &LlmError, timeout_secs: u64) -> LlmCallError {
    match err {
        LlmError::AuthError { .. } => LlmCallError::Auth {
            detail: err.to_string(),
        },
        LlmError::RateLimited { .. } => rate_limited(err.to_string()),
        LlmError::Timeout { .. } => LlmCallError::Timeout { secs: timeout_secs },
        LlmError::NetworkError { .. } => LlmCallError::Network(err.to_string()),
        _ => classify_message(&err.to_string()),
    }
}

static RE_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:status(?:\s+code)?|http)\b\D{0,4}([1-5]\d\d)\b")
        .expect("valid status regex")
});

static RE_TRY_AGAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:try again|retry after) in (\d+(?:\.\d+)?)\s*(ms|s)\b")
        .expect("valid retry-after regex")
});

/// Classify an upstream error message.
pub fn classify_message(message: &str) -> LlmCallError {
    let lower = message.to_ascii_lowercase();
    let status = RE_STATUS
        .captures(message)
        .and_then(|c| c[1].parse::<u16>().ok());
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    // A spent quota also arrives as 429 but never clears by waiting.
    if has(&["insufficient_quota", "exceeded your current quota"]) {
        return LlmCallError::Api {
            detail: message.to_string(),
        };
    }
    if matches!(status, Some(401) | Some(403))
        || has(&["invalid_api_key", "incorrect api key", "unauthorized", "authentication"])
    {
        return LlmCallError::Auth {
            detail: message.to_string(),
        };
    }
    if status == Some(429) || has(&["rate limit", "rate_limit", "too many requests"]) {
        return rate_limited(message.to_string());
    }
    if matches!(status, Some(500..=599))
        || has(&["server_error", "internal server error", "bad gateway", "service unavailable", "overloaded"])
    {
        return LlmCallError::Server {
            detail: message.to_string(),
        };
    }
    if status == Some(408) || has(&["timed out", "timeout"]) {
        return LlmCallError::Timeout { secs: 0 };
    }
    if has(&["error sending request", "connection refused", "connection reset", "dns error"]) {
        return LlmCallError::Network(message.to_string());
    }
    LlmCallError::Api {
        detail: message.to_string(),
    }
}

fn rate_limited(detail: String) -> LlmCallError {
    LlmCallError::RateLimited {
        retry_after_secs: suggested_delay_secs(&detail),
        detail,
    }
}

/// "Please try again in 1.5s" → `Some(2)`.
fn suggested_delay_secs(message: &str) -> Option<u64> {
    let caps = RE_TRY_AGAIN.captures(message)?;
    let value: f64 = caps[1].parse().ok()?;
    let secs = if caps[2].eq_ignore_ascii_case("ms") {
        value / 1000.0
    } else {
        value
    };
    Some(secs.ceil().max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<ChatResponse, LlmCallError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ChatResponse, LlmCallError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatClient for Scripted {
        fn endpoint(&self) -> String {
            "scripted".into()
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmCallError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmCallError::Network("script exhausted".into())))
        }
    }

    fn ok(text: &str) -> Result<ChatResponse, LlmCallError> {
        Ok(ChatResponse {
            content: text.into(),
            ..Default::default()
        })
    }

    const FAST: RetryPolicy = RetryPolicy {
        max_retries: 3,
        backoff_ms: 1,
    };

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
        };
        assert_eq!(p.delay(1, None), Duration::from_millis(500));
        assert_eq!(p.delay(2, None), Duration::from_millis(1000));
        assert_eq!(p.delay(3, None), Duration::from_millis(2000));
    }

    #[test]
    fn retry_after_takes_precedence_and_is_capped() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
        };
        assert_eq!(p.delay(1, Some(7)), Duration::from_secs(7));
        assert_eq!(p.delay(1, Some(3600)), Duration::from_secs(MAX_RETRY_AFTER_SECS));
    }

    #[test]
    fn upstream_messages_classified() {
        let auth = classify_message(
            "invalid_request_error: Incorrect API key provided: sk-inval*** (code: invalid_api_key)",
        );
        assert!(matches!(auth, LlmCallError::Auth { .. }));
        assert!(!auth.is_transient());

        assert!(matches!(
            classify_message("HTTP 401 Unauthorized"),
            LlmCallError::Auth { .. }
        ));
        assert!(classify_message("status code 503: upstream overloaded").is_transient());
        assert!(classify_message("connection refused").is_transient());
        assert!(!classify_message("The model `gpt-9` does not exist").is_transient());
    }

    #[test]
    fn rate_limit_honours_suggested_delay() {
        match classify_message("Rate limit reached for gpt-4o. Please try again in 1.5s.") {
            LlmCallError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, Some(2)),
            other => panic!("unexpected: {other:?}"),
        }
        match classify_message("HTTP 429 Too Many Requests") {
            LlmCallError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, None),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn spent_quota_is_not_retried() {
        let err = classify_message(
            "429: You exceeded your current quota, please check your plan (insufficient_quota)",
        );
        assert!(matches!(err, LlmCallError::Api { .. }));
    }

    #[test]
    fn typed_provider_errors_keep_their_kind() {
        let err = LlmError::ApiError("status 502 Bad Gateway".into());
        assert!(matches!(
            classify_provider_error(&err, 60),
            LlmCallError::Server { .. }
        ));
        let err = LlmError::ApiError("content_filter: response blocked".into());
        assert!(matches!(
            classify_provider_error(&err, 60),
            LlmCallError::Api { .. }
        ));
    }

    #[test]
    fn vision_requests_attach_every_image() {
        let req = ChatRequest::text("read these", 0.1, 100).with_images(vec![
            SlideImage::new("QUJD", "image/png"),
            SlideImage::new("REVG", "image/png"),
        ]);
        assert_eq!(image_parts(&req.images).len(), 2);

        let opts = build_options(&req);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(100));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let scripted = Scripted::new(vec![
            Err(LlmCallError::Server {
                detail: "bad gateway".into(),
            }),
            Err(LlmCallError::Timeout { secs: 60 }),
            ok("[]"),
        ]);
        let client: Arc<dyn ChatClient> = scripted.clone();
        let done = complete_with_retry(&client, &ChatRequest::text("p", 0.3, 10), FAST, "Chunk 1")
            .await
            .unwrap();
        assert_eq!(done.retries, 2);
        assert_eq!(done.response.content, "[]");
        assert_eq!(*scripted.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let scripted = Scripted::new(vec![Err(LlmCallError::Auth {
            detail: "bad key".into(),
        })]);
        let client: Arc<dyn ChatClient> = scripted.clone();
        let failure = complete_with_retry(&client, &ChatRequest::text("p", 0.3, 10), FAST, "Chunk 1")
            .await
            .unwrap_err();
        assert!(matches!(failure.error, LlmCallError::Auth { .. }));
        assert_eq!(failure.retries, 0);
        assert_eq!(*scripted.calls.lock().unwrap(), 1);
    }

    #[test]
    fn failures_escalate_by_kind() {
        let auth = CallFailure {
            error: LlmCallError::Auth {
                detail: "Incorrect API key provided".into(),
            },
            retries: 0,
        };
        assert!(matches!(
            auth.into_fatal("https://api.openai.com/v1".into(), "Chunk 1"),
            FlashcardError::Auth { .. }
        ));

        let exhausted = CallFailure {
            error: LlmCallError::RateLimited {
                retry_after_secs: None,
                detail: "slow down".into(),
            },
            retries: 3,
        };
        match exhausted.into_fatal("x".into(), "Chunk 2") {
            FlashcardError::TransientExhausted { what, retries, .. } => {
                assert_eq!(what, "Chunk 2");
                assert_eq!(retries, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let bad_request = CallFailure {
            error: LlmCallError::Api {
                detail: "model not found".into(),
            },
            retries: 0,
        };
        assert!(matches!(
            bad_request.into_fatal("x".into(), "Chunk 1"),
            FlashcardError::LlmApiError { .. }
        ));
    }

    #[test]
    fn injected_client_wins_and_missing_key_is_rejected() {
        let scripted: Arc<dyn ChatClient> = Scripted::new(vec![]);
        let config = GenerationConfig::builder().client(scripted).build().unwrap();
        assert_eq!(resolve_client(&config).unwrap().endpoint(), "scripted");

        let config = GenerationConfig::builder().build().unwrap();
        assert!(matches!(
            resolve_client(&config),
            Err(FlashcardError::EmptyApiKey)
        ));
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let scripted = Scripted::new(vec![]);
        let client: Arc<dyn ChatClient> = scripted.clone();
        let failure = complete_with_retry(&client, &ChatRequest::text("p", 0.3, 10), FAST, "Chunk 1")
            .await
            .unwrap_err();
        assert_eq!(failure.retries, 3);
        assert_eq!(*scripted.calls.lock().unwrap(), 4);
    }
}
