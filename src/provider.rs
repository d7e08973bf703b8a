//! External collaborator traits and the embedding retry machinery.
//!
//! Defines the [`EmbeddingProvider`], [`GenerationProvider`] and
//! [`DocumentSource`] traits, a reqwest-backed OpenAI-compatible embedding
//! provider, and [`RetryPolicy`], the single place where backoff timing
//! lives. Providers report failures once; callers decide how often to retry
//! via [`embed_with_retry`].
//!
//! Retry classification:
//! - HTTP 429 and 5xx, timeouts, connection errors → transient, retried
//! - other 4xx → permanent, fail immediately
//! - wrong dimensionality or empty input → [`Error::Validation`], never retried
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian f32 BLOB codecs for
//!   SQLite storage

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::models::{SourceDocument, Turn};

/// A backend that turns texts into embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Declared vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embeds a batch of texts, one vector per input, in input order.
    /// One call, no internal retry; retrying is the caller's concern.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A backend that produces an answer from assembled context. The crate only
/// defines the seam; wiring an LLM behind it is the application's job.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, question: &str, context: &str, history: &[Turn]) -> Result<String>;
}

/// Yields the current corpus snapshot for synchronization.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<SourceDocument>>;
}

/// A fixed in-memory corpus, used in tests and demos.
pub struct StaticSource {
    documents: Vec<SourceDocument>,
}

impl StaticSource {
    pub fn new(documents: Vec<SourceDocument>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn fetch_all(&self) -> Result<Vec<SourceDocument>> {
        Ok(self.documents.clone())
    }
}

/// Input cap applied to every embedding call when no config overrides it.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 20_000;

/// How provider calls are made: bounded exponential backoff with optional
/// jitter, plus the input cap applied before every call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    pub max_input_chars: usize,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(32),
            jitter: true,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let mut policy = Self::new(
            config.max_retries.max(1),
            Duration::from_millis(config.base_delay_ms),
        );
        policy.max_input_chars = config.max_input_chars.max(1);
        policy
    }

    /// Single attempt, no backoff. Used by tests and by paths that prefer
    /// degrading over waiting.
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Delay before retrying after the given 1-based attempt failed:
    /// `base * 2^(attempt-1)`, capped, plus up to 250ms of jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        if self.jitter {
            backoff + Duration::from_millis(rand::thread_rng().gen_range(0..=250))
        } else {
            backoff
        }
    }
}

/// Embeds a batch through the provider with the policy's retry budget.
///
/// Inputs longer than the policy's `max_input_chars` are truncated before
/// the provider sees them, whichever path the call comes from.
///
/// Only transient provider failures are retried. A successful response with
/// the wrong vector count or dimensionality is a [`Error::Validation`] and
/// returns immediately; so does an empty or whitespace-only input text.
pub async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    policy: &RetryPolicy,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    if texts.iter().any(|t| t.trim().is_empty()) {
        return Err(Error::Validation(
            "cannot embed empty or whitespace-only text".into(),
        ));
    }

    let clamped: Option<Vec<String>> = if texts
        .iter()
        .any(|t| t.chars().count() > policy.max_input_chars)
    {
        Some(
            texts
                .iter()
                .map(|t| clamp_input(t, policy.max_input_chars))
                .collect(),
        )
    } else {
        None
    };
    let texts = clamped.as_deref().unwrap_or(texts);

    let mut attempt = 1u32;
    loop {
        match provider.embed_batch(texts).await {
            Ok(vectors) => {
                validate_response(provider, texts.len(), &vectors)?;
                return Ok(vectors);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    provider = provider.model_name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient embedding failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn validate_response(
    provider: &dyn EmbeddingProvider,
    expected_count: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(Error::Validation(format!(
            "provider '{}' returned {} vectors for {} inputs",
            provider.model_name(),
            vectors.len(),
            expected_count
        )));
    }
    let dims = provider.dims();
    for vec in vectors {
        if vec.len() != dims {
            return Err(Error::Validation(format!(
                "provider '{}' returned a {}-dimensional vector, expected {}",
                provider.model_name(),
                vec.len(),
                dims
            )));
        }
    }
    Ok(())
}

/// Truncates an embedding input to `max_chars`, respecting char boundaries.
pub fn clamp_input(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// OpenAI-compatible embeddings provider over HTTP.
///
/// Calls `POST {endpoint}` with `{"model", "input"}` and reads
/// `data[].embedding` back. One request per [`embed_batch`] call; backoff
/// lives in [`embed_with_retry`].
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::permanent(&config.model, format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transient(&self.model, format!("request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| Error::transient(&self.model, format!("bad response body: {e}")))?;
            return parse_embeddings_response(&self.model, &json);
        }

        let body_text = resp.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(Error::transient(
                &self.model,
                format!("API error {status}: {body_text}"),
            ))
        } else {
            Err(Error::permanent(
                &self.model,
                format!("API error {status}: {body_text}"),
            ))
        }
    }
}

fn parse_embeddings_response(model: &str, json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::permanent(model, "invalid response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::permanent(model, "invalid response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
