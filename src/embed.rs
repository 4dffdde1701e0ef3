//! Embedding providers.
//!
//! The `Embedder` trait is the seam between retrieval and whatever turns
//! text into vectors: a remote API, a local ONNX model, or a test stub.
//! Blank text embeds to `None` rather than erroring; sparse inputs are a
//! routine condition, not a failure.
//!
//! `RestEmbedder` is the shipped implementation: a blocking client for a
//! Gemini-style `embedContent` endpoint, which distinguishes document and
//! query embeddings via a request task type.

use std::thread;
use std::time::Duration;

use crate::error::{MnemoError, Result};
use crate::types::EmbeddingPurpose;
use crate::util::{env_optional, env_u64, env_usize, jitter_ratio, parse_retry_after, truncate_chars};

// ── Trait ────────────────────────────────────────────────────────────────

pub trait Embedder {
    /// Provider kind, e.g. "rest" or "stub".
    fn kind(&self) -> &str;

    /// Model identifier.
    fn model(&self) -> &str;

    /// Embedding dimensionality this provider produces.
    fn dimension(&self) -> usize;

    /// Embed one text for the given purpose. Blank input returns
    /// `Ok(None)`; transport and API failures return `EmbeddingFailed`.
    fn embed(&self, text: &str, purpose: EmbeddingPurpose) -> Result<Option<Vec<f32>>>;

    /// Embed several texts. Providers with a batch endpoint should
    /// override this; the default just loops.
    fn embed_batch(
        &self,
        texts: &[&str],
        purpose: EmbeddingPurpose,
    ) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text, purpose)?);
        }
        Ok(out)
    }
}

// ── REST embedder ────────────────────────────────────────────────────────

/// Configuration for [`RestEmbedder`].
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Model name, e.g. "text-embedding-004".
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// API base URL.
    pub base_url: String,
    /// Embedding dimensionality of the model.
    pub dimension: usize,
    /// Inputs are truncated to this many characters before the request.
    pub max_input_chars: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries on retryable statuses (429 and 5xx).
    pub max_retries: usize,
    /// Base delay in seconds for exponential backoff.
    pub retry_base: f64,
    /// Backoff cap in seconds.
    pub retry_max: f64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            dimension: 768,
            max_input_chars: 10_000,
            timeout_secs: 30,
            max_retries: 2,
            retry_base: 0.5,
            retry_max: 4.0,
        }
    }
}

impl EmbedderConfig {
    /// Build a config from `MNEMO_EMBED_*` environment variables, falling
    /// back to the defaults above.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model: env_optional("MNEMO_EMBED_MODEL").unwrap_or(defaults.model),
            api_key_env: env_optional("MNEMO_EMBED_API_KEY_ENV").unwrap_or(defaults.api_key_env),
            base_url: env_optional("MNEMO_EMBED_BASE_URL").unwrap_or(defaults.base_url),
            dimension: env_usize("MNEMO_EMBED_DIMENSION", defaults.dimension),
            max_input_chars: env_usize("MNEMO_EMBED_MAX_INPUT_CHARS", defaults.max_input_chars),
            timeout_secs: env_u64("MNEMO_EMBED_TIMEOUT", defaults.timeout_secs),
            max_retries: env_usize("MNEMO_EMBED_MAX_RETRIES", defaults.max_retries),
            retry_base: defaults.retry_base,
            retry_max: defaults.retry_max,
        }
    }
}

pub struct RestEmbedder {
    config: EmbedderConfig,
    agent: ureq::Agent,
    api_key: String,
}

impl RestEmbedder {
    /// Create an embedder, reading the API key from the environment
    /// variable named in the config.
    pub fn new(config: EmbedderConfig) -> Result<Self> {
        let api_key = env_optional(&config.api_key_env).ok_or_else(|| {
            MnemoError::embedding(format!(
                "API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;
        Ok(Self::with_api_key(config, api_key))
    }

    /// Create an embedder with an explicit API key.
    #[must_use]
    pub fn with_api_key(config: EmbedderConfig, api_key: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.timeout_secs))
            .timeout_read(Duration::from_secs(config.timeout_secs))
            .timeout_write(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            config,
            agent,
            api_key: api_key.into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EmbedderConfig::from_env())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:embedContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request_payload(&self, text: &str, purpose: EmbeddingPurpose) -> serde_json::Value {
        serde_json::json!({
            "model": format!("models/{}", self.config.model),
            "content": { "parts": [ { "text": text } ] },
            "taskType": purpose.as_task_type(),
        })
    }
}

/// Extract the embedding vector from an `embedContent` response body.
pub(crate) fn parse_embed_response(payload: &serde_json::Value) -> Result<Vec<f32>> {
    let values = payload
        .get("embedding")
        .and_then(|e| e.get("values"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| MnemoError::embedding("response missing embedding.values"))?;

    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let Some(number) = value.as_f64() else {
            return Err(MnemoError::embedding("non-numeric embedding component"));
        };
        out.push(number as f32);
    }
    if out.is_empty() {
        return Err(MnemoError::embedding("empty embedding in response"));
    }
    Ok(out)
}

impl Embedder for RestEmbedder {
    fn kind(&self) -> &str {
        "rest"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn embed(&self, text: &str, purpose: EmbeddingPurpose) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let text = truncate_chars(text, self.config.max_input_chars);
        let payload = self.request_payload(text, purpose);
        let url = self.endpoint();

        let retryable = |status: u16| matches!(status, 429 | 500 | 502 | 503 | 504);
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            let response = self
                .agent
                .post(&url)
                .set("content-type", "application/json")
                .set("x-goog-api-key", &self.api_key)
                .send_json(payload.clone());

            match response {
                Ok(resp) => {
                    let body: serde_json::Value = resp
                        .into_json()
                        .map_err(|e| MnemoError::embedding(format!("response parse: {e}")))?;
                    let vector = parse_embed_response(&body)?;
                    if self.config.dimension != 0 && vector.len() != self.config.dimension {
                        tracing::warn!(
                            expected = self.config.dimension,
                            actual = vector.len(),
                            model = %self.config.model,
                            "embedding dimension differs from configured model dimension"
                        );
                    }
                    return Ok(Some(vector));
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let retry_after = parse_retry_after(&resp);
                    let body = resp.into_string().unwrap_or_default();
                    last_error = format!("{code} {body}");
                    if attempt < self.config.max_retries && retryable(code) {
                        let mut delay = (self.config.retry_base * 2.0_f64.powi(attempt as i32))
                            .min(self.config.retry_max);
                        if let Some(retry_after) = retry_after {
                            delay = delay.max(retry_after);
                        }
                        delay *= 1.0 + jitter_ratio() * 0.2;
                        tracing::warn!(code, attempt, "embedding request failed, retrying");
                        thread::sleep(Duration::from_secs_f64(delay));
                        continue;
                    }
                    break;
                }
                Err(ureq::Error::Transport(err)) => {
                    last_error = err.to_string();
                    if attempt < self.config.max_retries {
                        let delay = (self.config.retry_base * 2.0_f64.powi(attempt as i32))
                            .min(self.config.retry_max)
                            * (1.0 + jitter_ratio() * 0.2);
                        tracing::warn!(attempt, error = %last_error, "embedding transport error, retrying");
                        thread::sleep(Duration::from_secs_f64(delay));
                        continue;
                    }
                    break;
                }
            }
        }

        Err(MnemoError::embedding(format!(
            "embed request to {} failed after {} retries: {last_error}",
            self.config.model, self.config.max_retries
        )))
    }
}
