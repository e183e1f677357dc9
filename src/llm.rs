//! Language model client abstraction and implementations.
//!
//! Defines the [`LanguageModel`] trait and concrete implementations:
//! - **[`DisabledModel`]** — reports every call as quota-limited; callers
//!   that degrade gracefully keep working without a configured provider.
//! - **[`OpenAiClient`]** — calls the OpenAI chat-completion and embeddings
//!   APIs with retry and backoff.
//!
//! Quota/rate-limit failures are a distinct error class: the ingestion
//! pipeline recovers from them (empty metadata, null embedding) while every
//! other failure propagates.
//!
//! Also provides vector utilities for the embedding column:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::config::LlmConfig;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Quota or rate-limit condition; the only locally recoverable class.
    #[error("language model quota exceeded: {0}")]
    Quota(String),
    #[error("language model call failed: {0}")]
    Other(String),
}

impl LlmError {
    pub fn is_quota(&self) -> bool {
        matches!(self, LlmError::Quota(_))
    }
}

/// A single chat-completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub user: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub usage: Usage,
    pub latency_ms: u64,
}

/// Trait for language model backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Embed a single text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

// ============ Disabled model ============

/// Stand-in used when `llm.provider = "disabled"`. Every call fails with the
/// quota condition, so pipelines that degrade on quota keep functioning and
/// everything else surfaces a clear error.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, LlmError> {
        Err(LlmError::Quota("language model is disabled".to_string()))
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::Quota("language model is disabled".to_string()))
    }
}

// ============ OpenAI client ============

/// Language model backed by the OpenAI API. Requires the `OPENAI_API_KEY`
/// environment variable.
pub struct OpenAiClient {
    embedding_model: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            embedding_model: config.embedding_model.clone(),
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }

    /// POST a JSON body with the shared retry/backoff loop.
    async fn post_with_retry(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        let mut last_err: Option<LlmError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<serde_json::Value>()
                            .await
                            .map_err(|e| LlmError::Other(e.to_string()));
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 {
                        last_err = Some(LlmError::Quota(format!("{}: {}", status, body_text)));
                        continue;
                    }
                    if status.is_server_error() {
                        last_err = Some(LlmError::Other(format!("{}: {}", status, body_text)));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    return Err(LlmError::Other(format!("{}: {}", status, body_text)));
                }
                Err(e) => {
                    last_err = Some(LlmError::Other(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LlmError::Other("request failed after retries".to_string())))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, LlmError> {
        let started = Instant::now();

        let mut messages = Vec::new();
        if let Some(ref system) = req.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": req.user }));

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
        });
        if let Some(t) = req.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(p) = req.top_p {
            body["top_p"] = serde_json::json!(p);
        }
        if let Some(m) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }
        if !req.stop.is_empty() {
            body["stop"] = serde_json::json!(req.stop);
        }

        let json = self
            .post_with_retry("https://api.openai.com/v1/chat/completions", &body)
            .await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let usage = Usage {
            prompt_tokens: json
                .pointer("/usage/prompt_tokens")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            completion_tokens: json
                .pointer("/usage/completion_tokens")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            total_tokens: json
                .pointer("/usage/total_tokens")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        };

        Ok(ChatResponse {
            text,
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
        });

        let json = self
            .post_with_retry("https://api.openai.com/v1/embeddings", &body)
            .await?;

        let embedding = json
            .pointer("/data/0/embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| LlmError::Other("invalid embeddings response".to_string()))?;

        Ok(embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }
}

/// Create the appropriate [`LanguageModel`] based on configuration.
pub fn create_model(config: &LlmConfig) -> anyhow::Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(OpenAiClient::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_model_reports_quota() {
        let err = DisabledModel.embed("anything").await.unwrap_err();
        assert!(err.is_quota());
        let err = DisabledModel.chat(ChatRequest::default()).await.unwrap_err();
        assert!(err.is_quota());
    }
}
