// embedding.rs — The embedding provider seam.
//
// The semantic layer needs two things from a model: turn text into a
// fixed-length vector, and score two vectors. Everything model-specific
// lives behind `EmbeddingProvider`; the engine only sees vectors and scores.
//
// Three providers ship with the crate:
// - HashingEmbedder: deterministic feature hashing, no model, no network.
// - OllamaEmbedder: a local Ollama server's /api/embeddings endpoint.
// - ExternalEmbedder: a closure, for callers that own their model.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EmbeddingError;

/// Turns text into vectors and scores vector pairs.
///
/// Implementations must be safe to call from many threads at once and must
/// not carry mutable state between calls.
pub trait EmbeddingProvider: Send + Sync {
    /// Encode a text into a fixed-length vector.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Similarity in [-1, 1]. Defaults to cosine similarity.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }

    /// Short name used in logs.
    fn name(&self) -> &str {
        "external"
    }
}

/// Cosine similarity of two vectors, clamped to [-1, 1].
///
/// Mismatched lengths and zero-norm vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Deterministic bag-of-words embedder based on feature hashing.
///
/// Lower-cased word unigrams and adjacent-word bigrams are hashed with
/// SHA-256 into `dimension` signed buckets, then L2-normalized. Texts that
/// share vocabulary score high; there is no notion of synonymy.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::EmptyVector);
        }

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut vector = vec![0.0f32; self.dimension];
        for word in &words {
            let (i, sign) = self.bucket(word);
            vector[i] += sign;
        }
        for pair in words.windows(2) {
            let (i, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[i] += 0.5 * sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedding provider backed by an Ollama server (`POST /api/embeddings`).
///
/// Every request is bounded by `timeout`; a timeout surfaces as
/// [`EmbeddingError::Timeout`].
pub struct OllamaEmbedder {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", base_url.as_ref().trim_end_matches('/')),
            model: model.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl EmbeddingProvider for OllamaEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    EmbeddingError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Transport(format!(
                "{} returned HTTP {}",
                self.endpoint, status
            )));
        }

        let body: OllamaEmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        if body.embedding.is_empty() {
            return Err(EmbeddingError::EmptyVector);
        }
        Ok(body.embedding)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

type EncodeFn = Box<dyn Fn(&str) -> Result<Vec<f32>, EmbeddingError> + Send + Sync>;

/// Embedding provider that delegates encoding to a caller-supplied function.
pub struct ExternalEmbedder {
    encode_fn: EncodeFn,
}

impl ExternalEmbedder {
    pub fn new(
        encode_fn: impl Fn(&str) -> Result<Vec<f32>, EmbeddingError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            encode_fn: Box::new(encode_fn),
        }
    }
}

impl EmbeddingProvider for ExternalEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (self.encode_fn)(text)
    }
}
