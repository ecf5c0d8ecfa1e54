/// Embedding provider trait with hosted and local implementations
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Provider initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    /// Connection reset, timeout, 5xx
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Authentication, bad request, unknown model
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Embedding provider unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("Malformed embedding: expected dimension {expected}, got {actual}")]
    Malformed { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Errors worth another attempt after a pause
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Transport(_) | EmbeddingError::RateLimited { .. }
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, EmbeddingError::Unavailable { .. })
    }
}

/// Trait for embedding providers
///
/// Implementations make one request per call and do no caching or retrying.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    /// Generate embeddings for multiple texts, one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimension the provider is expected to produce
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Hosted embeddings API speaking the OpenAI `/embeddings` protocol
pub struct OpenAiProvider {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model_name: String,
    dimension: usize,
}

impl OpenAiProvider {
    pub fn new(
        api_base: &str,
        api_key: &str,
        model_name: &str,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        tracing::info!(
            "Using hosted embedding model: {} ({}D) at {}",
            model_name,
            dimension,
            api_base
        );

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    fn classify_status(response: reqwest::blocking::Response) -> EmbeddingError {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return EmbeddingError::RateLimited { retry_after };
        }

        let message = response.text().unwrap_or_default();
        if status.is_server_error() {
            EmbeddingError::Transport(format!("{}: {}", status, message))
        } else {
            EmbeddingError::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }
}

impl EmbeddingProvider for OpenAiProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // The API refuses empty strings
        let input: Vec<&str> = texts
            .iter()
            .map(|t| if t.is_empty() { " " } else { t.as_str() })
            .collect();
        let request = EmbeddingRequest {
            input,
            model: &self.model_name,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::classify_status(response));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::GenerationError(format!("Invalid response: {}", e)))?;

        if body.data.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// FastEmbed provider for local embedding generation
///
/// Models are downloaded on first use to `~/.cache/huggingface/`.
/// - all-MiniLM-L6-v2: 90MB (384 dims)
/// - bge-small-en-v1.5: 130MB (384 dims)
/// - bge-base-en-v1.5: 440MB (768 dims)
/// - multilingual-e5-small: 470MB (384 dims), suited to French catalogues
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            "multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, multilingual-e5-small",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing local embedding model: {} ({}D)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
