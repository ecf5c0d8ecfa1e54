/// Embedding generation
///
/// Turns free text into fixed-dimension vectors through an external provider.
/// Architecture:
/// - EmbeddingProvider trait for abstraction over backends
/// - OpenAiProvider for the hosted embeddings API, FastEmbedProvider for local models
/// - RetryPolicy for transient provider failures
/// - EmbeddingClient enforcing the configured dimension
/// - BatchEmbedder for throttled bulk embedding
mod batch;
mod client;
mod provider;
mod retry;

pub use batch::{BatchEmbedder, Throttle};
pub use client::EmbeddingClient;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, OpenAiProvider};
pub use retry::RetryPolicy;

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// A vector of exactly the configured dimension
pub type EmbeddingVector = Vec<f32>;

/// Create the provider selected by the configuration
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                EmbeddingError::InitializationError(format!(
                    "Environment variable {} is not set",
                    config.api_key_env
                ))
            })?;
            Ok(Arc::new(OpenAiProvider::new(
                &config.api_base,
                &api_key,
                &config.model,
                config.dimension,
            )?))
        }
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unsupported embedding provider: {}",
            other
        ))),
    }
}

/// Build a client with the provider and retry policy from the configuration
pub fn client_from_config(config: &EmbeddingConfig) -> Result<EmbeddingClient, EmbeddingError> {
    let provider = provider_from_config(config)?;
    Ok(EmbeddingClient::new(
        provider,
        config.dimension,
        RetryPolicy::from_config(config),
    ))
}
