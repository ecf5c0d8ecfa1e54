//! Query engine
//!
//! Embeds free text and runs a similarity search against the collection of one
//! index configuration. Results keep the order the engine returns them in: closest
//! first, ties in engine-defined order.

use crate::builder::PROPERTY_FINGERPRINT;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::registry::IndexConfiguration;
use crate::store::{SearchRequest, StoreError, VectorStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Results returned when no `k` is given
pub const DEFAULT_TOP_K: usize = 5;

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Catalogue row id
    pub row_id: u64,
    /// Distance (L2) or similarity (IP, COSINE)
    pub score: f32,
    /// Truncated text stored with the vector
    pub stored_text: String,
}

/// Semantic search over built collections
pub struct QueryEngine<'a> {
    client: &'a EmbeddingClient,
    store: Arc<dyn VectorStore>,
}

impl<'a> QueryEngine<'a> {
    pub fn new(client: &'a EmbeddingClient, store: Arc<dyn VectorStore>) -> Self {
        Self { client, store }
    }

    /// Up to `k` results for `text` from the collection of `config`
    ///
    /// Fails with `CollectionNotFound` when the collection was never built. Empty text
    /// is embedded and searched like any other.
    pub fn query(&self, text: &str, config: &IndexConfiguration, k: usize) -> Result<Vec<SearchResult>> {
        let name = config.collection_name();

        // Check before paying for an embedding call
        if !self.store.has_collection(&name)? {
            return Err(StoreError::CollectionNotFound(name.to_string()).into());
        }
        self.store.load_collection(&name)?;

        let vector = self.client.embed(text)?;

        let hits = self.store.search(
            &name,
            &SearchRequest {
                vector: &vector,
                limit: k,
                metric: config.metric_type,
                params: &config.search_params,
            },
        )?;

        debug!("Query {:?} on {}: {} hits", text, name, hits.len());

        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                row_id: hit.id,
                score: hit.score,
                stored_text: hit.text,
            })
            .collect())
    }

    /// [`QueryEngine::query`] with [`DEFAULT_TOP_K`] results
    pub fn query_default(&self, text: &str, config: &IndexConfiguration) -> Result<Vec<SearchResult>> {
        self.query(text, config, DEFAULT_TOP_K)
    }

    /// Fingerprint of the catalogue the collection of `config` was built from
    pub fn built_from(&self, config: &IndexConfiguration) -> Result<Option<String>> {
        let info = self.store.describe_collection(&config.collection_name())?;
        Ok(info.schema.properties.get(PROPERTY_FINGERPRINT).cloned())
    }
}
