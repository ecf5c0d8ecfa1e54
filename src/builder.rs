//! Index builder
//!
//! Rebuilds one collection per index configuration from a loaded catalogue. Every
//! build drops the previous collection first; a failed build leaves no collection
//! behind for that configuration.

use crate::catalogue::Catalogue;
use crate::embedding::{BatchEmbedder, EmbeddingClient, EmbeddingVector};
use crate::error::{ReelseekError, Result};
use crate::registry::{CollectionName, IndexConfiguration, IndexRegistry};
use crate::store::{CollectionSchema, Entity, VectorStore};
use ahash::AHashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Characters of embedded text kept in the collection, for inspection only
pub const STORED_TEXT_CHARS: usize = 50;

/// Rows written per insert call
const INSERT_CHUNK: usize = 512;

pub const PROPERTY_FINGERPRINT: &str = "catalogue_fingerprint";
pub const PROPERTY_MODEL: &str = "embedding_model";

/// Outcome of building one collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionBuild {
    pub collection: String,
    pub index: String,
    pub inserted: usize,
    pub duration_ms: u64,
}

/// Outcome of a build run
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub text_field: String,
    pub rows: usize,
    pub collections: Vec<CollectionBuild>,
    pub duration_ms: u64,
}

/// Builds similarity collections in the vector store
pub struct IndexBuilder<'a> {
    client: &'a EmbeddingClient,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    requests_per_minute: u32,
    /// Embeddings per (catalogue fingerprint, text field)
    cache: Mutex<AHashMap<(String, String), Arc<Vec<EmbeddingVector>>>>,
}

impl<'a> IndexBuilder<'a> {
    /// Create a builder
    ///
    /// # Arguments
    /// * `client` - Embedding client, its dimension becomes the collections' dimension
    /// * `store` - Vector store receiving the collections
    /// * `batch_size` - Texts per embedding request
    /// * `requests_per_minute` - Provider request ceiling (0 = unthrottled)
    pub fn new(
        client: &'a EmbeddingClient,
        store: Arc<dyn VectorStore>,
        batch_size: usize,
        requests_per_minute: u32,
    ) -> Self {
        Self {
            client,
            store,
            batch_size,
            requests_per_minute,
            cache: Mutex::new(AHashMap::new()),
        }
    }

    /// Build every configuration of `registry`, in order
    pub fn build(
        &self,
        catalogue: &Catalogue,
        text_field: &str,
        registry: &IndexRegistry,
    ) -> Result<BuildReport> {
        let start = Instant::now();

        if !catalogue.columns().iter().any(|c| c == text_field) {
            return Err(ReelseekError::MissingField {
                field: text_field.to_string(),
                available: catalogue.columns().to_vec(),
            });
        }

        info!(
            "Building {} collections over {} rows (field: {})",
            registry.len(),
            catalogue.len(),
            text_field
        );

        let vectors = self.embeddings(catalogue, text_field)?;
        self.check_dimensions(&vectors)?;

        let mut collections = Vec::with_capacity(registry.len());
        for (name, config) in registry.iter() {
            let built = self.build_collection(catalogue, text_field, name, config, &vectors)?;
            collections.push(built);
        }

        let report = BuildReport {
            text_field: text_field.to_string(),
            rows: catalogue.len(),
            collections,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Build complete: {} collections in {}ms",
            report.collections.len(),
            report.duration_ms
        );

        Ok(report)
    }

    /// Embeddings of `text_field` for every row, computed once per catalogue version
    fn embeddings(&self, catalogue: &Catalogue, text_field: &str) -> Result<Arc<Vec<EmbeddingVector>>> {
        let key = (catalogue.fingerprint().to_string(), text_field.to_string());

        if let Some(cached) = self.lock_cache()?.get(&key) {
            debug!("Reusing {} embeddings for field {}", cached.len(), text_field);
            return Ok(cached.clone());
        }

        let texts: Vec<String> = catalogue
            .rows()
            .iter()
            .map(|row| row.get(text_field).to_string())
            .collect();

        let mut embedder = BatchEmbedder::new(self.client, self.batch_size, self.requests_per_minute);
        let vectors = Arc::new(embedder.embed_all(&texts)?);

        self.lock_cache()?.insert(key, vectors.clone());
        Ok(vectors)
    }

    fn lock_cache(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, AHashMap<(String, String), Arc<Vec<EmbeddingVector>>>>> {
        self.cache
            .lock()
            .map_err(|_| ReelseekError::Other(anyhow::anyhow!("embedding cache lock poisoned")))
    }

    fn check_dimensions(&self, vectors: &[EmbeddingVector]) -> Result<()> {
        let expected = self.client.dimension();
        for (row_id, vector) in vectors.iter().enumerate() {
            if vector.len() != expected {
                return Err(ReelseekError::DimensionMismatch {
                    row_id: row_id as u64,
                    expected,
                    actual: vector.len(),
                });
            }
        }
        Ok(())
    }

    fn build_collection(
        &self,
        catalogue: &Catalogue,
        text_field: &str,
        name: &CollectionName,
        config: &IndexConfiguration,
        vectors: &[EmbeddingVector],
    ) -> Result<CollectionBuild> {
        let start = Instant::now();

        self.store.drop_collection(name)?;

        let schema = CollectionSchema::new(name.clone(), text_field, self.client.dimension())
            .with_property(PROPERTY_FINGERPRINT, catalogue.fingerprint())
            .with_property(PROPERTY_MODEL, self.client.model_name());
        self.store.create_collection(&schema)?;

        let inserted = match self.populate(catalogue, text_field, name, config, vectors) {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!("Build of {} failed, dropping partial collection: {}", name, e);
                if let Err(drop_err) = self.store.drop_collection(name) {
                    warn!("Failed to drop partial collection {}: {}", name, drop_err);
                }
                return Err(e);
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Built {} ({}): {} rows in {}ms",
            name,
            config.label(),
            inserted,
            duration_ms
        );

        Ok(CollectionBuild {
            collection: name.to_string(),
            index: config.label(),
            inserted,
            duration_ms,
        })
    }

    fn populate(
        &self,
        catalogue: &Catalogue,
        text_field: &str,
        name: &CollectionName,
        config: &IndexConfiguration,
        vectors: &[EmbeddingVector],
    ) -> Result<usize> {
        self.store.create_index(name, config)?;

        let entities: Vec<Entity> = catalogue
            .rows()
            .iter()
            .zip(vectors)
            .map(|(row, vector)| Entity {
                id: row.id,
                text: truncate_chars(row.get(text_field), STORED_TEXT_CHARS),
                vector: vector.clone(),
            })
            .collect();

        let mut inserted = 0;
        for chunk in entities.chunks(INSERT_CHUNK) {
            inserted += self.store.insert(name, chunk)?;
            debug!("Inserted {}/{} rows into {}", inserted, entities.len(), name);
        }

        Ok(inserted)
    }
}

/// First `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
