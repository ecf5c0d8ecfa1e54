//! Vector store interface
//!
//! The builder and the query engine only talk to the vector engine through
//! [`VectorStore`]. Collections are created, indexed, filled and dropped as a whole;
//! there is no update path.

mod ann;
mod embedded;

pub use ann::AnnIndex;
pub use embedded::EmbeddedStore;

use crate::registry::{CollectionName, IndexConfiguration, IndexParams, MetricType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Storage cap of the text field
pub const TEXT_FIELD_MAX_LENGTH: usize = 200;

/// Name of the integer primary key field
pub const PRIMARY_KEY_FIELD: &str = "id";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Collection {0} is not loaded")]
    NotLoaded(String),

    #[error("Collection {0} has no index")]
    NoIndex(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Metric mismatch: collection indexed with {index}, search requested {requested}")]
    MetricMismatch {
        index: MetricType,
        requested: MetricType,
    },

    #[error("Text for id {id} is {length} characters, field allows {max}")]
    TextTooLong { id: u64, length: usize, max: usize },

    #[error("Invalid index parameter {key}: {message}")]
    InvalidParam { key: String, message: String },

    #[error("Corrupt collection {collection}: {message}")]
    Corrupt { collection: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}

/// Field layout of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: CollectionName,
    /// Integer primary key, equal to the catalogue row id
    pub primary_key: String,
    /// Varchar field holding a truncated copy of the embedded text
    pub text_field: String,
    pub text_max_length: usize,
    /// Float vector field
    pub vector_field: String,
    pub dimension: usize,
    /// Free-form collection metadata
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CollectionSchema {
    pub fn new(name: CollectionName, text_field: &str, dimension: usize) -> Self {
        let vector_field = name.to_string();
        Self {
            name,
            primary_key: PRIMARY_KEY_FIELD.to_string(),
            text_field: text_field.to_string(),
            text_max_length: TEXT_FIELD_MAX_LENGTH,
            vector_field,
            dimension,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// One row of a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u64,
    pub text: String,
    pub vector: Vec<f32>,
}

/// Nearest-neighbour query against a loaded collection
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub vector: &'a [f32],
    pub limit: usize,
    pub metric: MetricType,
    pub params: &'a IndexParams,
}

/// Raw hit returned by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub id: u64,
    pub score: f32,
    pub text: String,
}

/// Summary of a stored collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub schema: CollectionSchema,
    pub index: Option<IndexConfiguration>,
    pub count: u64,
    pub created_at: String,
}

/// Narrow interface to the vector engine
pub trait VectorStore: Send + Sync {
    fn has_collection(&self, name: &CollectionName) -> Result<bool, StoreError>;

    fn describe_collection(&self, name: &CollectionName) -> Result<CollectionInfo, StoreError>;

    fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError>;

    /// Drop a collection and its rows; dropping a missing collection is a no-op
    fn drop_collection(&self, name: &CollectionName) -> Result<(), StoreError>;

    /// Create an empty collection, failing if it already exists
    fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError>;

    /// Declare the similarity index on the vector field
    fn create_index(
        &self,
        name: &CollectionName,
        config: &IndexConfiguration,
    ) -> Result<(), StoreError>;

    /// Insert entities, returning how many were written
    fn insert(&self, name: &CollectionName, entities: &[Entity]) -> Result<usize, StoreError>;

    fn count(&self, name: &CollectionName) -> Result<u64, StoreError>;

    /// Bring a collection into memory so it can be searched
    fn load_collection(&self, name: &CollectionName) -> Result<(), StoreError>;

    /// Search a loaded collection
    fn search(
        &self,
        name: &CollectionName,
        request: &SearchRequest<'_>,
    ) -> Result<Vec<Hit>, StoreError>;
}
