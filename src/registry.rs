//! Index configurations and their collection identities
//!
//! Every similarity-search strategy is described by an [`IndexConfiguration`]. The
//! collection it lives in is derived from `(index_type, metric_type)` only, so the
//! [`IndexRegistry`] rejects two configurations that would share a collection before
//! anything touches the vector store.

use crate::error::{ReelseekError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix shared by every collection the builder creates
pub const COLLECTION_PREFIX: &str = "embedded_field_";

/// Opaque parameters handed to the vector engine
pub type IndexParams = BTreeMap<String, serde_json::Value>;

/// Similarity index structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Exhaustive scan
    #[serde(rename = "FLAT")]
    Flat,
    /// Inverted file over coarse partitions, exact distances within a partition
    #[serde(rename = "IVF_FLAT")]
    IvfFlat,
    /// Hierarchical navigable small-world graph
    #[serde(rename = "HNSW")]
    Hnsw,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Flat => "FLAT",
            IndexType::IvfFlat => "IVF_FLAT",
            IndexType::Hnsw => "HNSW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FLAT" => Some(IndexType::Flat),
            "IVF_FLAT" => Some(IndexType::IvfFlat),
            "HNSW" => Some(IndexType::Hnsw),
            _ => None,
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance or similarity function used for ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    /// Squared euclidean distance, lower is closer
    L2,
    /// Inner product, higher is closer
    IP,
    /// Cosine similarity, higher is closer
    #[serde(rename = "COSINE")]
    Cosine,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::IP => "IP",
            MetricType::Cosine => "COSINE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Some(MetricType::L2),
            "IP" => Some(MetricType::IP),
            "COSINE" => Some(MetricType::Cosine),
            _ => None,
        }
    }

    /// True for similarity metrics (results sorted descending)
    pub fn higher_is_closer(&self) -> bool {
        !matches!(self, MetricType::L2)
    }

    /// Whether score `a` ranks at or before score `b`
    pub fn ranks_before(&self, a: f32, b: f32) -> bool {
        if self.higher_is_closer() {
            a >= b
        } else {
            a <= b
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a collection in the vector store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionName(String);

impl CollectionName {
    pub fn for_index(index_type: IndexType, metric_type: MetricType) -> Self {
        Self(format!(
            "{}{}_{}",
            COLLECTION_PREFIX,
            index_type.as_str(),
            metric_type.as_str()
        ))
    }

    /// Name read back from the vector store
    pub(crate) fn from_stored(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One similarity-search strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfiguration {
    pub index_type: IndexType,
    pub metric_type: MetricType,
    /// Build parameters, e.g. `nlist` or `M`/`efConstruction`
    #[serde(default)]
    pub params: IndexParams,
    /// Search-time parameters, e.g. `nprobe` or `ef`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub search_params: IndexParams,
}

impl IndexConfiguration {
    pub fn new(index_type: IndexType, metric_type: MetricType) -> Self {
        Self {
            index_type,
            metric_type,
            params: IndexParams::new(),
            search_params: IndexParams::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_search_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.search_params.insert(key.to_string(), value.into());
        self
    }

    pub fn collection_name(&self) -> CollectionName {
        CollectionName::for_index(self.index_type, self.metric_type)
    }

    /// Short label such as `HNSW_L2`, used on the command line
    pub fn label(&self) -> String {
        format!("{}_{}", self.index_type, self.metric_type)
    }
}

/// Index configurations keyed by collection identity
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    entries: Vec<(CollectionName, IndexConfiguration)>,
}

impl IndexRegistry {
    /// Build a registry, rejecting configurations whose collections collide
    pub fn new(configs: impl IntoIterator<Item = IndexConfiguration>) -> Result<Self> {
        let mut entries: Vec<(CollectionName, IndexConfiguration)> = Vec::new();
        for config in configs {
            let name = config.collection_name();
            if entries.iter().any(|(existing, _)| existing == &name) {
                return Err(ReelseekError::DuplicateCollection(name.to_string()));
            }
            entries.push((name, config));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configurations in declaration order
    pub fn configs(&self) -> impl Iterator<Item = &IndexConfiguration> {
        self.entries.iter().map(|(_, config)| config)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CollectionName, &IndexConfiguration)> {
        self.entries.iter().map(|(name, config)| (name, config))
    }

    /// Find a configuration by its label (`HNSW_L2`) or full collection name
    pub fn find(&self, key: &str) -> Option<&IndexConfiguration> {
        self.entries
            .iter()
            .find(|(name, config)| {
                config.label().eq_ignore_ascii_case(key) || name.as_str() == key
            })
            .map(|(_, config)| config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_format() {
        let config = IndexConfiguration::new(IndexType::IvfFlat, MetricType::L2);
        assert_eq!(config.collection_name().as_str(), "embedded_field_IVF_FLAT_L2");

        let config = IndexConfiguration::new(IndexType::Hnsw, MetricType::Cosine);
        assert_eq!(config.collection_name().as_str(), "embedded_field_HNSW_COSINE");
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let a = IndexConfiguration::new(IndexType::Hnsw, MetricType::L2).with_param("M", 4);
        let b = IndexConfiguration::new(IndexType::Hnsw, MetricType::L2).with_param("M", 16);

        let result = IndexRegistry::new(vec![a, b]);
        assert!(matches!(
            result,
            Err(ReelseekError::DuplicateCollection(name)) if name == "embedded_field_HNSW_L2"
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = IndexRegistry::new(vec![
            IndexConfiguration::new(IndexType::IvfFlat, MetricType::L2),
            IndexConfiguration::new(IndexType::Hnsw, MetricType::IP),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find("hnsw_ip").unwrap().index_type, IndexType::Hnsw);
        assert!(registry.find("embedded_field_IVF_FLAT_L2").is_some());
        assert!(registry.find("FLAT_L2").is_none());
    }

    #[test]
    fn test_metric_ordering() {
        assert!(MetricType::L2.ranks_before(0.1, 0.5));
        assert!(!MetricType::L2.ranks_before(0.5, 0.1));
        assert!(MetricType::IP.ranks_before(0.9, 0.2));
        assert!(MetricType::Cosine.higher_is_closer());
    }

    #[test]
    fn test_config_deserializes_from_toml() {
        let config: IndexConfiguration = toml::from_str(
            r#"
            index_type = "HNSW"
            metric_type = "L2"
            params = { M = 4, efConstruction = 16 }
            "#,
        )
        .unwrap();

        assert_eq!(config.index_type, IndexType::Hnsw);
        assert_eq!(config.params.get("M"), Some(&serde_json::json!(4)));
        assert!(config.search_params.is_empty());
    }
}
