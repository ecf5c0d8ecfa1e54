/// Vector store persistence across connections
mod common;

use common::{catalogue, client, FESTIVAL, TEXT_FIELD};
use reelseek::builder::{IndexBuilder, PROPERTY_FINGERPRINT};
use reelseek::query::QueryEngine;
use reelseek::registry::{IndexConfiguration, IndexRegistry, IndexType, MetricType};
use reelseek::store::{EmbeddedStore, VectorStore};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_collections_survive_reconnect() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("store").join("vectors.db");

    let catalogue = catalogue(FESTIVAL);
    let (client, _) = client();
    let config = IndexConfiguration::new(IndexType::Hnsw, MetricType::Cosine)
        .with_param("M", 8)
        .with_search_param("ef", 32);
    let registry = IndexRegistry::new(vec![config.clone()]).unwrap();

    {
        let store = Arc::new(EmbeddedStore::connect(&db_path).expect("Failed to connect"));
        IndexBuilder::new(&client, store.clone(), 4, 0)
            .build(&catalogue, TEXT_FIELD, &registry)
            .unwrap();
        if let Ok(store) = Arc::try_unwrap(store) {
            store.disconnect();
        }
    }
    assert!(db_path.exists(), "Database file should exist");

    let store = Arc::new(EmbeddedStore::connect(&db_path).unwrap());
    let name = config.collection_name();

    let info = store.describe_collection(&name).unwrap();
    assert_eq!(info.count, 5);
    assert_eq!(info.index.as_ref(), Some(&config));
    assert_eq!(info.schema.dimension, common::DIMENSION);
    assert_eq!(
        info.schema.properties.get(PROPERTY_FINGERPRINT).map(String::as_str),
        Some(catalogue.fingerprint())
    );

    let engine = QueryEngine::new(&client, store.clone());
    assert_eq!(engine.built_from(&config).unwrap().as_deref(), Some(catalogue.fingerprint()));

    let results = engine.query("robots on a planet", &config, 2).unwrap();
    assert_eq!(results[0].row_id, 2);
    assert!(results[0].stored_text.chars().count() <= 50);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_changed_catalogue_has_new_fingerprint() {
    let original = catalogue(FESTIVAL);
    let edited = catalogue(&FESTIVAL.replace("robots", "androids"));

    assert_ne!(original.fingerprint(), edited.fingerprint());
    assert_eq!(original.fingerprint(), catalogue(FESTIVAL).fingerprint());
}
