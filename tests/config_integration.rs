/// Configuration files on disk
use reelseek::config::Config;
use reelseek::registry::{IndexType, MetricType};
use reelseek::ReelseekError;
use tempfile::TempDir;

#[test]
fn test_load_handwritten_config() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[_meta]
schema_version = "1.0.0"

[catalogue]
path = "data/etrange_festival_2023.csv"
text_field = "Description_movie_full"

[embedding]
provider = "fastembed"
model = "all-MiniLM-L6-v2"
api_base = ""
api_key_env = "OPENAI_API_KEY"
dimension = 384
batch_size = 32
requests_per_minute = 0
max_retries = 2
backoff_secs = 5

[store]
path = "data/vectors.db"
default_top_k = 10

[benchmark]
queries = ["ghost story"]
output = "data/search_results.csv"
top_k = 3

[[indexes]]
index_type = "HNSW"
metric_type = "COSINE"
params = { M = 8, efConstruction = 64 }
search_params = { ef = 32 }

[[indexes]]
index_type = "FLAT"
metric_type = "IP"
"#,
    )
    .unwrap();

    let config = Config::load(&path).expect("Config should load");
    assert_eq!(config.embedding.dimension, 384);
    assert_eq!(config.store.default_top_k, 10);

    let registry = config.registry().unwrap();
    assert_eq!(registry.len(), 2);
    let hnsw = registry.find("HNSW_COSINE").unwrap();
    assert_eq!(hnsw.index_type, IndexType::Hnsw);
    assert_eq!(hnsw.metric_type, MetricType::Cosine);
    assert_eq!(hnsw.collection_name().as_str(), "embedded_field_HNSW_COSINE");
    assert!(registry.find("embedded_field_FLAT_IP").is_some());
}

#[test]
fn test_missing_config_file() {
    let temp = TempDir::new().unwrap();
    let err = Config::load(&temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ReelseekError::ConfigNotFound { .. }));
}

#[test]
fn test_invalid_config_reports_all_problems() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");

    let mut config = Config::default();
    config.embedding.provider = "word2vec".to_string();
    config.store.default_top_k = 0;
    std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

    match Config::load(&path) {
        Err(ReelseekError::ConfigValidation { errors }) => {
            let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
            assert!(paths.contains(&"embedding.provider"));
            assert!(paths.contains(&"store.default_top_k"));
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}
