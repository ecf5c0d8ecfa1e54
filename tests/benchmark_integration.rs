/// Benchmark harness over a built store
mod common;

use common::{catalogue, client, FESTIVAL, TEXT_FIELD};
use reelseek::benchmark::BenchmarkHarness;
use reelseek::builder::IndexBuilder;
use reelseek::query::QueryEngine;
use reelseek::registry::{IndexConfiguration, IndexRegistry, IndexType, MetricType};
use reelseek::store::{EmbeddedStore, VectorStore};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_benchmark_reports_every_pair() {
    let catalogue = catalogue(FESTIVAL);
    let (client, _) = client();
    let store: Arc<dyn VectorStore> = Arc::new(EmbeddedStore::in_memory().unwrap());

    let built = IndexRegistry::new(vec![
        IndexConfiguration::new(IndexType::IvfFlat, MetricType::L2).with_param("nlist", 1024),
        IndexConfiguration::new(IndexType::Hnsw, MetricType::L2)
            .with_param("M", 4)
            .with_param("efConstruction", 16),
    ])
    .unwrap();
    IndexBuilder::new(&client, store.clone(), 16, 0)
        .build(&catalogue, TEXT_FIELD, &built)
        .unwrap();

    // Never built: its pairs must be reported, not abort the run
    let unbuilt = IndexConfiguration::new(IndexType::Flat, MetricType::IP);

    let engine = QueryEngine::new(&client, store);
    let harness = BenchmarkHarness::new(&engine, &catalogue, 3);
    let queries = vec![
        "film d'horreur".to_string(),
        "film érotique".to_string(),
        "film de science-fiction".to_string(),
    ];
    let configs: Vec<&IndexConfiguration> = built.configs().chain(std::iter::once(&unbuilt)).collect();
    let report = harness.run(&queries, configs.iter().copied());

    assert_eq!(report.pairs.len(), 9);
    assert_eq!(report.failures().count(), 3);
    assert!(report.failures().all(|p| p.index == "FLAT_IP"));

    let answered: Vec<_> = report.rows.iter().filter(|r| r.error.is_empty()).collect();
    assert_eq!(answered.len(), 3 * 2 * 3);
    for row in &answered {
        let id = row.id.unwrap();
        assert!((id as usize) < catalogue.len());
        assert_eq!(row.title, catalogue.row(id).unwrap().title);
        assert!(row.delta_time_query >= 0.0);
    }

    let temp = TempDir::new().unwrap();
    let output = temp.path().join("search_results.csv");
    report.write_csv(&output).unwrap();

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.len(), 11);
    assert_eq!(&headers[9], "delta_time_query");
    assert_eq!(reader.records().count(), report.rows.len());
}
