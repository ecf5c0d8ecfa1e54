//! Benchmark harness
//!
//! Runs sample queries against every index configuration and records latency and
//! results side by side. A failing (query, index) pair is recorded in the report and
//! the run continues.

use crate::catalogue::{Catalogue, DESCRIPTION_COLUMN, URL_COLUMN};
use crate::error::{ReelseekError, Result};
use crate::query::QueryEngine;
use crate::registry::IndexConfiguration;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// CSV header, in `BenchmarkRow` field order
pub const REPORT_COLUMNS: [&str; 11] = [
    "id",
    "score",
    "embedded_field",
    "URL",
    "Title",
    "Description",
    "search_query",
    "index_type",
    "metric_type",
    "delta_time_query",
    "error",
];

/// One report line per (query, index, result); failures get one line with `error` set
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRow {
    pub id: Option<u64>,
    pub score: Option<f32>,
    pub embedded_field: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Description")]
    pub description: String,
    pub search_query: String,
    pub index_type: String,
    pub metric_type: String,
    /// Seconds spent in the query call
    pub delta_time_query: f64,
    pub error: String,
}

/// Outcome of one (query, index) pair
#[derive(Debug, Clone, Serialize)]
pub struct PairOutcome {
    pub search_query: String,
    pub index: String,
    pub hits: usize,
    pub delta_time_query: f64,
    pub error: Option<String>,
}

/// Per-index latency summary
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub index: String,
    pub queries: usize,
    pub failures: usize,
    pub mean_seconds: f64,
    pub max_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<BenchmarkRow>,
    pub pairs: Vec<PairOutcome>,
}

impl BenchmarkReport {
    pub fn failures(&self) -> impl Iterator<Item = &PairOutcome> {
        self.pairs.iter().filter(|p| p.error.is_some())
    }

    /// Latency per index, in first-seen order
    pub fn summary(&self) -> Vec<IndexSummary> {
        let mut summaries: Vec<IndexSummary> = Vec::new();
        for pair in &self.pairs {
            let position = match summaries.iter().position(|s| s.index == pair.index) {
                Some(position) => position,
                None => {
                    summaries.push(IndexSummary {
                        index: pair.index.clone(),
                        queries: 0,
                        failures: 0,
                        mean_seconds: 0.0,
                        max_seconds: 0.0,
                    });
                    summaries.len() - 1
                }
            };
            let summary = &mut summaries[position];
            summary.queries += 1;
            if pair.error.is_some() {
                summary.failures += 1;
            }
            summary.mean_seconds += pair.delta_time_query;
            summary.max_seconds = summary.max_seconds.max(pair.delta_time_query);
        }

        for summary in &mut summaries {
            if summary.queries > 0 {
                summary.mean_seconds /= summary.queries as f64;
            }
        }
        summaries
    }

    /// Write the rows as CSV
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let mut writer = csv::Writer::from_path(path)?;
        // serialize() only emits the header alongside the first row
        if self.rows.is_empty() {
            writer.write_record(REPORT_COLUMNS)?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(|e| ReelseekError::Io {
            source: e,
            context: format!("Failed to flush report: {:?}", path),
        })?;
        Ok(())
    }

    /// Write the whole report as JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let json = serde_json::to_string_pretty(self).map_err(|e| ReelseekError::Json {
            source: e,
            context: "Failed to serialize benchmark report".to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| ReelseekError::Io {
            source: e,
            context: format!("Failed to write report: {:?}", path),
        })
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ReelseekError::Io {
                source: e,
                context: format!("Failed to create report directory: {:?}", parent),
            })?;
        }
    }
    Ok(())
}

/// Compares index configurations on a fixed query set
pub struct BenchmarkHarness<'a> {
    engine: &'a QueryEngine<'a>,
    catalogue: &'a Catalogue,
    top_k: usize,
}

impl<'a> BenchmarkHarness<'a> {
    pub fn new(engine: &'a QueryEngine<'a>, catalogue: &'a Catalogue, top_k: usize) -> Self {
        Self {
            engine,
            catalogue,
            top_k,
        }
    }

    /// Time one query per (query, index) pair
    pub fn run<'c>(
        &self,
        sample_queries: &[String],
        configs: impl IntoIterator<Item = &'c IndexConfiguration> + Clone,
    ) -> BenchmarkReport {
        let mut rows = Vec::new();
        let mut pairs = Vec::new();

        for search_query in sample_queries {
            for config in configs.clone() {
                let start = Instant::now();
                let outcome = self.engine.query(search_query, config, self.top_k);
                let delta_time_query = start.elapsed().as_secs_f64();

                match outcome {
                    Ok(results) => {
                        info!(
                            "{:?} on {}: {} hits in {:.3}s",
                            search_query,
                            config.label(),
                            results.len(),
                            delta_time_query
                        );
                        pairs.push(PairOutcome {
                            search_query: search_query.clone(),
                            index: config.label(),
                            hits: results.len(),
                            delta_time_query,
                            error: None,
                        });

                        for result in results {
                            let row = self.catalogue.row(result.row_id);
                            rows.push(BenchmarkRow {
                                id: Some(result.row_id),
                                score: Some(result.score),
                                embedded_field: result.stored_text,
                                url: row.map(|r| r.get(URL_COLUMN).to_string()).unwrap_or_default(),
                                title: row.map(|r| r.title.clone()).unwrap_or_default(),
                                description: row
                                    .map(|r| r.get(DESCRIPTION_COLUMN).to_string())
                                    .unwrap_or_default(),
                                search_query: search_query.clone(),
                                index_type: config.index_type.to_string(),
                                metric_type: config.metric_type.to_string(),
                                delta_time_query,
                                error: String::new(),
                            });
                        }
                    }
                    Err(e) => {
                        warn!("{:?} on {} failed: {}", search_query, config.label(), e);
                        pairs.push(PairOutcome {
                            search_query: search_query.clone(),
                            index: config.label(),
                            hits: 0,
                            delta_time_query,
                            error: Some(e.to_string()),
                        });
                        rows.push(BenchmarkRow {
                            id: None,
                            score: None,
                            embedded_field: String::new(),
                            url: String::new(),
                            title: String::new(),
                            description: String::new(),
                            search_query: search_query.clone(),
                            index_type: config.index_type.to_string(),
                            metric_type: config.metric_type.to_string(),
                            delta_time_query,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        BenchmarkReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            rows,
            pairs,
        }
    }
}
