/// In-memory similarity structures
use super::StoreError;
use crate::registry::{IndexConfiguration, IndexParams, IndexType, MetricType};
use hnsw_rs::prelude::*;
use kmeans::{EuclideanDistance, KMeans, KMeansConfig};
use std::cmp::Ordering;

const DEFAULT_NLIST: usize = 128;
const DEFAULT_NPROBE: usize = 16;
const KMEANS_ITERATIONS: usize = 8;

const DEFAULT_HNSW_M: usize = 16;
const DEFAULT_HNSW_EF_CONSTRUCTION: usize = 200;
const DEFAULT_HNSW_EF_SEARCH: usize = 64;
const HNSW_MAX_LAYER: usize = 16;

/// Score of `b` against `a` under `metric`
pub fn score(metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        MetricType::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        MetricType::IP => dot(a, b),
        MetricType::Cosine => {
            let norm_a = norm(a);
            let norm_b = norm(b);
            if norm_a == 0.0 || norm_b == 0.0 {
                return 0.0;
            }
            dot(a, b) / (norm_a * norm_b)
        }
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Closest-first comparison of two scores
fn closer(metric: MetricType, a: f32, b: f32) -> Ordering {
    let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    if metric.higher_is_closer() {
        ord.reverse()
    } else {
        ord
    }
}

/// Read a positive integer parameter, accepting numbers and numeric strings
pub fn param_usize(params: &IndexParams, key: &str, default: usize) -> Result<usize, StoreError> {
    let Some(value) = params.get(key) else {
        return Ok(default);
    };

    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };

    match parsed {
        Some(n) if n > 0 => Ok(n),
        _ => Err(StoreError::InvalidParam {
            key: key.to_string(),
            message: format!("expected a positive integer, got {}", value),
        }),
    }
}

/// HNSW graphs only accept non-negative distances. Inner product search runs on an
/// L2 graph over vectors lifted by one coordinate, `sqrt(max_norm² - |x|²)`; the query
/// is lifted with 0, which makes L2 order equal to descending inner product.
enum HnswGraph {
    L2(Hnsw<'static, f32, DistL2>),
    Mips(Hnsw<'static, f32, DistL2>),
    Cosine(Hnsw<'static, f32, DistCosine>),
}

fn lift_for_mips(vectors: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let max_norm_sq = vectors.iter().map(|v| dot(v, v)).fold(0.0f32, f32::max);
    vectors
        .iter()
        .map(|v| {
            let mut lifted = Vec::with_capacity(v.len() + 1);
            lifted.extend_from_slice(v);
            lifted.push((max_norm_sq - dot(v, v)).max(0.0).sqrt());
            lifted
        })
        .collect()
}

/// Vectors kept alongside every structure for exact rescoring
struct Points {
    ids: Vec<u64>,
    vectors: Vec<Vec<f32>>,
}

impl Points {
    fn ranked(&self, metric: MetricType, query: &[f32], candidates: impl Iterator<Item = usize>, k: usize) -> Vec<(u64, f32)> {
        let mut scored: Vec<(u64, f32)> = candidates
            .map(|i| (self.ids[i], score(metric, query, &self.vectors[i])))
            .collect();
        scored.sort_by(|a, b| closer(metric, a.1, b.1));
        scored.truncate(k);
        scored
    }
}

enum Structure {
    Flat,
    IvfFlat {
        centroids: Vec<Vec<f32>>,
        lists: Vec<Vec<usize>>,
    },
    Hnsw(HnswGraph),
}

/// Similarity index over one collection's vectors
pub struct AnnIndex {
    index_type: IndexType,
    metric: MetricType,
    dimension: usize,
    points: Points,
    structure: Structure,
}

impl AnnIndex {
    /// Build the structure described by `config` over `entries`
    pub fn build(
        config: &IndexConfiguration,
        dimension: usize,
        entries: Vec<(u64, Vec<f32>)>,
    ) -> Result<Self, StoreError> {
        for (_, vector) in &entries {
            if vector.len() != dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        let (ids, vectors): (Vec<u64>, Vec<Vec<f32>>) = entries.into_iter().unzip();
        let points = Points { ids, vectors };
        let metric = config.metric_type;

        let structure = match config.index_type {
            IndexType::Flat => Structure::Flat,
            IndexType::IvfFlat => {
                let nlist = param_usize(&config.params, "nlist", DEFAULT_NLIST)?;
                let (centroids, lists) = train_ivf(metric, &points.vectors, nlist);
                Structure::IvfFlat { centroids, lists }
            }
            IndexType::Hnsw => {
                let m = param_usize(&config.params, "M", DEFAULT_HNSW_M)?;
                let ef_construction =
                    param_usize(&config.params, "efConstruction", DEFAULT_HNSW_EF_CONSTRUCTION)?;
                Structure::Hnsw(build_hnsw(metric, &points, m, ef_construction))
            }
        };

        tracing::debug!(
            "Built {} index over {} vectors ({})",
            config.index_type,
            points.ids.len(),
            metric
        );

        Ok(Self {
            index_type: config.index_type,
            metric,
            dimension,
            points,
            structure,
        })
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn metric(&self) -> MetricType {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.points.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.ids.is_empty()
    }

    /// Up to `k` `(id, score)` pairs, closest first
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        params: &IndexParams,
    ) -> Result<Vec<(u64, f32)>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let results = match &self.structure {
            Structure::Flat => self.points.ranked(self.metric, query, 0..self.len(), k),
            Structure::IvfFlat { centroids, lists } => {
                let nprobe = param_usize(params, "nprobe", DEFAULT_NPROBE)?;
                let mut order: Vec<(usize, f32)> = centroids
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, score(self.metric, query, c)))
                    .collect();
                order.sort_by(|a, b| closer(self.metric, a.1, b.1));

                let candidates = order
                    .iter()
                    .take(nprobe)
                    .flat_map(|(list, _)| lists[*list].iter().copied());
                self.points.ranked(self.metric, query, candidates, k)
            }
            Structure::Hnsw(graph) => {
                let ef = param_usize(params, "ef", DEFAULT_HNSW_EF_SEARCH)?.max(k);
                let neighbours = match graph {
                    HnswGraph::L2(h) => h.search(query, k, ef),
                    HnswGraph::Mips(h) => {
                        let mut lifted = query.to_vec();
                        lifted.push(0.0);
                        h.search(&lifted, k, ef)
                    }
                    HnswGraph::Cosine(h) => h.search(query, k, ef),
                };
                self.points
                    .ranked(self.metric, query, neighbours.into_iter().map(|n| n.d_id), k)
            }
        };

        Ok(results)
    }
}

fn build_hnsw(metric: MetricType, points: &Points, m: usize, ef_construction: usize) -> HnswGraph {
    let max_elements = points.ids.len().max(1);

    // Graph ids are positions in `points`, mapped back to row ids after search
    match metric {
        MetricType::L2 => {
            let graph = Hnsw::<f32, DistL2>::new(m, max_elements, HNSW_MAX_LAYER, ef_construction, DistL2);
            for (position, vector) in points.vectors.iter().enumerate() {
                graph.insert((vector, position));
            }
            HnswGraph::L2(graph)
        }
        MetricType::IP => {
            let graph = Hnsw::<f32, DistL2>::new(m, max_elements, HNSW_MAX_LAYER, ef_construction, DistL2);
            for (position, vector) in lift_for_mips(&points.vectors).iter().enumerate() {
                graph.insert((vector, position));
            }
            HnswGraph::Mips(graph)
        }
        MetricType::Cosine => {
            let graph = Hnsw::<f32, DistCosine>::new(m, max_elements, HNSW_MAX_LAYER, ef_construction, DistCosine);
            for (position, vector) in points.vectors.iter().enumerate() {
                graph.insert((vector, position));
            }
            HnswGraph::Cosine(graph)
        }
    }
}

/// Coarse quantizer: Lloyd's k-means, then every vector filed under its nearest
/// centroid as seen by `metric` at probe time
fn train_ivf(metric: MetricType, vectors: &[Vec<f32>], nlist: usize) -> (Vec<Vec<f32>>, Vec<Vec<usize>>) {
    let nlist = nlist.min(vectors.len());
    let dimension = vectors.first().map_or(0, Vec::len);
    if nlist == 0 || dimension == 0 {
        return (Vec::new(), Vec::new());
    }

    let samples: Vec<f32> = vectors.iter().flatten().copied().collect();
    let km: KMeans<_, 8, _> = KMeans::new(&samples, vectors.len(), dimension, EuclideanDistance);
    let state = km.kmeans_lloyd(
        nlist,
        KMEANS_ITERATIONS,
        KMeans::init_random_partition,
        &KMeansConfig::default(),
    );

    // Clusters left empty come back without a usable centroid
    let centroids: Vec<Vec<f32>> = state
        .centroids
        .to_vec()
        .chunks(dimension)
        .filter(|c| c.iter().all(|x| x.is_finite()))
        .map(|c| c.to_vec())
        .collect();
    if centroids.is_empty() {
        return (vec![vectors[0].clone()], vec![(0..vectors.len()).collect()]);
    }

    let lists = assign(metric, vectors, &centroids);
    (centroids, lists)
}

fn assign(metric: MetricType, vectors: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<Vec<usize>> {
    let mut lists = vec![Vec::new(); centroids.len()];
    for (i, vector) in vectors.iter().enumerate() {
        let nearest = centroids
            .iter()
            .enumerate()
            .min_by(|a, b| {
                closer(metric, score(metric, vector, a.1), score(metric, vector, b.1))
            })
            .map(|(c, _)| c)
            .unwrap_or(0);
        lists[nearest].push(i);
    }
    lists
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dimension: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[axis] = 1.0;
        v
    }

    fn sample() -> Vec<(u64, Vec<f32>)> {
        (0..32u64)
            .map(|i| {
                let mut v = unit(8, (i % 8) as usize);
                v[((i + 1) % 8) as usize] = i as f32 / 64.0;
                (i, v)
            })
            .collect()
    }

    #[test]
    fn test_flat_l2_ranks_ascending() {
        let config = IndexConfiguration::new(IndexType::Flat, MetricType::L2);
        let index = AnnIndex::build(&config, 8, sample()).unwrap();

        let results = index.search(&unit(8, 3), 5, &IndexParams::new()).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(results[0].0 % 8, 3);
    }

    #[test]
    fn test_flat_ip_ranks_descending() {
        let config = IndexConfiguration::new(IndexType::Flat, MetricType::IP);
        let index = AnnIndex::build(&config, 8, sample()).unwrap();

        let results = index.search(&unit(8, 2), 4, &IndexParams::new()).unwrap();
        assert!(results.windows(2).all(|w| w[0].1 >= w[1].1));
        assert_eq!(results[0].0 % 8, 2);
    }

    #[test]
    fn test_ivf_finds_exact_match() {
        let config =
            IndexConfiguration::new(IndexType::IvfFlat, MetricType::L2).with_param("nlist", 1024);
        let entries = sample();
        let target = entries[13].1.clone();
        let index = AnnIndex::build(&config, 8, entries).unwrap();

        let results = index.search(&target, 3, &IndexParams::new()).unwrap();
        assert_eq!(results[0].0, 13);
        assert!(results[0].1 < 1e-6);
    }

    #[test]
    fn test_hnsw_finds_exact_match() {
        let config = IndexConfiguration::new(IndexType::Hnsw, MetricType::L2)
            .with_param("M", 4)
            .with_param("efConstruction", 16);
        let entries = sample();
        let target = entries[21].1.clone();
        let index = AnnIndex::build(&config, 8, entries).unwrap();

        let results = index.search(&target, 5, &IndexParams::new()).unwrap();
        assert!(results.len() <= 5);
        assert_eq!(results[0].0, 21);
        assert!(results.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    fn correlated(count: usize) -> Vec<(u64, Vec<f32>)> {
        (0..count as u64)
            .map(|i| {
                let t = i as f32 / count as f32;
                (i, vec![1.0 + t, 0.5 + t * t, 2.0 - t, 0.25 + (i % 7) as f32 / 7.0])
            })
            .collect()
    }

    #[test]
    fn test_hnsw_inner_product_over_positive_vectors() {
        let entries = correlated(300);
        let flat = AnnIndex::build(
            &IndexConfiguration::new(IndexType::Flat, MetricType::IP),
            4,
            entries.clone(),
        )
        .unwrap();
        let hnsw = AnnIndex::build(
            &IndexConfiguration::new(IndexType::Hnsw, MetricType::IP)
                .with_param("M", 4)
                .with_param("efConstruction", 16),
            4,
            entries,
        )
        .unwrap();

        let query = [2.0, 1.0, 0.5, 1.0];
        let mut params = IndexParams::new();
        params.insert("ef".into(), serde_json::json!(200));
        let expected = flat.search(&query, 5, &params).unwrap();
        let results = hnsw.search(&query, 5, &params).unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(results[0].0, expected[0].0);
        assert!(results.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_ivf_lists_cover_every_vector() {
        let entries = correlated(64);
        let vectors: Vec<Vec<f32>> = entries.iter().map(|(_, v)| v.clone()).collect();
        let (centroids, lists) = train_ivf(MetricType::L2, &vectors, 8);

        assert!(!centroids.is_empty() && centroids.len() <= 8);
        assert!(centroids.iter().all(|c| c.len() == 4));
        let mut members: Vec<usize> = lists.into_iter().flatten().collect();
        members.sort_unstable();
        assert_eq!(members, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        for (index_type, metric) in [
            (IndexType::Flat, MetricType::L2),
            (IndexType::IvfFlat, MetricType::L2),
            (IndexType::Hnsw, MetricType::L2),
            (IndexType::Hnsw, MetricType::IP),
        ] {
            let config = IndexConfiguration::new(index_type, metric);
            let index = AnnIndex::build(&config, 8, Vec::new()).unwrap();
            assert!(index.search(&unit(8, 0), 5, &IndexParams::new()).unwrap().is_empty());
        }
    }

    #[test]
    fn test_dimension_validation() {
        let config = IndexConfiguration::new(IndexType::Flat, MetricType::L2);
        let result = AnnIndex::build(&config, 8, vec![(0, vec![1.0; 4])]);
        assert!(matches!(
            result,
            Err(StoreError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));

        let index = AnnIndex::build(&config, 8, sample()).unwrap();
        assert!(index.search(&[1.0; 3], 1, &IndexParams::new()).is_err());
    }

    #[test]
    fn test_invalid_param() {
        let config =
            IndexConfiguration::new(IndexType::IvfFlat, MetricType::L2).with_param("nlist", "many");
        assert!(matches!(
            AnnIndex::build(&config, 8, sample()),
            Err(StoreError::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_param_usize_accepts_strings() {
        let mut params = IndexParams::new();
        params.insert("nprobe".into(), serde_json::json!("32"));
        assert_eq!(param_usize(&params, "nprobe", 1).unwrap(), 32);
        assert_eq!(param_usize(&params, "ef", 7).unwrap(), 7);
    }

    #[test]
    fn test_cosine_score() {
        assert!((score(MetricType::Cosine, &[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(score(MetricType::Cosine, &[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(score(MetricType::L2, &[1.0, 0.0], &[0.0, 1.0]), 2.0);
    }
}
