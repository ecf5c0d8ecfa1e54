//! Shared fixtures for integration tests
#![allow(dead_code)]

use reelseek::catalogue::Catalogue;
use reelseek::embedding::{EmbeddingClient, EmbeddingError, EmbeddingProvider, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DIMENSION: usize = 256;
pub const TEXT_FIELD: &str = "Description_movie_full";

/// Deterministic offline embedder: hashed character trigrams, L2-normalised
///
/// Texts sharing words land close together, which is all the ranking tests need.
pub struct TrigramProvider {
    pub requests: AtomicUsize,
}

impl TrigramProvider {
    pub fn new() -> Self {
        Self {
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMENSION];
        for word in text.to_lowercase().split_whitespace() {
            let padded: Vec<char> = std::iter::once(' ')
                .chain(word.chars())
                .chain(std::iter::once(' '))
                .collect();
            for window in padded.windows(3) {
                let gram: String = window.iter().collect();
                v[(fnv1a(gram.as_bytes()) % DIMENSION as u64) as usize] += 1.0;
            }
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl EmbeddingProvider for TrigramProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "trigram-hash"
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn client() -> (EmbeddingClient, Arc<TrigramProvider>) {
    let provider = Arc::new(TrigramProvider::new());
    let client = EmbeddingClient::new(provider.clone(), DIMENSION, RetryPolicy::immediate(0));
    (client, provider)
}

pub fn catalogue(csv: &str) -> Catalogue {
    Catalogue::from_reader(csv.as_bytes(), TEXT_FIELD).expect("Failed to parse catalogue")
}

pub const TWO_FILMS: &str = "\
Title,Description,URL,Description_movie_full
Ghosts,Horror,https://example.org/ghosts,a horror movie about ghosts
Love,Romance,https://example.org/love,a romantic comedy
";

pub const FESTIVAL: &str = "\
Title,Description,URL,Description_movie_full
The Haunting,Horror,https://example.org/1,a horror movie about ghosts and the haunted house
Paris Hearts,Romance,https://example.org/2,a romantic comedy set in paris
Red Dust,Science fiction,https://example.org/3,science fiction on a distant planet with robots
Velvet,Erotic,https://example.org/4,an erotic drama of desire
Reels,Documentary,https://example.org/5,a documentary about festival cinema
";
