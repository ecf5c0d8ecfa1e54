/// Throttled bulk embedding
use super::{EmbeddingClient, EmbeddingError, EmbeddingVector};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Spaces requests to stay under a requests-per-minute ceiling
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    /// `requests_per_minute == 0` disables throttling
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / requests_per_minute
        };
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next request may be sent
    pub fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Embeds a whole column in chunks of `batch_size`, one request per chunk
///
/// The client does not rate-limit, so the throttle lives here.
pub struct BatchEmbedder<'a> {
    client: &'a EmbeddingClient,
    batch_size: usize,
    throttle: Throttle,
}

impl<'a> BatchEmbedder<'a> {
    pub fn new(client: &'a EmbeddingClient, batch_size: usize, requests_per_minute: u32) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
            throttle: Throttle::per_minute(requests_per_minute),
        }
    }

    /// Embed every text, in order
    ///
    /// Any chunk that exhausts its retries fails the whole call.
    pub fn embed_all(&mut self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let start = Instant::now();
        let total_chunks = texts.len().div_ceil(self.batch_size);

        info!(
            "Embedding {} texts in {} requests ({:?} between requests)",
            texts.len(),
            total_chunks,
            self.throttle.interval()
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for (i, chunk) in texts.chunks(self.batch_size).enumerate() {
            self.throttle.wait();
            let embedded = self.client.embed_batch(chunk)?;
            vectors.extend(embedded);
            debug!("Embedded chunk {}/{} ({} texts)", i + 1, total_chunks, chunk.len());
        }

        info!(
            "Embedded {} texts in {}ms",
            vectors.len(),
            start.elapsed().as_millis()
        );

        Ok(vectors)
    }
}
