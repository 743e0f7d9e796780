//! Maximal marginal relevance retrieval.

use ndarray::Array1;
use tracing::{debug, warn};

use crate::types::{MmrOptions, RetrievedChunk};
use edusage_core::Result;
use edusage_store::{SqliteStore, VectorCandidate};

/// Relevance multiplier for a chunk's priority boost.
pub fn priority_factor(priority_boost: u8) -> f32 {
    1.0 + 0.05 * (priority_boost.max(1) - 1) as f32
}

pub struct MmrRetriever;

impl MmrRetriever {
    /// Pick `k` passages out of the `fetch_k` nearest, trading relevance
    /// against similarity to what is already picked.
    pub fn search(
        store: &SqliteStore,
        query: &Array1<f32>,
        options: MmrOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        if options.k == 0 {
            return Ok(Vec::new());
        }
        let fetch_k = options.fetch_k.max(options.k);
        let candidates = store.vector_candidates(query, fetch_k)?;

        let mut pool = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match store.get_chunk(candidate.chunk_id)? {
                Some(chunk) => {
                    let relevance = candidate.similarity * priority_factor(chunk.priority_boost);
                    pool.push((candidate, chunk, relevance));
                }
                None => warn!("Embedding for missing chunk {}", candidate.chunk_id),
            }
        }

        let relevances: Vec<f32> = pool.iter().map(|(_, _, r)| *r).collect();
        let embeddings: Vec<&VectorCandidate> = pool.iter().map(|(c, _, _)| c).collect();
        let order = select(&relevances, &embeddings, options.k, options.diversity_lambda);
        debug!(
            "MMR selected {} of {} candidates (lambda {})",
            order.len(),
            pool.len(),
            options.diversity_lambda
        );

        let mut slots: Vec<Option<_>> = pool.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(|(_, chunk, relevance)| RetrievedChunk { chunk, relevance })
            .collect())
    }
}

/// Greedy MMR over candidate indices. Embeddings are unit length, so the dot
/// product is the cosine similarity.
fn select(
    relevances: &[f32],
    candidates: &[&VectorCandidate],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..relevances.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, &i) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&j| candidates[i].embedding.dot(&candidates[j].embedding))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
            let score = lambda * relevances[i] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }
        selected.push(remaining.remove(best_pos));
    }
    selected
}
