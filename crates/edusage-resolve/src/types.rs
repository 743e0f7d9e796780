//! Resolver types.

use edusage_store::KnowledgeChunk;
use serde::{Deserialize, Serialize};

/// MMR search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MmrOptions {
    /// Passages returned.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Vector candidates considered before diversification.
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    /// 1.0 ranks purely by relevance, 0.0 purely by diversity.
    #[serde(default = "default_lambda")]
    pub diversity_lambda: f32,
}

fn default_k() -> usize {
    4
}

fn default_fetch_k() -> usize {
    20
}

fn default_lambda() -> f32 {
    0.3
}

impl Default for MmrOptions {
    fn default() -> Self {
        Self {
            k: default_k(),
            fetch_k: default_fetch_k(),
            diversity_lambda: default_lambda(),
        }
    }
}

/// A passage selected for the prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub chunk: KnowledgeChunk,
    /// Cosine similarity scaled by the priority boost.
    pub relevance: f32,
}
