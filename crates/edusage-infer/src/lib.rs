//! EduSage Infer — embedding providers and query cache.
//!
//! `EmbedderBackend` abstracts over embedding generation:
//! - `OpenAiEmbedder` calls an OpenAI-compatible `/v1/embeddings` endpoint.
//! - `HashEmbedder` hashes tokens into a fixed-size vector, fully offline.

pub mod cache;
pub mod embedder;
pub mod openai;

pub use cache::QueryCache;
pub use embedder::{EmbedderBackend, HashEmbedder};
pub use openai::OpenAiEmbedder;

use std::sync::Arc;

use edusage_core::{EmbedderKind, EmbeddingSettings, Result};

/// Build the embedder selected by `settings`.
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbedderBackend>> {
    match settings.kind {
        EmbedderKind::OpenAi => {
            let embedder = OpenAiEmbedder::new(settings)?;
            tracing::info!(
                "Using OpenAI embedder (model={}, dim={})",
                settings.model,
                settings.dimension
            );
            Ok(Arc::new(embedder))
        }
        EmbedderKind::Hash => {
            tracing::info!("Using hashing embedder (dim={})", settings.dimension);
            Ok(Arc::new(HashEmbedder::new(settings.dimension)))
        }
    }
}
