//! Embedding backend trait and the offline hashing embedder.

use async_trait::async_trait;
use ndarray::Array1;

use edusage_core::Result;

#[async_trait]
pub trait EmbedderBackend: Send + Sync {
    /// Embed one text (a query, typically).
    async fn embed(&self, text: &str) -> Result<Array1<f32>>;

    /// Embed many texts, in order. Backends with a batch API override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Array1<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Feature-hashing embedder: each lowercased token adds ±1 to one bucket,
/// then the vector is scaled to unit length.
///
/// Deterministic and network-free, so texts sharing words land close
/// together. Used by tests and the `hash` embedder mode.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn fnv1a(token: &str) -> u64 {
        token.bytes().fold(FNV_OFFSET, |hash, b| {
            (hash ^ b as u64).wrapping_mul(FNV_PRIME)
        })
    }

    pub fn embed_sync(&self, text: &str) -> Array1<f32> {
        let mut v = Array1::<f32>::zeros(self.dim);
        let lower = text.to_lowercase();
        for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let h = Self::fnv1a(token);
            let bucket = (h % self.dim as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.dot(&v).sqrt();
        if norm > 0.0 {
            v /= norm;
        }
        v
    }
}

#[async_trait]
impl EmbedderBackend for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Array1<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_unit_vectors() {
        let e = HashEmbedder::new(64);
        let a = e.embed_sync("Photosynthesis in plants");
        let b = e.embed_sync("photosynthesis IN plants");
        assert_eq!(a, b);
        assert!((a.dot(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let e = HashEmbedder::new(256);
        let q = e.embed_sync("قانون نيوتن الأول للحركة");
        let near = e.embed_sync("ينص قانون نيوتن الأول على أن الجسم يبقى ساكنا");
        let far = e.embed_sync("the water cycle and evaporation of oceans");
        assert!(q.dot(&near) > q.dot(&far));
    }

    #[test]
    fn test_empty_text_is_zero() {
        let e = HashEmbedder::new(8);
        assert_eq!(e.embed_sync("  ... ").sum(), 0.0);
    }

    #[tokio::test]
    async fn test_batch_default_preserves_order() {
        let e = HashEmbedder::new(32);
        let texts = vec!["first".to_string(), "second".to_string()];
        let batch = e.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], e.embed_sync("first"));
        assert_eq!(batch[1], e.embed_sync("second"));
    }
}
